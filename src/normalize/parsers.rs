use tracing::warn;

use crate::models::{FormFactor, PowerConnector, PowerConnectorKind, UsbKind, UsbPort};

// ── Numbers ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Ghz,
    Mhz,
    Gb,
    Mb,
}

/// First number in `s`, locale-aware, units stripped.
/// "4.2 GHz" → 4.2 | "3,5 GHz" → 3.5 | "1.234,5" → 1234.5 | "1,024 MB" → 1024.0
pub fn parse_number(s: &str) -> Option<f64> {
    parse_number_with_suffix(s).map(|(n, _)| n)
}

fn parse_number_with_suffix(s: &str) -> Option<(f64, &str)> {
    let s = s.trim();
    if s.is_empty() || s == "N/A" || s == "-" || s == "—" {
        return None;
    }

    let start = s.find(|c: char| c.is_ascii_digit())?;
    let len = s[start..]
        .find(|c: char| !(c.is_ascii_digit() || c == ',' || c == '.'))
        .unwrap_or(s.len() - start);
    let token = s[start..start + len].trim_end_matches([',', '.']);
    let rest = &s[start + token.len()..];

    let normalized = match (token.rfind(','), token.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => token.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => token.replace(',', ""),
        (Some(comma), None) => {
            let decimals = token.len() - comma - 1;
            if token.matches(',').count() == 1 && decimals != 3 {
                token.replace(',', ".")
            } else {
                token.replace(',', "")
            }
        }
        (None, Some(_)) if token.matches('.').count() > 1 => token.replace('.', ""),
        _ => token.to_string(),
    };

    normalized.parse().ok().map(|n| (n, rest))
}

/// Number converted into `target` when the text carries a convertible unit.
/// "3600 MHz" as GHz → 3.6 | "512 MB" as GB → 0.5 | "2 TB" as GB → 2048
pub fn parse_quantity(s: &str, target: Unit) -> Option<f64> {
    let (n, rest) = parse_number_with_suffix(s)?;
    let unit = rest.trim_start().to_lowercase();
    let value = match target {
        Unit::Ghz if unit.starts_with("mhz") => n / 1000.0,
        Unit::Mhz if unit.starts_with("ghz") => n * 1000.0,
        Unit::Gb if unit.starts_with("mb") => n / 1024.0,
        Unit::Gb if unit.starts_with("tb") => n * 1024.0,
        Unit::Mb if unit.starts_with("gb") => n * 1024.0,
        Unit::Mb if unit.starts_with("kb") => n / 1024.0,
        _ => n,
    };
    Some(value)
}

pub fn parse_u32(s: &str) -> Option<u32> {
    let n = parse_number(s)?;
    if n < 0.0 || n > u32::MAX as f64 {
        return None;
    }
    Some(n.round() as u32)
}

/// Numeric fields read the first value only. "125, 253 W" (base and turbo
/// TDP) arrives as ["125", "253 W"] and yields 125.
pub fn first_value(values: &[String]) -> &str {
    values.first().map(String::as_str).unwrap_or_default()
}

// ── Strings and collections ───────────────────────────────────────────────────

pub fn parse_text(values: &[String]) -> Option<String> {
    let s = values.join(", ");
    let s = s.trim();
    if s.is_empty() || s == "N/A" || s == "-" || s == "—" {
        None
    } else {
        Some(s.to_string())
    }
}

/// Trimmed, blank-free, duplicate-free, in page order.
pub fn parse_list(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for v in values {
        let v = v.trim();
        if !v.is_empty() && !out.iter().any(|o| o.eq_ignore_ascii_case(v)) {
            out.push(v.to_string());
        }
    }
    out
}

/// "Socket AM5" → "AM5", "LGA 1700" stays.
pub fn parse_socket(values: &[String]) -> Option<String> {
    let s = parse_text(values)?;
    let stripped = s
        .strip_prefix("Socket ")
        .or_else(|| s.strip_prefix("socket "))
        .unwrap_or(&s)
        .trim();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

// ── Enums ─────────────────────────────────────────────────────────────────────

pub fn parse_form_factor(s: &str) -> Option<FormFactor> {
    let key: String = s
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    let form_factor = if key.contains("eatx") || key.contains("extendedatx") {
        FormFactor::EAtx
    } else if key.contains("microatx") || key.contains("matx") || key.contains("µatx") || key.contains("μatx") || key.contains("uatx") {
        FormFactor::MicroAtx
    } else if key.contains("miniitx") || key.contains("mitx") {
        FormFactor::MiniItx
    } else if key.contains("atx") {
        FormFactor::Atx
    } else {
        warn!("unrecognized form factor `{}`", s);
        return None;
    };
    Some(form_factor)
}

/// "2 x USB 3.2" → (2, "USB 3.2"). Count defaults to 1.
fn leading_quantity(s: &str) -> (u32, &str) {
    let s = s.trim();
    let digits = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if digits == 0 {
        return (1, s);
    }
    let rest = s[digits..].trim_start();
    let rest = rest
        .strip_prefix('x')
        .or_else(|| rest.strip_prefix('X'))
        .or_else(|| rest.strip_prefix('×'));
    match (s[..digits].parse(), rest) {
        (Ok(n), Some(rest)) => (n, rest.trim_start()),
        _ => (1, s),
    }
}

/// "1 x 16-pin" | "2x 8-pin" | "12VHPWR"
pub fn parse_power_connector(s: &str) -> Option<PowerConnector> {
    let (quantity, rest) = leading_quantity(s);
    let key = rest.to_lowercase().replace(' ', "");
    let kind = if key.contains("12vhpwr") {
        PowerConnectorKind::Pin12VHPWR
    } else if key.contains("16-pin") || key.contains("16pin") || key.contains("12v-2x6") {
        PowerConnectorKind::Pin16
    } else if key.contains("8-pin") || key.contains("8pin") || key.contains("6+2") {
        PowerConnectorKind::Pin8
    } else if key.contains("6-pin") || key.contains("6pin") {
        PowerConnectorKind::Pin6
    } else {
        warn!("unrecognized power connector `{}`", s);
        return None;
    };
    Some(PowerConnector { kind, quantity })
}

/// "2 x USB 3.2 Gen 2 Type-A" | "1 x USB Type-C (USB 3.2 Gen 2x2)"
/// Items that aren't USB at all (HDMI, audio jacks) are skipped silently.
pub fn parse_usb_port(s: &str) -> Option<UsbPort> {
    let (quantity, rest) = leading_quantity(s);
    let lower = rest.to_lowercase();
    if !lower.contains("usb") {
        return None;
    }

    let kind = if lower.contains("type-c") || lower.contains("typec") || lower.contains("usb-c") || lower.contains("type c") {
        UsbKind::TypeC
    } else if lower.contains("type-a") || lower.contains("typea") || lower.contains("type a") {
        UsbKind::TypeA
    } else {
        warn!("unrecognized USB connector `{}`", s);
        return None;
    };

    Some(UsbPort {
        kind,
        version: usb_version(rest),
        quantity,
    })
}

/// "USB 3.2 Gen 2 Type-A" → "3.2 Gen 2"; blank when no version is given.
fn usb_version(s: &str) -> String {
    let bytes = s.as_bytes();
    let Some(start) = (0..bytes.len().saturating_sub(2)).find(|&i| {
        bytes[i].is_ascii_digit() && bytes[i + 1] == b'.' && bytes[i + 2].is_ascii_digit()
    }) else {
        return String::new();
    };

    let mut words = s[start..].split_whitespace();
    let mut version = words.next().unwrap_or_default().to_string();
    if let (Some(gen_word), Some(level)) = (words.next(), words.next()) {
        if gen_word.eq_ignore_ascii_case("gen") {
            let level = level.trim_end_matches([')', ',']);
            version = format!("{} Gen {}", version, level);
        }
    }
    version.trim_end_matches([')', ',']).to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_locales() {
        assert_eq!(parse_number("4.2 GHz"), Some(4.2));
        assert_eq!(parse_number("3,5 GHz"), Some(3.5));
        assert_eq!(parse_number("1.234,5 zł"), Some(1234.5));
        assert_eq!(parse_number("1,234.5"), Some(1234.5));
        assert_eq!(parse_number("1,024 MB"), Some(1024.0));
        assert_eq!(parse_number("8-Core"), Some(8.0));
        assert_eq!(parse_number("120W"), Some(120.0));
        assert_eq!(parse_number("N/A"), None);
        assert_eq!(parse_number("brak"), None);
    }

    #[test]
    fn test_parse_quantity_converts_units() {
        assert_eq!(parse_quantity("3600 MHz", Unit::Ghz), Some(3.6));
        assert_eq!(parse_quantity("2.61 GHz", Unit::Mhz), Some(2610.0));
        assert_eq!(parse_quantity("512 MB", Unit::Gb), Some(0.5));
        assert_eq!(parse_quantity("12 GB", Unit::Gb), Some(12.0));
        assert_eq!(parse_quantity("96 MB", Unit::Mb), Some(96.0));
    }

    #[test]
    fn test_first_value_never_merges_separate_numbers() {
        let turbo = vec!["125".to_string(), "253 W".to_string()];
        assert_eq!(parse_u32(first_value(&turbo)), Some(125));

        let decimal = vec!["1,5 GHz".to_string()];
        assert_eq!(parse_quantity(first_value(&decimal), Unit::Ghz), Some(1.5));

        assert_eq!(parse_number(first_value(&[])), None);
    }

    #[test]
    fn test_parse_list() {
        let values = vec![" DDR4".to_string(), "DDR5 ".into(), "ddr5".into(), "".into()];
        assert_eq!(parse_list(&values), vec!["DDR4", "DDR5"]);
    }

    #[test]
    fn test_parse_form_factor() {
        assert_eq!(parse_form_factor("ATX"), Some(FormFactor::Atx));
        assert_eq!(parse_form_factor("Micro ATX"), Some(FormFactor::MicroAtx));
        assert_eq!(parse_form_factor("mATX"), Some(FormFactor::MicroAtx));
        assert_eq!(parse_form_factor("Mini-ITX"), Some(FormFactor::MiniItx));
        assert_eq!(parse_form_factor("E-ATX"), Some(FormFactor::EAtx));
        assert_eq!(parse_form_factor("SSI CEB"), None);
    }

    #[test]
    fn test_parse_power_connector() {
        assert_eq!(
            parse_power_connector("1 x 16-pin"),
            Some(PowerConnector { kind: PowerConnectorKind::Pin16, quantity: 1 })
        );
        assert_eq!(
            parse_power_connector("2x 8-pin"),
            Some(PowerConnector { kind: PowerConnectorKind::Pin8, quantity: 2 })
        );
        assert_eq!(
            parse_power_connector("12VHPWR"),
            Some(PowerConnector { kind: PowerConnectorKind::Pin12VHPWR, quantity: 1 })
        );
        assert_eq!(parse_power_connector("Molex"), None);
    }

    #[test]
    fn test_parse_usb_port() {
        assert_eq!(
            parse_usb_port("2 x USB 3.2 Gen 2 Type-A"),
            Some(UsbPort { kind: UsbKind::TypeA, version: "3.2 Gen 2".into(), quantity: 2 })
        );
        assert_eq!(
            parse_usb_port("1 x USB Type-C (USB 3.2 Gen 2x2)"),
            Some(UsbPort { kind: UsbKind::TypeC, version: "3.2 Gen 2x2".into(), quantity: 1 })
        );
        assert_eq!(
            parse_usb_port("4 x USB 2.0 Type-A"),
            Some(UsbPort { kind: UsbKind::TypeA, version: "2.0".into(), quantity: 4 })
        );
        assert_eq!(parse_usb_port("1 x HDMI"), None);
    }
}
