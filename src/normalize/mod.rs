//! Raw spec map → typed hardware draft.
//!
//! Each category has a fixed table of known labels (English and Polish, the
//! languages of the supported shops). A matching row runs the rule's parser
//! and writes the field; rows that match nothing are ignored. Fields not found
//! on the page stay at their default sentinel.

pub mod parsers;

use tracing::debug;

use self::parsers::{
    parse_form_factor, parse_list, parse_number, parse_power_connector, parse_quantity, parse_socket,
    parse_text, parse_u32, parse_usb_port, first_value, Unit,
};
use crate::error::ExtractionError;
use crate::models::{Cpu, Gpu, HardwareCategory, HardwareEntity, Motherboard, RawSpecMap};

// ── Rule tables ───────────────────────────────────────────────────────────────

struct FieldRule<T> {
    labels: &'static [&'static str],
    apply: fn(&mut T, &[String]),
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn set_list<T>(slot: &mut Vec<T>, values: Vec<T>) {
    if !values.is_empty() {
        *slot = values;
    }
}

const MANUFACTURER: &[&str] = &["brand", "manufacturer", "producent"];
const SOCKET: &[&str] = &["cpu socket type", "socket", "gniazdo procesora", "typ gniazda procesora"];
const CHIPSET: &[&str] = &["chipset", "chipset płyty głównej"];
const TDP: &[&str] = &["thermal design power", "tdp", "tdp (w)", "pobór mocy"];

static CPU_RULES: &[FieldRule<Cpu>] = &[
    FieldRule { labels: MANUFACTURER, apply: |c, v| set(&mut c.manufacturer, parse_text(v)) },
    FieldRule {
        labels: &["# of cores", "cores", "number of cores", "liczba rdzeni"],
        apply: |c, v| set(&mut c.cores, parse_u32(first_value(v))),
    },
    FieldRule {
        labels: &["# of threads", "threads", "number of threads", "liczba wątków"],
        apply: |c, v| set(&mut c.threads, parse_u32(first_value(v))),
    },
    FieldRule {
        labels: &["operating frequency", "base clock", "base frequency", "taktowanie bazowe", "częstotliwość taktowania procesora"],
        apply: |c, v| set(&mut c.base_clock_ghz, parse_quantity(first_value(v), Unit::Ghz)),
    },
    FieldRule {
        labels: &["max turbo frequency", "boost clock", "max boost clock", "taktowanie maksymalne", "częstotliwość maksymalna"],
        apply: |c, v| set(&mut c.boost_clock_ghz, parse_quantity(first_value(v), Unit::Ghz)),
    },
    FieldRule {
        labels: &["l3 cache", "cache l3", "pamięć podręczna l3"],
        apply: |c, v| set(&mut c.l3_cache_mb, parse_quantity(first_value(v), Unit::Mb)),
    },
    FieldRule { labels: TDP, apply: |c, v| set(&mut c.tdp_watts, parse_u32(first_value(v))) },
    FieldRule { labels: SOCKET, apply: |c, v| set(&mut c.socket, parse_socket(v)) },
    FieldRule {
        labels: &["memory types", "memory type", "obsługiwane typy pamięci", "typ obsługiwanej pamięci"],
        apply: |c, v| set_list(&mut c.memory_types, parse_list(v)),
    },
    FieldRule {
        labels: &["integrated graphics", "zintegrowany układ graficzny"],
        apply: |c, v| set(&mut c.integrated_graphics, parse_text(v)),
    },
];

static GPU_RULES: &[FieldRule<Gpu>] = &[
    FieldRule { labels: MANUFACTURER, apply: |g, v| set(&mut g.manufacturer, parse_text(v)) },
    FieldRule { labels: &["gpu", "chipset", "układ graficzny"], apply: |g, v| set(&mut g.chipset, parse_text(v)) },
    FieldRule {
        labels: &["memory size", "pamięć", "ilość pamięci ram", "wielkość pamięci"],
        apply: |g, v| set(&mut g.memory_size_gb, parse_quantity(first_value(v), Unit::Gb)),
    },
    FieldRule {
        labels: &["memory type", "rodzaj pamięci", "typ pamięci"],
        apply: |g, v| set(&mut g.memory_type, parse_text(v)),
    },
    FieldRule {
        labels: &["memory interface", "memory bus", "szyna pamięci", "magistrala pamięci"],
        apply: |g, v| set(&mut g.memory_bus_bits, parse_u32(first_value(v))),
    },
    FieldRule {
        labels: &["boost clock", "taktowanie rdzenia w trybie boost", "taktowanie boost"],
        apply: |g, v| set(&mut g.boost_clock_mhz, parse_quantity(first_value(v), Unit::Mhz)),
    },
    FieldRule { labels: TDP, apply: |g, v| set(&mut g.tdp_watts, parse_u32(first_value(v))) },
    FieldRule {
        labels: &["max gpu length", "card length", "length", "długość", "długość karty"],
        apply: |g, v| set(&mut g.length_mm, parse_number(first_value(v))),
    },
    FieldRule {
        labels: &["recommended psu wattage", "zalecana moc zasilacza"],
        apply: |g, v| set(&mut g.recommended_psu_watts, parse_u32(first_value(v))),
    },
    FieldRule {
        labels: &["power connector", "power connectors", "złącza zasilania", "dodatkowe zasilanie"],
        apply: |g, v| set_list(&mut g.power_connectors, v.iter().filter_map(|s| parse_power_connector(s)).collect()),
    },
    FieldRule {
        labels: &["outputs", "display outputs", "wyjścia", "rodzaje wyjść"],
        apply: |g, v| set_list(&mut g.outputs, parse_list(v)),
    },
];

static MOTHERBOARD_RULES: &[FieldRule<Motherboard>] = &[
    FieldRule { labels: MANUFACTURER, apply: |m, v| set(&mut m.manufacturer, parse_text(v)) },
    FieldRule { labels: SOCKET, apply: |m, v| set(&mut m.socket, parse_socket(v)) },
    FieldRule { labels: CHIPSET, apply: |m, v| set(&mut m.chipset, parse_text(v)) },
    FieldRule {
        labels: &["form factor", "standard płyty", "format płyty"],
        apply: |m, v| set(&mut m.form_factor, v.first().and_then(|s| parse_form_factor(s))),
    },
    FieldRule {
        labels: &["number of memory slots", "memory slots", "liczba banków pamięci", "liczba gniazd pamięci"],
        apply: |m, v| set(&mut m.memory_slots, parse_u32(first_value(v))),
    },
    FieldRule {
        labels: &["maximum memory supported", "max memory", "maksymalna wielkość pamięci"],
        apply: |m, v| {
            let gb = parse_quantity(first_value(v), Unit::Gb).map(|gb| gb.round() as u32);
            set(&mut m.max_memory_gb, gb)
        },
    },
    FieldRule {
        labels: &["memory standard", "memory types", "memory type", "rodzaj obsługiwanej pamięci", "obsługiwane typy pamięci"],
        apply: |m, v| set_list(&mut m.memory_types, parse_list(v)),
    },
    FieldRule {
        labels: &["m.2", "m.2 slots", "liczba złączy m.2"],
        apply: |m, v| set(&mut m.m2_slots, parse_u32(first_value(v))),
    },
    FieldRule {
        labels: &["sata 6gb/s", "sata ports", "liczba portów sata"],
        apply: |m, v| set(&mut m.sata_ports, parse_u32(first_value(v))),
    },
    FieldRule {
        labels: &["usb", "back i/o ports", "rear usb", "złącza zewnętrzne", "złącza usb"],
        apply: |m, v| set_list(&mut m.usb_ports, v.iter().filter_map(|s| parse_usb_port(s)).collect()),
    },
];

/// Lower-case, single-spaced, trailing colon removed.
fn fold_label(label: &str) -> String {
    label
        .trim()
        .trim_end_matches(':')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn apply_rules<T>(rules: &[FieldRule<T>], draft: &mut T, raw: &RawSpecMap) -> usize {
    let mut matched = 0;
    for (label, values) in raw.iter() {
        let key = fold_label(label);
        match rules.iter().find(|r| r.labels.contains(&key.as_str())) {
            Some(rule) => {
                (rule.apply)(draft, values);
                matched += 1;
            }
            None => debug!("ignoring unmapped label `{}`", label),
        }
    }
    matched
}

// ── Identity ──────────────────────────────────────────────────────────────────

/// Shop-specific words that precede the model in a product title.
const TITLE_PREFIXES: &[&str] = &["procesor", "karta graficzna", "płyta główna"];

/// "AMD Ryzen 7 7800X3D - Ryzen 7 8-Core 4.2 GHz ..." → "AMD Ryzen 7 7800X3D"
pub fn model_from_title(title: &str) -> String {
    let head = title
        .split(" - ")
        .next()
        .unwrap_or_default()
        .split(" | ")
        .next()
        .unwrap_or_default()
        .trim();
    let lower = head.to_lowercase();
    let head = TITLE_PREFIXES
        .iter()
        .find(|p| lower.starts_with(*p))
        .map(|p| head[p.len()..].trim())
        .unwrap_or(head);
    head.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fill_identity(model_name: &mut String, manufacturer: &mut String, part_number: &mut String, raw: &RawSpecMap) {
    if let Some(title) = raw.title.as_deref() {
        *model_name = model_from_title(title);
    }
    if manufacturer.trim().is_empty() {
        *manufacturer = model_name.split_whitespace().next().unwrap_or_default().to_string();
    }
    if let Some(part) = raw.part_number.as_deref() {
        *part_number = part.trim().to_string();
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Builds a draft entity of `category` from one page's spec map. Fails only
/// when the page yields no model name to key the entity by.
pub fn normalize(category: HardwareCategory, raw: &RawSpecMap) -> Result<HardwareEntity, ExtractionError> {
    let (draft, matched) = match category {
        HardwareCategory::Cpu => {
            let mut cpu = Cpu::default();
            let matched = apply_rules(CPU_RULES, &mut cpu, raw);
            fill_identity(&mut cpu.model_name, &mut cpu.manufacturer, &mut cpu.part_number, raw);
            (HardwareEntity::Cpu(cpu), matched)
        }
        HardwareCategory::Gpu => {
            let mut gpu = Gpu::default();
            let matched = apply_rules(GPU_RULES, &mut gpu, raw);
            fill_identity(&mut gpu.model_name, &mut gpu.manufacturer, &mut gpu.part_number, raw);
            (HardwareEntity::Gpu(gpu), matched)
        }
        HardwareCategory::Motherboard => {
            let mut board = Motherboard::default();
            let matched = apply_rules(MOTHERBOARD_RULES, &mut board, raw);
            fill_identity(&mut board.model_name, &mut board.manufacturer, &mut board.part_number, raw);
            (HardwareEntity::Motherboard(board), matched)
        }
    };

    if draft.model_key().is_none() {
        return Err(ExtractionError::new("no model name in title"));
    }
    debug!(
        "normalized {} `{}`: {}/{} labels mapped",
        category,
        draft.model_name(),
        matched,
        raw.len()
    );
    Ok(draft)
}
