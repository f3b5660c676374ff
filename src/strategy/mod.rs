//! Per-site page strategies.
//!
//! A strategy is a stateless set of selector-based functions over a parsed
//! document: find the next listing page, find product tiles, lift the
//! attribute tables off a detail page. The orchestrator picks a strategy by
//! site identifier through [`StrategyRegistry`].

pub mod morele;
pub mod newegg;
pub mod xkom;

use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use crate::error::{ConfigurationError, ExtractionError};
use crate::models::{Candidate, CandidateKind, RawSpecMap};

// ── Strategy contract ─────────────────────────────────────────────────────────

pub trait SiteStrategy: Send + Sync {
    /// Registered strategy name, e.g. `newegg`.
    fn name(&self) -> &'static str;

    /// Origin that relative links are resolved against.
    fn base_url(&self) -> &Url;

    /// Pagination: zero or one next listing page.
    fn extract_multi_page_urls(&self, current: &Url, doc: &Html) -> Vec<Candidate>;

    /// Product tiles on a listing page. May contain duplicates.
    fn extract_single_pages_urls(&self, current: &Url, doc: &Html) -> Vec<Candidate>;

    fn extract_spec_map(&self, doc: &Html) -> Result<RawSpecMap, ExtractionError>;
}

pub type StrategyBuilder = fn(&str, &Url) -> Result<Arc<dyn SiteStrategy>, ConfigurationError>;

/// Strategy name → constructor.
pub struct StrategyRegistry {
    builders: HashMap<String, StrategyBuilder>,
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Registry with every strategy this crate ships.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(newegg::NAME, newegg::build);
        registry.register(xkom::NAME, xkom::build);
        registry.register(morele::NAME, morele::build);
        registry
    }

    pub fn register(&mut self, name: &str, builder: StrategyBuilder) {
        self.builders.insert(name.to_ascii_lowercase(), builder);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Compiles the strategy's selectors for one configured site.
    pub fn build(
        &self,
        strategy: &str,
        site: &str,
        base_url: &Url,
    ) -> Result<Arc<dyn SiteStrategy>, ConfigurationError> {
        let builder = self
            .builders
            .get(&strategy.to_ascii_lowercase())
            .ok_or_else(|| ConfigurationError::UnknownStrategy(strategy.to_string()))?;
        builder(site, base_url)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

pub(crate) fn compile(site: &str, selector: &str) -> Result<Selector, ConfigurationError> {
    Selector::parse(selector).map_err(|e| ConfigurationError::InvalidSelector {
        site: site.to_string(),
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

/// Element text with whitespace collapsed.
pub(crate) fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits a value cell on `,`, trimming each part and dropping blanks. A comma
/// with a digit directly on both sides ("3,5 GHz", "1,024 MB") belongs to a
/// number and does not split.
pub(crate) fn split_values(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        let numeric = i > 0
            && chars[i - 1].is_ascii_digit()
            && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
        if c == ',' && !numeric {
            out.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    out.push(current);
    out.into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Resolves an `href` against the site origin. Anchors, `javascript:` and
/// `mailto:` links yield nothing.
pub(crate) fn resolve(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:") || lower.starts_with("mailto:") || lower.starts_with("tel:") {
        return None;
    }
    base.join(href).ok()
}

/// Every `href` under `selector`, resolved and wrapped as candidates.
pub(crate) fn collect_links(
    doc: &Html,
    selector: &Selector,
    base: &Url,
    kind: CandidateKind,
) -> Vec<Candidate> {
    doc.select(selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve(base, href))
        .filter_map(|url| Candidate::new(kind, &url))
        .collect()
}

/// First non-empty text under `selector`.
pub(crate) fn first_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .map(text_of)
        .find(|t| !t.is_empty())
}

/// Title is mandatory on a detail page; anything without one is a listing
/// redirect, an error page or a removed product.
pub(crate) fn require_title(doc: &Html, selector: &Selector) -> Result<RawSpecMap, ExtractionError> {
    first_text(doc, selector)
        .map(RawSpecMap::with_title)
        .ok_or_else(|| ExtractionError::new("no product title"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_and_absolute() {
        let base = Url::parse("https://www.example.com").unwrap();
        assert_eq!(
            resolve(&base, "/p/N82E16819113793").unwrap().as_str(),
            "https://www.example.com/p/N82E16819113793"
        );
        assert_eq!(
            resolve(&base, "https://cdn.example.com/x").unwrap().as_str(),
            "https://cdn.example.com/x"
        );
        assert!(resolve(&base, "javascript:void(0)").is_none());
        assert!(resolve(&base, "#top").is_none());
    }

    #[test]
    fn test_split_values() {
        assert_eq!(split_values("DDR4, DDR5"), vec!["DDR4", "DDR5"]);
        assert_eq!(split_values(" 65 W ,, "), vec!["65 W"]);
        assert!(split_values("  ").is_empty());
        assert_eq!(split_values("3,5 GHz"), vec!["3,5 GHz"]);
        assert_eq!(split_values("125, 253 W"), vec!["125", "253 W"]);
        assert_eq!(split_values("DDR4,DDR5"), vec!["DDR4", "DDR5"]);
    }

    #[test]
    fn test_registry_builds_builtin_and_rejects_unknown() {
        let registry = StrategyRegistry::with_builtin();
        let base = Url::parse("https://www.newegg.com").unwrap();
        assert_eq!(registry.names(), vec!["morele", "newegg", "xkom"]);

        let strategy = registry.build("Newegg", "newegg-cpu", &base).unwrap();
        assert_eq!(strategy.name(), "newegg");

        let err = registry.build("pcpartpicker", "ppp", &base).err().unwrap();
        assert_eq!(err, ConfigurationError::UnknownStrategy("pcpartpicker".into()));
    }

    #[test]
    fn test_invalid_selector_is_configuration_error() {
        let err = compile("broken", "div[").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidSelector { .. }));
    }
}
