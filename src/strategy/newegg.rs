//! Newegg: server-rendered listing grid, spec tables with `th`/`td` rows.

use scraper::{Html, Selector};
use std::sync::Arc;
use url::Url;

use super::{collect_links, compile, require_title, split_values, text_of, SiteStrategy};
use crate::error::{ConfigurationError, ExtractionError};
use crate::models::{Candidate, CandidateKind, RawSpecMap};

pub const NAME: &str = "newegg";

/// Rows whose value is the manufacturer part number.
const PART_NUMBER_LABELS: &[&str] = &["mfr. model #", "mfr model #", "part number"];

pub struct NeweggStrategy {
    base_url: Url,
    tile: Selector,
    next_page: Selector,
    title: Selector,
    spec_row: Selector,
    label: Selector,
    value: Selector,
}

impl NeweggStrategy {
    pub fn new(site: &str, base_url: Url) -> Result<Self, ConfigurationError> {
        Ok(Self {
            base_url,
            tile: compile(site, "div.item-cell a.item-title")?,
            next_page: compile(site, r#"div.list-tool-pagination a[aria-label="Next"]"#)?,
            title: compile(site, "h1.product-title")?,
            spec_row: compile(site, "#product-details table.table-horizontal tr")?,
            label: compile(site, "th")?,
            value: compile(site, "td")?,
        })
    }
}

pub fn build(site: &str, base_url: &Url) -> Result<Arc<dyn SiteStrategy>, ConfigurationError> {
    Ok(Arc::new(NeweggStrategy::new(site, base_url.clone())?))
}

impl SiteStrategy for NeweggStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn extract_multi_page_urls(&self, _current: &Url, doc: &Html) -> Vec<Candidate> {
        // The last page still renders a disabled "Next" button without href.
        collect_links(doc, &self.next_page, &self.base_url, CandidateKind::MultiPage)
            .into_iter()
            .take(1)
            .collect()
    }

    fn extract_single_pages_urls(&self, _current: &Url, doc: &Html) -> Vec<Candidate> {
        collect_links(doc, &self.tile, &self.base_url, CandidateKind::SinglePage)
    }

    fn extract_spec_map(&self, doc: &Html) -> Result<RawSpecMap, ExtractionError> {
        let mut map = require_title(doc, &self.title)?;

        for row in doc.select(&self.spec_row) {
            let (Some(label), Some(value)) = (row.select(&self.label).next(), row.select(&self.value).next())
            else {
                continue;
            };
            let label = text_of(label);
            let value = text_of(value);

            if PART_NUMBER_LABELS.contains(&label.to_lowercase().as_str()) {
                map.part_number = Some(value.clone());
            }
            map.insert(label, split_values(&value));
        }

        if map.is_empty() {
            return Err(ExtractionError::new("no specification table"));
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <div class="item-cell"><a class="item-title" href="/amd-ryzen-7-7800x3d/p/N82E16819113793">AMD Ryzen 7 7800X3D</a></div>
          <div class="item-cell"><a class="item-title" href="https://www.newegg.com/intel-core-i5-14600k/p/N82E16819118466">Intel Core i5-14600K</a></div>
          <div class="list-tool-pagination">
            <a aria-label="Previous" href="/p/pl?N=100007671&page=1">Prev</a>
            <a aria-label="Next" href="/p/pl?N=100007671&page=3">Next</a>
          </div>
        </body></html>"#;

    const DETAIL: &str = r#"
        <html><body>
          <h1 class="product-title">AMD Ryzen 7 7800X3D - Ryzen 7 8-Core 4.2 GHz Socket AM5 120W</h1>
          <div id="product-details">
            <table class="table-horizontal">
              <tr><th>Brand</th><td>AMD</td></tr>
              <tr><th>Mfr. Model #</th><td>100-100000910WOF</td></tr>
              <tr><th># of Cores</th><td>8-Core</td></tr>
            </table>
            <table class="table-horizontal">
              <tr><th>Memory Types</th><td>DDR5, DDR5-5200</td></tr>
              <tr><th>Operating Frequency</th><td>4.2 GHz</td></tr>
            </table>
          </div>
        </body></html>"#;

    fn strategy() -> NeweggStrategy {
        NeweggStrategy::new("newegg-cpu", Url::parse("https://www.newegg.com").unwrap()).unwrap()
    }

    #[test]
    fn test_listing_links() {
        let s = strategy();
        let doc = Html::parse_document(LISTING);
        let current = Url::parse("https://www.newegg.com/p/pl?N=100007671&page=2").unwrap();

        let next = s.extract_multi_page_urls(&current, &doc);
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].url, "https://www.newegg.com/p/pl?N=100007671&page=3");

        let tiles = s.extract_single_pages_urls(&current, &doc);
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0].url, "https://www.newegg.com/amd-ryzen-7-7800x3d/p/N82E16819113793");
    }

    #[test]
    fn test_last_page_has_no_next() {
        let doc = Html::parse_document(
            r#"<div class="list-tool-pagination"><a aria-label="Next" class="is-disabled">Next</a></div>"#,
        );
        let current = Url::parse("https://www.newegg.com/p/pl?page=9").unwrap();
        assert!(strategy().extract_multi_page_urls(&current, &doc).is_empty());
    }

    #[test]
    fn test_spec_map() {
        let map = strategy().extract_spec_map(&Html::parse_document(DETAIL)).unwrap();
        assert!(map.title.as_deref().unwrap().starts_with("AMD Ryzen 7 7800X3D"));
        assert_eq!(map.part_number.as_deref(), Some("100-100000910WOF"));
        assert_eq!(map.get("brand"), Some(&["AMD".to_string()][..]));
        assert_eq!(map.get("Memory Types").unwrap(), &["DDR5", "DDR5-5200"]);
    }

    #[test]
    fn test_missing_title_is_extraction_error() {
        let doc = Html::parse_document("<html><body><h2>Page not found</h2></body></html>");
        assert!(strategy().extract_spec_map(&doc).is_err());
    }
}
