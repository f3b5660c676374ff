//! x-kom: client-rendered shop, fetched through the render backend. Attribute
//! rows are `data-name` blocks; multi-value cells list one value per `li`.

use scraper::{Html, Selector};
use std::sync::Arc;
use url::Url;

use super::{collect_links, compile, first_text, require_title, split_values, text_of, SiteStrategy};
use crate::error::{ConfigurationError, ExtractionError};
use crate::models::{Candidate, CandidateKind, RawSpecMap};

pub const NAME: &str = "xkom";

pub struct XkomStrategy {
    base_url: Url,
    tile: Selector,
    next_page: Selector,
    title: Selector,
    product_code: Selector,
    spec_row: Selector,
    label: Selector,
    value: Selector,
    value_item: Selector,
}

impl XkomStrategy {
    pub fn new(site: &str, base_url: Url) -> Result<Self, ConfigurationError> {
        Ok(Self {
            base_url,
            tile: compile(site, r#"[data-name="productCard"] a[href]"#)?,
            next_page: compile(site, r#"a[rel="next"]"#)?,
            title: compile(site, r#"h1[data-name="productTitle"]"#)?,
            product_code: compile(site, r#"[data-name="productCode"]"#)?,
            spec_row: compile(site, r#"[data-name="specificationRow"]"#)?,
            label: compile(site, r#"[data-name="specificationLabel"]"#)?,
            value: compile(site, r#"[data-name="specificationValue"]"#)?,
            value_item: compile(site, "li")?,
        })
    }
}

pub fn build(site: &str, base_url: &Url) -> Result<Arc<dyn SiteStrategy>, ConfigurationError> {
    Ok(Arc::new(XkomStrategy::new(site, base_url.clone())?))
}

impl SiteStrategy for XkomStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn extract_multi_page_urls(&self, _current: &Url, doc: &Html) -> Vec<Candidate> {
        collect_links(doc, &self.next_page, &self.base_url, CandidateKind::MultiPage)
            .into_iter()
            .take(1)
            .collect()
    }

    fn extract_single_pages_urls(&self, _current: &Url, doc: &Html) -> Vec<Candidate> {
        // A tile links its image and its name to the same product.
        collect_links(doc, &self.tile, &self.base_url, CandidateKind::SinglePage)
    }

    fn extract_spec_map(&self, doc: &Html) -> Result<RawSpecMap, ExtractionError> {
        let mut map = require_title(doc, &self.title)?;

        // "Kod producenta: 100-100000910WOF"
        map.part_number = first_text(doc, &self.product_code)
            .map(|code| code.rsplit(':').next().unwrap_or_default().trim().to_string())
            .filter(|code| !code.is_empty());

        for row in doc.select(&self.spec_row) {
            let (Some(label), Some(value)) = (row.select(&self.label).next(), row.select(&self.value).next())
            else {
                continue;
            };

            let items: Vec<String> = value
                .select(&self.value_item)
                .flat_map(|li| split_values(&text_of(li)))
                .collect();
            let values = if items.is_empty() {
                split_values(&text_of(value))
            } else {
                items
            };
            map.insert(text_of(label), values);
        }

        if map.is_empty() {
            return Err(ExtractionError::new("no specification rows"));
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL: &str = r#"
        <html><body>
          <h1 data-name="productTitle">MSI MAG B650 TOMAHAWK WIFI</h1>
          <div data-name="productCode">Kod producenta: 7D75-001R</div>
          <section>
            <div data-name="specificationRow">
              <div data-name="specificationLabel">Chipset płyty głównej</div>
              <div data-name="specificationValue">AMD B650</div>
            </div>
            <div data-name="specificationRow">
              <div data-name="specificationLabel">Złącza zewnętrzne</div>
              <div data-name="specificationValue">
                <ul><li>1 x USB Type-C (USB 3.2 Gen 2x2)</li><li>2 x USB 3.2 Gen 2 Type-A, 4 x USB 2.0 Type-A</li></ul>
              </div>
            </div>
            <div data-name="specificationRow">
              <div data-name="specificationLabel">Standard płyty</div>
              <div data-name="specificationValue">ATX</div>
            </div>
          </section>
        </body></html>"#;

    fn strategy() -> XkomStrategy {
        XkomStrategy::new("xkom-mb", Url::parse("https://www.x-kom.pl").unwrap()).unwrap()
    }

    #[test]
    fn test_spec_map_reads_list_items() {
        let map = strategy().extract_spec_map(&Html::parse_document(DETAIL)).unwrap();
        assert_eq!(map.title.as_deref(), Some("MSI MAG B650 TOMAHAWK WIFI"));
        assert_eq!(map.part_number.as_deref(), Some("7D75-001R"));
        assert_eq!(
            map.get("Złącza zewnętrzne").unwrap(),
            &[
                "1 x USB Type-C (USB 3.2 Gen 2x2)",
                "2 x USB 3.2 Gen 2 Type-A",
                "4 x USB 2.0 Type-A"
            ]
        );
        assert_eq!(map.get("Standard płyty").unwrap(), &["ATX"]);
    }

    #[test]
    fn test_listing_links_resolve_against_origin() {
        let doc = Html::parse_document(
            r#"<div data-name="productCard"><a href="/p/1181766-plyta-glowna-msi-mag-b650"><img></a>
               <a href="/p/1181766-plyta-glowna-msi-mag-b650">MSI MAG B650</a></div>
               <a rel="next" href="/g-5/c/14-plyty-glowne.html?page=2">dalej</a>"#,
        );
        let current = Url::parse("https://www.x-kom.pl/g-5/c/14-plyty-glowne.html").unwrap();
        let s = strategy();

        let tiles = s.extract_single_pages_urls(&current, &doc);
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0], tiles[1]);

        let next = s.extract_multi_page_urls(&current, &doc);
        assert_eq!(next[0].url, "https://www.x-kom.pl/g-5/c/14-plyty-glowne.html?page=2");
    }
}
