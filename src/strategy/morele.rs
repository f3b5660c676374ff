//! morele.net: specification groups rendered as definition lists.

use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use url::Url;

use super::{collect_links, compile, require_title, split_values, text_of, SiteStrategy};
use crate::error::{ConfigurationError, ExtractionError};
use crate::models::{Candidate, CandidateKind, RawSpecMap};

pub const NAME: &str = "morele";

pub struct MoreleStrategy {
    base_url: Url,
    tile: Selector,
    next_page: Selector,
    title: Selector,
    mpn: Selector,
    spec_list: Selector,
    dt: Selector,
}

impl MoreleStrategy {
    pub fn new(site: &str, base_url: Url) -> Result<Self, ConfigurationError> {
        Ok(Self {
            base_url,
            tile: compile(site, ".cat-product .cat-product-name a")?,
            next_page: compile(site, r#".pagination li.pagination-btn-next a, link[rel="next"]"#)?,
            title: compile(site, "h1.prod-name")?,
            mpn: compile(site, r#"[itemprop="mpn"]"#)?,
            spec_list: compile(site, ".specification dl")?,
            dt: compile(site, "dt")?,
        })
    }
}

pub fn build(site: &str, base_url: &Url) -> Result<Arc<dyn SiteStrategy>, ConfigurationError> {
    Ok(Arc::new(MoreleStrategy::new(site, base_url.clone())?))
}

impl SiteStrategy for MoreleStrategy {
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
        collect_links(doc, &self.tile, &self.base_url, CandidateKind::SinglePage)
    }

    fn extract_spec_map(&self, doc: &Html) -> Result<RawSpecMap, ExtractionError> {
        let mut map = require_title(doc, &self.title)?;

        map.part_number = doc
            .select(&self.mpn)
            .next()
            .and_then(|el| {
                el.value()
                    .attr("content")
                    .map(|c| c.trim().to_string())
                    .or_else(|| Some(text_of(el)))
            })
            .filter(|mpn| !mpn.is_empty());

        for dl in doc.select(&self.spec_list) {
            for dt in dl.select(&self.dt) {
                // a label without its own `dd` is skipped
                let dd = dt
                    .next_siblings()
                    .find_map(ElementRef::wrap)
                    .filter(|el| el.value().name() == "dd");
                if let Some(dd) = dd {
                    map.insert(text_of(dt), split_values(&text_of(dd)));
                }
            }
        }

        if map.is_empty() {
            return Err(ExtractionError::new("no specification list"));
        }
        Ok(map)
    }
}
