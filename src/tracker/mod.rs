//! Per-run candidate deduplication.
//!
//! Listing pages go through a FIFO queue; a listing URL is accepted once per
//! run (queued or already visited both count). Detail pages accumulate in a
//! set. All state lives behind one mutex so concurrent fetch workers get an
//! atomic check-and-insert.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Mutex;
use url::Url;

use crate::models::{Candidate, CandidateKind};

/// Query parameters that never change page content.
const TRACKING_PARAMS: &[&str] = &["gclid", "fbclid", "msclkid", "_ga", "_gl"];

/// Canonical string form of a crawlable URL.
///
/// Scheme and host are lower-cased (the `url` parser does this), the fragment
/// and tracking parameters are dropped, the remaining query segments are kept
/// verbatim and in order, and a trailing `/` is trimmed from the path.
pub fn normalize_url(url: &Url) -> Option<String> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.host_str()?;

    let mut url = url.clone();
    url.set_fragment(None);

    if let Some(query) = url.query().map(str::to_owned) {
        let kept: Vec<&str> = query
            .split('&')
            .filter(|segment| {
                let key = segment.split('=').next().unwrap_or_default();
                !segment.is_empty() && !is_tracking_param(key)
            })
            .collect();
        let kept = kept.join("&");
        if kept.is_empty() {
            url.set_query(None);
        } else if kept != query {
            url.set_query(Some(&kept));
        }
    }

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/').to_string();
        url.set_path(if trimmed.is_empty() { "/" } else { &trimmed });
    }

    let mut s = String::from(url);
    if !s.contains('?') && s.ends_with('/') {
        s.pop();
    }
    Some(s)
}

fn is_tracking_param(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.starts_with("utm_") || TRACKING_PARAMS.contains(&name.as_str())
}

#[derive(Default)]
struct TrackerState {
    pending_multi: VecDeque<Candidate>,
    known_multi: HashSet<String>,
    seen_single: BTreeSet<Candidate>,
}

/// Dedup state for exactly one crawl run.
#[derive(Default)]
pub struct CandidateTracker {
    state: Mutex<TrackerState>,
}

impl CandidateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        // A panicking worker can't leave the sets half-updated: every
        // mutation below is a single insert/push.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queues a listing page unless it was queued or visited before.
    pub fn offer_multi_page(&self, candidate: Candidate) -> bool {
        debug_assert_eq!(candidate.kind, CandidateKind::MultiPage);
        let mut state = self.lock();
        if !state.known_multi.insert(candidate.url.clone()) {
            return false;
        }
        state.pending_multi.push_back(candidate);
        true
    }

    /// Records a detail page; returns false when it was already known.
    pub fn offer_single_page(&self, candidate: Candidate) -> bool {
        debug_assert_eq!(candidate.kind, CandidateKind::SinglePage);
        self.lock().seen_single.insert(candidate)
    }

    /// Pops the FIFO head.
    pub fn next_multi_page(&self) -> Option<Candidate> {
        self.lock().pending_multi.pop_front()
    }

    /// Pops up to `limit` queued listing pages in FIFO order.
    pub fn take_multi_pages(&self, limit: usize) -> Vec<Candidate> {
        let mut state = self.lock();
        let n = limit.min(state.pending_multi.len());
        state.pending_multi.drain(..n).collect()
    }

    pub fn pending_multi_pages(&self) -> usize {
        self.lock().pending_multi.len()
    }

    /// Snapshot of every detail page discovered so far, sorted by URL.
    pub fn single_pages(&self) -> Vec<Candidate> {
        self.lock().seen_single.iter().cloned().collect()
    }

    pub fn single_page_count(&self) -> usize {
        self.lock().seen_single.len()
    }
}
