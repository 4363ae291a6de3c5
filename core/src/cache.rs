//! Per-engine results cache.
//!
//! After a successful command whose response is XML and whose sink is
//! buffered, the body is stored keyed by verb, with a timestamp keyed by
//! `verb-searchOrdinal`. The maps are individually synchronized; there is
//! no cross-call atomicity, matching the engine's one-caller-per-session
//! contract.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use pansearch_protocol::wire;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct ResultsCache {
    by_verb: Mutex<HashMap<String, String>>,
    stamps: Mutex<HashMap<String, u64>>,
    search_ordinal: AtomicU64,
}

impl ResultsCache {
    pub fn new() -> Self {
        ResultsCache::default()
    }

    /// Bump the search ordinal. Called once per search command issued on
    /// this engine instance.
    pub fn next_search_ordinal(&self) -> u64 {
        self.search_ordinal.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn search_ordinal(&self) -> u64 {
        self.search_ordinal.load(Ordering::Relaxed)
    }

    /// Store a response body for a verb. Non-XML and streamed responses are
    /// skipped; a body that does not parse is skipped with a warning rather
    /// than stored half-read.
    pub fn store(&self, verb: &str, body: &str, content_type: &str, buffered: bool) {
        if !buffered {
            debug!(verb, "not caching streamed response");
            return;
        }
        if !wire::looks_like_xml(content_type) {
            debug!(verb, content_type, "not caching non-XML response");
            return;
        }
        if !wire::is_well_formed(body) {
            warn!(verb, "not caching malformed XML response");
            return;
        }
        if let Ok(mut map) = self.by_verb.lock() {
            map.insert(verb.to_string(), body.to_string());
        }
        if let Ok(mut stamps) = self.stamps.lock() {
            stamps.insert(
                format!("{verb}-{}", self.search_ordinal()),
                now_millis(),
            );
        }
    }

    pub fn get(&self, verb: &str) -> Option<String> {
        self.by_verb.lock().ok()?.get(verb).cloned()
    }

    /// Timestamp of the last stored response for this verb under the
    /// current search ordinal.
    pub fn stamp(&self, verb: &str) -> Option<u64> {
        self.stamps
            .lock()
            .ok()?
            .get(&format!("{verb}-{}", self.search_ordinal()))
            .copied()
    }

    /// Look up a single record in the cached `show` result by record id,
    /// re-labeled as a standalone record fragment.
    pub fn get_hit(&self, recid: &str) -> Option<String> {
        let show = self.get("show")?;
        match wire::extract_hit(&show, recid) {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                warn!(recid, "cached show result has no unique hit for record id");
                None
            }
            Err(e) => {
                warn!(recid, error = %e, "cached show result unreadable");
                None
            }
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
