//! Path: crates/sim-liveio/src/mock.rs
//! The per-submission mock table the Dispatcher installs from `simConfig`
//! before running Consensus and clears afterwards (§4.5, §4.6). Lookups are
//! by regex: URL pattern for web mocks, prompt-key pattern for LLM mocks.
//! Every entry tracks whether it was ever matched, so tests can assert a
//! mock went unused.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use regex::Regex;

/// A single `mock_web_response.nondet_web_request` entry: `{method, status,
/// body}` keyed by a URL-matching regex. `method` is an optional filter —
/// when absent, the entry matches regardless of request method.
#[derive(Clone, Debug)]
pub struct WebMockEntry {
    pub method: Option<String>,
    pub status: u16,
    pub body: String,
}

struct WebMock {
    pattern: Regex,
    entry: WebMockEntry,
    hit: AtomicBool,
}

struct LlmMock {
    pattern: Regex,
    response: String,
    hit: AtomicBool,
}

/// Shared between `LiveWebHandler`/`LiveLlmHandler` and whoever installs
/// `simConfig` overrides (the Dispatcher). `Send + Sync` so it can sit behind
/// an `Arc` alongside the handlers.
#[derive(Default)]
pub struct MockTable {
    web: RwLock<Vec<WebMock>>,
    llm: RwLock<Vec<LlmMock>>,
}

impl MockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the installed web mocks. Invalid regex patterns are skipped
    /// rather than rejected outright — a malformed `simConfig` entry should
    /// not abort the whole submission.
    pub fn install_web(&self, entries: Vec<(String, WebMockEntry)>) {
        let compiled = entries
            .into_iter()
            .filter_map(|(pattern, entry)| {
                Regex::new(&pattern)
                    .ok()
                    .map(|pattern| WebMock { pattern, entry, hit: AtomicBool::new(false) })
            })
            .collect();
        *self.web.write().unwrap() = compiled;
    }

    /// Replaces the installed LLM mocks, keyed by prompt-key regex.
    pub fn install_llm(&self, entries: Vec<(String, String)>) {
        let compiled = entries
            .into_iter()
            .filter_map(|(pattern, response)| {
                Regex::new(&pattern)
                    .ok()
                    .map(|pattern| LlmMock { pattern, response, hit: AtomicBool::new(false) })
            })
            .collect();
        *self.llm.write().unwrap() = compiled;
    }

    /// Drops both tables. Called unconditionally after every submission
    /// (§4.5's "clears per-submission mocks"), so entries never leak into an
    /// unrelated later request.
    pub fn clear(&self) {
        self.web.write().unwrap().clear();
        self.llm.write().unwrap().clear();
    }

    pub fn match_web(&self, url: &str, method: &str) -> Option<WebMockEntry> {
        let web = self.web.read().unwrap();
        web.iter().find_map(|mock| {
            let method_matches = mock
                .entry
                .method
                .as_deref()
                .map(|m| m.eq_ignore_ascii_case(method))
                .unwrap_or(true);
            if method_matches && mock.pattern.is_match(url) {
                mock.hit.store(true, Ordering::Relaxed);
                Some(mock.entry.clone())
            } else {
                None
            }
        })
    }

    pub fn match_llm(&self, prompt_key: &str) -> Option<String> {
        let llm = self.llm.read().unwrap();
        llm.iter().find_map(|mock| {
            if mock.pattern.is_match(prompt_key) {
                mock.hit.store(true, Ordering::Relaxed);
                Some(mock.response.clone())
            } else {
                None
            }
        })
    }

    /// Patterns installed but never matched by any call so far — for tests
    /// asserting a configured mock was actually exercised.
    pub fn unused_patterns(&self) -> Vec<String> {
        let web = self.web.read().unwrap();
        let llm = self.llm.read().unwrap();
        web.iter()
            .filter(|m| !m.hit.load(Ordering::Relaxed))
            .map(|m| m.pattern.as_str().to_string())
            .chain(llm.iter().filter(|m| !m.hit.load(Ordering::Relaxed)).map(|m| m.pattern.as_str().to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn web_mock_matches_by_url_and_method_and_tracks_hits() {
        let table = MockTable::new();
        table.install_web(vec![(
            "^https://example.com/.*".to_string(),
            WebMockEntry { method: Some("GET".to_string()), status: 200, body: "hello".to_string() },
        )]);

        assert!(table.match_web("https://other.com", "GET").is_none());
        assert!(table.match_web("https://example.com/x", "POST").is_none());
        let hit = table.match_web("https://example.com/x", "GET").unwrap();
        assert_eq!(hit.body, "hello");
        assert!(table.unused_patterns().is_empty());
    }

    #[test]
    fn clear_drops_both_tables() {
        let table = MockTable::new();
        table.install_web(vec![(".*".to_string(), WebMockEntry { method: None, status: 200, body: String::new() })]);
        table.install_llm(vec![(".*".to_string(), "canned".to_string())]);
        table.clear();
        assert!(table.match_web("anything", "GET").is_none());
        assert!(table.match_llm("anything").is_none());
    }

    #[test]
    fn unused_patterns_reports_mocks_never_matched() {
        let table = MockTable::new();
        table.install_llm(vec![("^will-use$".to_string(), "a".to_string()), ("^will-not$".to_string(), "b".to_string())]);
        table.match_llm("will-use");
        assert_eq!(table.unused_patterns(), vec!["^will-not$".to_string()]);
    }
}
