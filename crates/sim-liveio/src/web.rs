//! Path: crates/sim-liveio/src/web.rs
//! The web half of LiveIO (§4.6): mock-table lookup by URL regex, else a
//! live HTTP request or headless-browser render, dispatched through the
//! background bridge thread.

use std::sync::Arc;

use sim_engine::{WebHandler, WebRequest, WebResponse};

use crate::bridge::Bridge;
use crate::mock::MockTable;

pub struct LiveWebHandler {
    mocks: Arc<MockTable>,
    bridge: Bridge,
    /// Whether the headless-browser path is available at all; `--no-browser`
    /// sets this to `false`, leaving only the HTTP client path.
    browser_enabled: bool,
}

impl LiveWebHandler {
    pub fn new(mocks: Arc<MockTable>, bridge: Bridge, browser_enabled: bool) -> Self {
        Self { mocks, bridge, browser_enabled }
    }
}

impl WebHandler for LiveWebHandler {
    fn handle(&self, request: WebRequest) -> WebResponse {
        if let Some(mock) = self.mocks.match_web(&request.url, &request.method) {
            return synthesize(mock);
        }
        self.bridge.web_request(request, self.browser_enabled)
    }
}

fn synthesize(mock: crate::mock::WebMockEntry) -> WebResponse {
    WebResponse {
        status: mock.status,
        headers: Default::default(),
        body: mock.body.into_bytes(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::mock::WebMockEntry;

    #[test]
    fn mocked_url_never_reaches_the_bridge() {
        let mocks = Arc::new(MockTable::new());
        mocks.install_web(vec![(
            "^https://example.com/.*".to_string(),
            WebMockEntry { method: None, status: 201, body: "mocked".to_string() },
        )]);
        let handler = LiveWebHandler::new(mocks, Bridge::spawn(), false);

        let response = handler.handle(WebRequest {
            url: "https://example.com/x".to_string(),
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            body: Vec::new(),
        });
        assert_eq!(response.status, 201);
        assert_eq!(response.body, b"mocked");
    }
}
