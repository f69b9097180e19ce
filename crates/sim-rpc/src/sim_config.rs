//! Path: crates/sim-rpc/src/sim_config.rs
//! Parses the `simConfig` shape embedded in a submission's params (§4.5,
//! §6.1) and installs its mock overrides onto a `sim-liveio` `MockTable`
//! before Consensus runs. All simulated validators share one mock set:
//! `sim_config.validators[0].plugin_config`.

use serde_json::Value;
use sim_liveio::{MockTable, WebMockEntry};

/// Extracts and installs `simConfig`'s mock overrides. A missing or
/// malformed `sim_config` installs nothing — submissions without mocks are
/// the common case, not an error.
pub fn install(sim_config: Option<&Value>, mocks: &MockTable) {
    let Some(plugin_config) = sim_config
        .and_then(|v| v.get("validators"))
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("plugin_config"))
    else {
        return;
    };

    let web_entries = plugin_config
        .pointer("/mock_web_response/nondet_web_request")
        .and_then(Value::as_object)
        .map(|table| {
            table
                .iter()
                .filter_map(|(url_pattern, spec)| {
                    let status = spec.get("status").and_then(Value::as_u64).unwrap_or(200) as u16;
                    let body = spec.get("body").and_then(Value::as_str).unwrap_or("").to_string();
                    let method = spec.get("method").and_then(Value::as_str).map(str::to_string);
                    Some((url_pattern.clone(), WebMockEntry { method, status, body }))
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    if !web_entries.is_empty() {
        mocks.install_web(web_entries);
    }

    let llm_entries = plugin_config
        .pointer("/mock_response/response")
        .and_then(Value::as_object)
        .map(|table| {
            table
                .iter()
                .filter_map(|(prompt_key, response)| {
                    response.as_str().map(|text| (prompt_key.clone(), text.to_string()))
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    if !llm_entries.is_empty() {
        mocks.install_llm(llm_entries);
    }
}
