//! Path: crates/sim-engine/src/host.rs
//! The `ContractHost` trait boundary (§4.8): the narrow capability surface
//! the Engine drives, and the narrower one (`HostServices`) the Engine
//! offers back to a runtime implementing it. Neither side inspects the
//! other's internals — `Class`/`Instance` are opaque associated types, and
//! `NondetRequest`/`NondetResponse` are the tagged union crossing the single
//! callback boundary described in §6.4.

use std::collections::BTreeMap;

use sim_types::{Address, CalldataValue, ContractSchema, Hash32};

pub use crate::error::HostError;

/// `{url, method, headers, body}` — the web handler's input shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

/// `{status, headers, body}` — the web handler's output shape. Never an
/// `Err`: failures are encoded as a `502` status with a descriptive body
/// (§4.6).
#[derive(Clone, PartialEq, Eq)]
pub struct WebResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

/// `{prompt, config}` — the language-model handler's input shape. `config`
/// carries provider selection (`"openai:gpt-4o-mini"`-style) and an optional
/// `response_format` hint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LlmRequest {
    pub prompt: String,
    pub provider: Option<String>,
    pub response_format_json: bool,
}

/// The language-model handler's output: raw text, plus a best-effort JSON
/// parse of that text when the caller requested structured output.
#[derive(Clone, Debug, PartialEq)]
pub struct LlmResponse {
    pub text: String,
    pub structured: Option<serde_json::Value>,
}

/// The tagged union a runtime's single non-deterministic-operation callback
/// dispatches (§6.4). `RunNondet` is the generic "arbitrary non-deterministic
/// operation" hook — e.g. a random draw the contract language itself
/// performs — carrying the closure-captured result and its validator
/// closure directly, per the design notes' resolution of closure capture.
pub enum NondetRequest {
    DeployContract {
        code: Vec<u8>,
        calldata: Vec<u8>,
    },
    CallContract {
        address: Address,
        calldata: Vec<u8>,
    },
    PostMessage {
        address: Address,
        calldata: Vec<u8>,
    },
    WebRequest(WebRequest),
    ExecPrompt(LlmRequest),
    RunNondet {
        result: CalldataValue,
        validate: Box<dyn Fn(&CalldataValue) -> bool + Send + Sync>,
    },
    Trace(String),
    Rollback(String),
    Return(CalldataValue),
    Sandbox,
}

/// The response half of the tagged union.
#[derive(Clone, Debug, PartialEq)]
pub enum NondetResponse {
    Deployed { address: Address },
    CallResult(Vec<u8>),
    Posted,
    Web(WebResponse),
    Exec(LlmResponse),
    Value(CalldataValue),
    Ack,
    /// An infrastructural failure distinct from a contract-level rollback —
    /// e.g. malformed deploy calldata or unreadable code. `CallContract`
    /// never produces this: call failures are encoded into `CallResult`'s
    /// status-prefixed bytes instead.
    Failed(String),
}

impl std::fmt::Debug for WebResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebResponse")
            .field("status", &self.status)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// The capability surface the Engine offers back to a runtime while it is
/// inside `construct`/`invoke` (§6.4's `storage_read`/`storage_write`/
/// `get_balance`/`get_self_balance`/`nondet_call`).
pub trait HostServices {
    fn storage_read(&mut self, slot: Hash32, offset: u32, length: u32) -> Vec<u8>;
    fn storage_write(&mut self, slot: Hash32, offset: u32, data: &[u8]);
    fn get_balance(&mut self, address: Address) -> u128;
    fn get_self_balance(&mut self) -> u128;
    fn nondet_call(&mut self, request: NondetRequest) -> NondetResponse;
}

/// The trait an external contract runtime implements and the Engine drives
/// (§4.8). `Class` and `Instance` are opaque to the Engine; it only ever
/// stores and re-passes them.
pub trait ContractHost {
    type Class: Clone;
    type Instance;

    /// Parses/compiles contract code into a loadable class. The Engine
    /// never inspects `Class` internals — it only caches and re-passes it.
    fn load_class(&self, content_hash: [u8; 32], bytes: &[u8]) -> Result<Self::Class, HostError>;

    /// Reflects over a loaded class's constructor and externally-visible
    /// methods (§4.3 "Schema extraction").
    fn schema_of(&self, class: &Self::Class) -> ContractSchema;

    /// Builds a fresh instance against the currently-installed storage
    /// partition and message context.
    fn construct(
        &self,
        class: &Self::Class,
        positional: &[CalldataValue],
        named: &BTreeMap<String, CalldataValue>,
        services: &mut dyn HostServices,
    ) -> Result<Self::Instance, HostError>;

    /// Dispatches a named method call against an existing instance.
    fn invoke(
        &self,
        instance: &mut Self::Instance,
        method: &str,
        positional: &[CalldataValue],
        named: &BTreeMap<String, CalldataValue>,
        services: &mut dyn HostServices,
    ) -> Result<CalldataValue, HostError>;
}

/// The web half of LiveIO, consumed through `HostServices::nondet_call`'s
/// `WebRequest` dispatch.
pub trait WebHandler: Send + Sync {
    fn handle(&self, request: WebRequest) -> WebResponse;
}

/// The language-model half of LiveIO, consumed through `ExecPrompt` dispatch.
pub trait LlmHandler: Send + Sync {
    fn handle(&self, request: LlmRequest) -> LlmResponse;
}
