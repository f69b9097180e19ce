//! Path: crates/sim-liveio/src/lib.rs
//! LiveIO: the web and language-model `ContractHost` side-channel handlers
//! (§4.6), each backed by a shared mock table the Dispatcher installs and
//! clears per submission (§4.5), falling back to live HTTP/browser/provider
//! calls bridged onto a dedicated background thread (§6.4's synchronous
//! handler boundary).

pub mod bridge;
pub mod error;
pub mod llm;
pub mod mock;
pub mod web;

pub use bridge::Bridge;
pub use error::LiveIoError;
pub use llm::{LiveLlmConfig, LiveLlmHandler, DEFAULT_PROVIDER};
pub use mock::{MockTable, WebMockEntry};
pub use web::LiveWebHandler;
