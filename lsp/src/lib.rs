//! Debounced diagnostic scheduling and publication for language servers.
//!
//! Rapid edits are coalesced into one backend computation per quiet window,
//! results computed for outdated content are dropped, and finished reports
//! reach the client by push or pull. Background work shows progress only
//! when it runs long enough to be worth showing.

pub mod codec;
pub mod types;

mod backend;
mod client;
mod coordinator;
mod debounce;
mod dispatcher;
mod engine;
mod errors;
mod generation;
mod progress;
pub(crate) mod protocol;
mod server;

#[cfg(test)]
mod test_support;

pub use backend::{CancelHandle, CancelToken, ComputeRequest, DiagnosticBackend};
pub use client::{ClientSink, FramedClient, Outbox};
pub use coordinator::Coordinator;
pub use debounce::{ArmId, Debouncer};
pub use dispatcher::{DeliveryMode, Dispatcher};
pub use engine::DiagnosticsEngine;
pub use errors::{BackendError, DiagnosticsError};
pub use generation::GenerationCounter;
pub use progress::{ProgressDebouncer, ProgressHandle};
pub use server::DiagnosticsServer;
pub use types::{ClientCapabilities, DiagnosticsOptions, EngineEvent, ExperimentalFeature};
