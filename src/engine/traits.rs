//! The transfer engine abstraction.
//!
//! Design principles:
//! - **Object-safe**: the orchestrator holds `Arc<dyn TransferEngine>`, so
//!   async methods return boxed futures rather than using `async fn`.
//! - **Control and events are separate**: control calls resolve when the
//!   engine has *accepted* an instruction; actual transfer lifecycle arrives
//!   through the callback stream.
//! - **Ids are engine-private**: callers must tolerate
//!   [`EngineError::RequestDoesNotExist`](super::EngineError::RequestDoesNotExist)
//!   for any id the engine has forgotten.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use super::types::{EngineCallback, EngineError, EngineId, EngineRequest};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An engine that performs the actual network I/O for download pieces.
///
/// Implementations own their request table; everything the orchestrator
/// needs to survive an engine reset lives in the persisted download record
/// instead.
pub trait TransferEngine: Send + Sync {
    /// Submit one piece for transfer.
    ///
    /// Resolves once the engine has accepted (not completed) the request.
    /// Lifecycle callbacks for the returned id follow on the event stream.
    fn submit(&self, request: EngineRequest) -> BoxFuture<'_, Result<EngineId, EngineError>>;

    /// Remove a request and its partial file.
    ///
    /// A `Deleted` callback confirms removal. Unknown ids yield
    /// [`EngineError::RequestDoesNotExist`](super::EngineError::RequestDoesNotExist).
    fn delete(&self, id: EngineId) -> BoxFuture<'_, Result<(), EngineError>>;

    /// Restart a failed request with a fresh retry budget.
    fn retry(&self, id: EngineId) -> BoxFuture<'_, Result<(), EngineError>>;

    /// Resume a paused request.
    fn resume(&self, id: EngineId) -> BoxFuture<'_, Result<(), EngineError>>;

    /// Pause a running request. Fire-and-forget: pausing an unknown or
    /// already-paused id is harmless and reports nothing.
    fn pause(&self, id: EngineId) -> BoxFuture<'_, ()>;

    /// Hand over the engine's callback stream.
    ///
    /// There is exactly one stream per engine instance; calls after the
    /// first return `None`.
    fn take_events(&self) -> Option<mpsc::Receiver<EngineCallback>>;
}
