//! Transfer engines: the components that move bytes.
//!
//! A [`TransferEngine`] accepts byte-range requests, performs the network
//! I/O, and reports lifecycle through a callback stream. The orchestrator
//! never talks HTTP itself; it only submits [`EngineRequest`]s and reacts to
//! [`EngineCallback`]s after the [`TransferEngineAdapter`] has normalized
//! them.
//!
//! Engine ids are private to the engine instance that issued them. After an
//! engine restart every previously issued id is stale and control calls
//! answer [`EngineError::RequestDoesNotExist`]; recovering from that is the
//! orchestrator's job, which is why the persisted record carries everything
//! needed for a fresh submission.
//!
//! [`HttpTransferEngine`] is the reference implementation, built on reqwest
//! streaming with resumable ranged requests and a bounded auto-retry budget.

mod adapter;
mod http;
mod traits;
mod types;

pub use adapter::{normalize, TransferEngineAdapter, DEFAULT_EVENT_CAPACITY};
pub use http::{HttpEngineConfig, HttpTransferEngine};
pub use traits::{BoxFuture, TransferEngine};
pub use types::{
    EngineCallback, EngineCallbackKind, EngineError, EngineId, EngineRequest, NetworkPolicy,
    AUTO_RETRY_MAX_ATTEMPTS,
};
