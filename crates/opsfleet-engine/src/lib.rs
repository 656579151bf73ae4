//! Opsfleet Dispatch Engine
//!
//! Coordinates script and file-transfer execution across fleets of
//! remote hosts through per-host agents:
//!
//! - [`builder`]: pure construction of immutable task specs.
//! - [`dispatch`]: signed push of one spec to one agent endpoint.
//! - [`correlator`]: matching of asynchronous result-stream records
//!   back to outstanding task ids, with timeout fallback.
//! - [`strategy`]: parallel / serial / rolling execution policies over
//!   a host set, producing one aggregate result.
//! - [`retry`] and [`control`]: idempotent retry-chain bookkeeping,
//!   a global retry concurrency cap, and dual-channel cancellation.
//!
//! Persistence, the API surface, and host inventory live outside the
//! engine behind the [`store::ExecutionStore`], [`registry::AgentRegistry`]
//! and [`stream::ResultStream`] seams.

pub mod builder;
pub mod config;
pub mod control;
pub mod correlator;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod pool;
pub mod registry;
pub mod retry;
pub mod signing;
pub mod store;
pub mod strategy;
pub mod stream;

// Re-export commonly used types
pub use builder::{ExecutionContext, FileTransferTaskBuilder, ScriptTaskBuilder, TaskBuilder};
pub use config::EngineConfig;
pub use control::{CancelController, CancelReport, ControlStore, MemoryControlStore, RunRegistry};
pub use correlator::ResultCorrelator;
pub use dispatch::{DispatchError, Dispatcher, HttpDispatcher, PushResult};
pub use engine::DispatchEngine;
pub use error::EngineError;
pub use pool::DispatchPool;
pub use registry::{AgentRegistry, StaticRegistry};
pub use retry::{ExecutionLauncher, RetryController, RetryPolicy};
pub use signing::RequestSigner;
pub use store::{ExecutionStore, MemoryExecutionStore, StoreError};
pub use strategy::{ExecuteOptions, ExecutionMode};
pub use stream::{MemoryResultStream, ResultStream, StreamCursor, StreamError};
