//! Execution core for metasync recipe runs.
//!
//! An [`Agent`] resolves a recipe's plugins from a [`Registry`], wires the
//! extractor, processors and sinks into a [`Stream`], and reports each
//! execution as a [`Run`].

pub mod agent;
pub mod batch;
pub mod builtin;
pub mod config;
pub mod errors;
pub mod monitor;
pub mod registry;
pub mod result;
pub mod retry;
pub mod stream;

// Re-export public API for convenience
pub use agent::Agent;
pub use batch::Batch;
pub use config::AgentConfig;
pub use errors::{BatchFullError, PipelineError, StreamError};
pub use monitor::{Monitor, NoopMonitor, PluginReport};
pub use registry::Registry;
pub use result::Run;
pub use retry::Retrier;
pub use stream::{Middleware, Stream, StreamPhase, Subscriber};
