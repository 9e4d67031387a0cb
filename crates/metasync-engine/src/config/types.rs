//! Agent runtime settings.

use std::sync::Arc;
use std::time::Duration;

use crate::monitor::Monitor;
use crate::retry::{DEFAULT_INITIAL_INTERVAL, DEFAULT_MAX_RETRIES};

/// Settings shared by every run an [`Agent`](crate::agent::Agent) executes.
#[derive(Clone)]
pub struct AgentConfig {
    /// Retries after the first attempt for extractors and sink writes.
    pub max_retries: u32,
    /// Wait before the first retry; later waits grow by a factor of 5.
    pub retry_initial_interval: Duration,
    /// Records per sink delivery; `0` delivers everything at stream end.
    pub sink_batch_size: usize,
    /// When `false`, a sink write that still fails after retries is logged
    /// and its batch dropped instead of failing the run.
    pub stop_on_sink_error: bool,
    /// Empty means no instrumentation.
    pub monitors: Vec<Arc<dyn Monitor>>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_initial_interval: DEFAULT_INITIAL_INTERVAL,
            sink_batch_size: 0,
            stop_on_sink_error: true,
            monitors: Vec::new(),
        }
    }
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("max_retries", &self.max_retries)
            .field("retry_initial_interval", &self.retry_initial_interval)
            .field("sink_batch_size", &self.sink_batch_size)
            .field("stop_on_sink_error", &self.stop_on_sink_error)
            .field("monitors", &self.monitors.len())
            .finish()
    }
}
