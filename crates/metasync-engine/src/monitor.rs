//! Run instrumentation hooks.

use metasync_types::{PluginKind, Recipe};

/// One plugin's outcome within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginReport {
    pub recipe_name: String,
    pub plugin_name: String,
    pub kind: PluginKind,
    /// Records in the batch the report refers to (sinks only).
    pub batch_size: usize,
    pub success: bool,
}

/// Receives run and plugin outcomes from the agent.
///
/// Implementations must be cheap: hooks are called inline on the pipeline
/// tasks.
pub trait Monitor: Send + Sync {
    fn record_run(&self, recipe: &Recipe, duration_ms: u64, success: bool);

    /// Called once per sink batch after retries are exhausted or the write
    /// succeeds.
    fn record_plugin(&self, _report: &PluginReport) {}

    /// Called before each sink write retry.
    fn record_sink_retry(&self, _report: &PluginReport) {}
}

/// Monitor used when none is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl Monitor for NoopMonitor {
    fn record_run(&self, _recipe: &Recipe, _duration_ms: u64, _success: bool) {}
}
