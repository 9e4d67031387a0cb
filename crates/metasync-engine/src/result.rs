//! Run outcome.

use metasync_types::Recipe;

use crate::errors::PipelineError;

/// Result of one recipe execution.
#[derive(Debug)]
pub struct Run {
    pub recipe: Recipe,
    pub error: Option<PipelineError>,
    pub duration_ms: u64,
    /// Records the extractor pushed through the middleware chain.
    pub record_count: u64,
    pub extractor_retries: u32,
}

impl Run {
    pub(crate) fn new(recipe: Recipe) -> Self {
        Self {
            recipe,
            error: None,
            duration_ms: 0,
            record_count: 0,
            extractor_retries: 0,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
