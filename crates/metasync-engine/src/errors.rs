//! Run error model and stream/batch primitive errors.

use metasync_types::is_retryable;

// ---------------------------------------------------------------------------
// PipelineError: how a run failed
// ---------------------------------------------------------------------------

/// Categorized run failure.
///
/// `Setup` covers plugin lookup and initialization: nothing was extracted
/// and the core never retries it. `Execution` covers failures while records
/// were flowing (extractor, processor, or sink), after any retries the
/// plugin opted into.
#[derive(Debug)]
pub enum PipelineError {
    /// A plugin could not be found or initialized.
    Setup(anyhow::Error),
    /// Extraction, processing, or sinking failed mid-run.
    Execution(anyhow::Error),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup(e) => write!(f, "setup failed: {e:#}"),
            Self::Execution(e) => write!(f, "{e:#}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl PipelineError {
    /// The underlying error chain.
    #[must_use]
    pub fn inner(&self) -> &anyhow::Error {
        match self {
            Self::Setup(e) | Self::Execution(e) => e,
        }
    }

    #[must_use]
    pub fn is_setup(&self) -> bool {
        matches!(self, Self::Setup(_))
    }

    /// Returns `true` if the failure still carries a retryable marker, i.e.
    /// it exhausted its retry budget rather than failing permanently.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        is_retryable(self.inner())
    }
}

/// Rejected [`Stream::push`](crate::stream::Stream::push).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The stream was closed, by the producer finishing or by a terminal error.
    #[error("stream is closed")]
    Closed,
}

/// [`Batch::add`](crate::batch::Batch::add) on a batch at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("batch: cannot add, batch is full")]
pub struct BatchFullError;
