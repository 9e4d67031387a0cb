//! Error model shared by the engine and plugin implementations.
//!
//! Plugins report failures as `anyhow::Error`. The engine inspects the
//! error chain for the typed markers defined here: [`RetryableError`]
//! flags a transient failure, [`InvalidConfigError`] a rejected
//! configuration, and [`NotFoundError`] an unknown plugin name.

use std::fmt;

use crate::plugin::PluginKind;

/// Marks a failure as transient so the retry policy tries again.
///
/// Anything not carrying this marker anywhere in its source chain is
/// treated as permanent.
#[derive(Debug, thiserror::Error)]
#[error("transient failure")]
pub struct RetryableError {
    #[source]
    inner: anyhow::Error,
}

impl RetryableError {
    /// Wrap an existing error.
    pub fn new(err: impl Into<anyhow::Error>) -> Self {
        Self { inner: err.into() }
    }

    /// Build a retryable error from a plain message.
    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self {
            inner: anyhow::Error::msg(message),
        }
    }

    /// Borrow the wrapped failure.
    #[must_use]
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }
}

/// Returns `true` if `err` is, or wraps, a [`RetryableError`].
#[must_use]
pub fn is_retryable(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<RetryableError>())
}

/// A single rejected configuration key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{key}: {message}")]
pub struct ConfigError {
    pub key: String,
    pub message: String,
}

impl ConfigError {
    #[must_use]
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Returned when a plugin rejects its configuration.
///
/// Plugins usually leave `kind` and `name` empty; the agent fills them in
/// via [`InvalidConfigError::with_plugin`] before reporting.
#[derive(Debug, Clone, PartialEq, Eq, Default, thiserror::Error)]
#[error("{}{}", subject(.kind, .name), details(.errors))]
pub struct InvalidConfigError {
    pub kind: Option<PluginKind>,
    pub name: Option<String>,
    pub errors: Vec<ConfigError>,
}

impl InvalidConfigError {
    #[must_use]
    pub fn new(errors: Vec<ConfigError>) -> Self {
        Self {
            kind: None,
            name: None,
            errors,
        }
    }

    /// Attach the plugin that produced this error.
    #[must_use]
    pub fn with_plugin(mut self, kind: PluginKind, name: impl Into<String>) -> Self {
        self.kind = Some(kind);
        self.name = Some(name.into());
        self
    }
}

fn subject(kind: &Option<PluginKind>, name: &Option<String>) -> String {
    match (kind, name) {
        (Some(kind), Some(name)) => format!("invalid {kind} \"{name}\" config"),
        (Some(kind), None) => format!("invalid {kind} config"),
        _ => "invalid plugin config".to_string(),
    }
}

fn details(errors: &[ConfigError]) -> String {
    if errors.is_empty() {
        return String::new();
    }
    let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!(": {}", details.join("; "))
}

/// A plugin name that is not registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not find {kind} \"{name}\"")]
pub struct NotFoundError {
    pub kind: PluginKind,
    pub name: String,
}

/// A plugin name registered twice.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("duplicate {kind}: {name}")]
pub struct DuplicatePluginError {
    pub kind: PluginKind,
    pub name: String,
}
