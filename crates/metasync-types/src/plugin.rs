//! Plugin lifecycle contracts.
//!
//! Every plugin is validated against its recipe config, initialized once,
//! and then driven by the engine: extractors push records through an
//! [`Emit`] handle, processors replace records one at a time, and sinks
//! receive batches.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, InvalidConfigError};
use crate::record::Record;

/// Role a plugin plays in a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    /// Produces records from an external system.
    Extractor,
    /// Replaces records in-flight.
    Processor,
    /// Delivers batches of records to an external system.
    Sink,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Extractor => "extractor",
            Self::Processor => "processor",
            Self::Sink => "sink",
        };
        f.write_str(s)
    }
}

/// Configuration handed to a plugin at validation and init time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PluginConfig {
    /// URN namespace for extracted records (extractors only).
    pub urn_scope: Option<String>,
    /// Plugin-specific settings exactly as written in the recipe.
    pub raw: serde_json::Value,
}

impl PluginConfig {
    #[must_use]
    pub fn new(raw: serde_json::Value) -> Self {
        Self {
            urn_scope: None,
            raw,
        }
    }

    #[must_use]
    pub fn with_urn_scope(mut self, scope: impl Into<String>) -> Self {
        self.urn_scope = Some(scope.into());
        self
    }

    /// Deserialize the raw settings into a typed config.
    ///
    /// A missing (`null`) config is treated as an empty object so that
    /// plugins with all-default settings need no `config:` block.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidConfigError`] when the settings do not match `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, InvalidConfigError> {
        let raw = if self.raw.is_null() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            self.raw.clone()
        };
        serde_json::from_value(raw)
            .map_err(|e| InvalidConfigError::new(vec![ConfigError::new("config", e.to_string())]))
    }
}

/// Emission handle given to an extractor.
#[async_trait]
pub trait Emit: Send + Sync {
    /// Hand one record to the pipeline, waiting while downstream sinks
    /// catch up.
    ///
    /// # Errors
    ///
    /// Fails once the pipeline has shut down; the extractor should stop.
    async fn emit(&self, record: Record) -> Result<()>;
}

/// Record producer.
#[async_trait]
pub trait Extractor: Send {
    /// Check a config without side effects.
    fn validate(&self, _config: &PluginConfig) -> Result<()> {
        Ok(())
    }

    async fn init(&mut self, config: &PluginConfig) -> Result<()>;

    /// Emit every record, returning once extraction is complete.
    async fn extract(&mut self, emitter: &dyn Emit) -> Result<()>;
}

/// Record transformation step.
#[async_trait]
pub trait Processor: Send + Sync {
    fn validate(&self, _config: &PluginConfig) -> Result<()> {
        Ok(())
    }

    async fn init(&mut self, config: &PluginConfig) -> Result<()>;

    async fn process(&self, record: Record) -> Result<Record>;
}

/// Record destination.
#[async_trait]
pub trait Sink: Send {
    fn validate(&self, _config: &PluginConfig) -> Result<()> {
        Ok(())
    }

    async fn init(&mut self, config: &PluginConfig) -> Result<()>;

    /// Deliver one batch. May be called again with the same batch when a
    /// previous call failed with a retryable error.
    async fn write(&mut self, batch: &[Record]) -> Result<()>;

    /// Release resources after the final batch.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct LabelsConfig {
        labels: std::collections::BTreeMap<String, String>,
    }

    #[derive(Debug, Default, Deserialize)]
    struct OptionalConfig {
        #[serde(default)]
        verbose: bool,
    }

    #[test]
    fn parse_typed_config() {
        let config = PluginConfig::new(json!({"labels": {"team": "data"}}));
        let parsed: LabelsConfig = config.parse().unwrap();
        assert_eq!(parsed.labels["team"], "data");
    }

    #[test]
    fn parse_reports_missing_fields() {
        let config = PluginConfig::new(json!({}));
        let err = config.parse::<LabelsConfig>().unwrap_err();
        assert_eq!(err.errors.len(), 1);
        assert!(err.errors[0].message.contains("labels"));
    }

    #[test]
    fn parse_treats_null_as_empty_object() {
        let parsed: OptionalConfig = PluginConfig::default().parse().unwrap();
        assert!(!parsed.verbose);
    }

    #[test]
    fn plugin_kind_serde_is_snake_case() {
        assert_eq!(serde_json::to_string(&PluginKind::Sink).unwrap(), "\"sink\"");
        assert_eq!(PluginKind::Processor.to_string(), "processor");
    }
}
