//! Declarative pipeline definition.

use serde::{Deserialize, Serialize};

use crate::plugin::PluginConfig;

/// One pipeline: a source, ordered processors, and one or more sinks.
///
/// A recipe is read-only input to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(default)]
    pub name: String,
    pub source: PluginRecipe,
    #[serde(default)]
    pub processors: Vec<PluginRecipe>,
    #[serde(default)]
    pub sinks: Vec<PluginRecipe>,
}

/// A plugin reference plus its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRecipe {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl PluginRecipe {
    #[must_use]
    pub fn new(name: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            scope: None,
            config,
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// The config handed to the plugin's `validate` and `init`.
    #[must_use]
    pub fn plugin_config(&self) -> PluginConfig {
        PluginConfig {
            urn_scope: self.scope.clone(),
            raw: self.config.clone(),
        }
    }
}

impl Recipe {
    #[must_use]
    pub fn new(name: impl Into<String>, source: PluginRecipe) -> Self {
        Self {
            name: name.into(),
            source,
            processors: Vec::new(),
            sinks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_processor(mut self, processor: PluginRecipe) -> Self {
        self.processors.push(processor);
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: PluginRecipe) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_preserves_order() {
        let recipe = Recipe::new("users", PluginRecipe::new("postgres", json!({})))
            .with_processor(PluginRecipe::new("labels", json!({})))
            .with_processor(PluginRecipe::new("enrich", json!({})))
            .with_sink(PluginRecipe::new("console", json!(null)));
        let names: Vec<&str> = recipe.processors.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["labels", "enrich"]);
        assert_eq!(recipe.sinks.len(), 1);
    }

    #[test]
    fn plugin_config_carries_scope() {
        let source = PluginRecipe::new("postgres", json!({"host": "localhost"})).with_scope("prod");
        let config = source.plugin_config();
        assert_eq!(config.urn_scope.as_deref(), Some("prod"));
        assert_eq!(config.raw["host"], "localhost");
    }

    #[test]
    fn deserialize_defaults_optional_sections() {
        let recipe: Recipe =
            serde_json::from_value(json!({"source": {"name": "static"}})).unwrap();
        assert!(recipe.name.is_empty());
        assert!(recipe.processors.is_empty());
        assert!(recipe.sinks.is_empty());
        assert!(recipe.source.config.is_null());
    }
}
