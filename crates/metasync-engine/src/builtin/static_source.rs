//! `static` extractor: emits records listed inline in the recipe.

use anyhow::Result;
use async_trait::async_trait;
use metasync_types::{Emit, Extractor, PluginConfig, Record};
use serde::Deserialize;

pub const NAME: &str = "static";

#[derive(Debug, Deserialize)]
struct StaticConfig {
    records: Vec<serde_json::Value>,
}

#[derive(Debug, Default)]
pub struct StaticExtractor {
    records: Vec<serde_json::Value>,
}

#[async_trait]
impl Extractor for StaticExtractor {
    fn validate(&self, config: &PluginConfig) -> Result<()> {
        config.parse::<StaticConfig>()?;
        Ok(())
    }

    async fn init(&mut self, config: &PluginConfig) -> Result<()> {
        self.records = config.parse::<StaticConfig>()?.records;
        Ok(())
    }

    async fn extract(&mut self, emitter: &dyn Emit) -> Result<()> {
        for value in &self.records {
            emitter.emit(Record::new(value.clone())).await?;
        }
        Ok(())
    }
}
