//! `labels` processor: merges configured labels into each record.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use metasync_types::{PluginConfig, Processor, Record};
use serde::Deserialize;
use serde_json::Value;

pub const NAME: &str = "labels";

#[derive(Debug, Deserialize)]
struct LabelsConfig {
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct LabelsProcessor {
    labels: BTreeMap<String, String>,
}

#[async_trait]
impl Processor for LabelsProcessor {
    fn validate(&self, config: &PluginConfig) -> Result<()> {
        config.parse::<LabelsConfig>()?;
        Ok(())
    }

    async fn init(&mut self, config: &PluginConfig) -> Result<()> {
        self.labels = config.parse::<LabelsConfig>()?.labels;
        Ok(())
    }

    async fn process(&self, record: Record) -> Result<Record> {
        let mut data = record.into_data();
        let Some(fields) = data.as_object_mut() else {
            bail!("record is not an object");
        };
        let labels = fields
            .entry("labels")
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        let Some(labels) = labels.as_object_mut() else {
            bail!("record field \"labels\" is not an object");
        };
        for (key, value) in &self.labels {
            labels.insert(key.clone(), Value::String(value.clone()));
        }
        Ok(Record::new(data))
    }
}
