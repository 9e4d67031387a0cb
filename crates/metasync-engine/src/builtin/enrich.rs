//! `enrich` processor: copies string-valued config entries onto records.

use anyhow::Result;
use async_trait::async_trait;
use metasync_types::{PluginConfig, Processor, Record};
use serde_json::{Map, Value};

pub const NAME: &str = "enrich";

#[derive(Debug, Default)]
pub struct EnrichProcessor {
    fields: Map<String, Value>,
}

#[async_trait]
impl Processor for EnrichProcessor {
    async fn init(&mut self, config: &PluginConfig) -> Result<()> {
        let fields: Map<String, Value> = config.parse()?;
        // Non-string values are ignored.
        self.fields = fields.into_iter().filter(|(_, v)| v.is_string()).collect();
        Ok(())
    }

    async fn process(&self, record: Record) -> Result<Record> {
        if self.fields.is_empty() || !record.data().is_object() {
            return Ok(record);
        }
        let mut data = record.into_data();
        if let Some(object) = data.as_object_mut() {
            for (key, value) in &self.fields {
                object.insert(key.clone(), value.clone());
            }
        }
        Ok(Record::new(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn sets_string_fields_only() {
        let mut p = EnrichProcessor::default();
        p.init(&PluginConfig::new(json!({"owner": "data-eng", "priority": 3})))
            .await
            .unwrap();

        let out = p.process(Record::new(json!({"urn": "a"}))).await.unwrap();
        assert_eq!(out.data(), &json!({"urn": "a", "owner": "data-eng"}));
    }

    #[tokio::test]
    async fn passes_non_object_records_through() {
        let mut p = EnrichProcessor::default();
        p.init(&PluginConfig::new(json!({"owner": "x"}))).await.unwrap();
        let out = p.process(Record::new(json!([1, 2]))).await.unwrap();
        assert_eq!(out.data(), &json!([1, 2]));
    }

    #[tokio::test]
    async fn missing_config_is_a_no_op() {
        let mut p = EnrichProcessor::default();
        p.init(&PluginConfig::default()).await.unwrap();
        let out = p.process(Record::new(json!({"urn": "a"}))).await.unwrap();
        assert_eq!(out.data(), &json!({"urn": "a"}));
    }
}
