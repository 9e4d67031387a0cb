//! The unit of metadata that flows through a pipeline.

use std::sync::Arc;

use serde_json::Value;

/// One extracted metadata entry.
///
/// The payload sits behind an `Arc`, so fanning a record out to several
/// sinks is a reference-count bump. Processors never mutate a record in
/// place; they build a replacement with [`Record::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    data: Arc<Value>,
}

impl Record {
    #[must_use]
    pub fn new(data: Value) -> Self {
        Self {
            data: Arc::new(data),
        }
    }

    /// Borrow the payload.
    #[must_use]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Take the payload, cloning only when another holder still shares it.
    #[must_use]
    pub fn into_data(self) -> Value {
        Arc::unwrap_or_clone(self.data)
    }

    /// The `urn` field of object payloads, used to identify records in logs.
    #[must_use]
    pub fn urn(&self) -> Option<&str> {
        self.data.get("urn").and_then(Value::as_str)
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
