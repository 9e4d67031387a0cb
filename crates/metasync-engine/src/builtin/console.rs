//! `console` sink: one JSON document per line.

use std::io::Write;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metasync_types::{PluginConfig, Record, Sink};

pub const NAME: &str = "console";

pub struct ConsoleSink {
    out: Box<dyn Write + Send>,
}

impl ConsoleSink {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    #[must_use]
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }
}

#[async_trait]
impl Sink for ConsoleSink {
    async fn init(&mut self, _config: &PluginConfig) -> Result<()> {
        Ok(())
    }

    async fn write(&mut self, batch: &[Record]) -> Result<()> {
        for record in batch {
            serde_json::to_writer(&mut self.out, record.data())
                .context("Failed to serialize record")?;
            self.out.write_all(b"\n")?;
        }
        self.out.flush()?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}
