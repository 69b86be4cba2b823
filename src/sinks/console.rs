//! Console sink: one JSON line per batch

use super::{envelope, Sink};
use crate::collectors::Record;
use crate::error::{ExporterError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

pub struct ConsoleSink<W = Stdout> {
    writer: Mutex<W>,
    initialized: AtomicBool,
}

impl ConsoleSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> ConsoleSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> Sink for ConsoleSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn name(&self) -> &str {
        "stdout"
    }

    async fn initialize(&self) -> Result<()> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn write(&self, records: &[Record], measurement: &str) -> Result<()> {
        let mut line = serde_json::to_vec(&envelope(records, measurement))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|e| ExporterError::SinkWriteFailed(format!("stdout: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| ExporterError::SinkWriteFailed(format!("stdout: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        if self.initialized.swap(false, Ordering::SeqCst) {
            self.writer.lock().await.flush().await?;
        }
        Ok(())
    }
}
