use crate::errors::{HubError, HubResult};
use crate::messages::SpectralReading;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tracing::trace;

/// Line format for readings sent to the host
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Text,
}

/// Destination for measurement reports. Failures never stop polling.
#[async_trait]
pub trait ReportSink: Send {
    async fn publish(&mut self, reading: &SpectralReading) -> HubResult<()>;
}

/// Writes one line per reading to any async writer (stdout, serial port)
pub struct WriterSink<W> {
    writer: W,
    format: ReportFormat,
}

impl<W: AsyncWrite + Unpin + Send> WriterSink<W> {
    pub fn new(writer: W, format: ReportFormat) -> Self {
        Self { writer, format }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ReportSink for WriterSink<W> {
    async fn publish(&mut self, reading: &SpectralReading) -> HubResult<()> {
        let mut line = match self.format {
            ReportFormat::Json => reading.to_json().map_err(|e| HubError::PublishError {
                reason: e.to_string(),
            })?,
            ReportFormat::Text => reading.to_text(),
        };
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Fans readings out to in-process subscribers
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<SpectralReading>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SpectralReading> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl ReportSink for BroadcastSink {
    async fn publish(&mut self, reading: &SpectralReading) -> HubResult<()> {
        // No subscribers is not an error, the reading is simply dropped
        if self.tx.send(reading.clone()).is_err() {
            trace!("[report] no subscribers for ch{} reading", reading.h.channel);
        }
        Ok(())
    }
}
