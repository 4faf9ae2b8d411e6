//! Sink - where the shared output channel drains to
//!
//! ## Batching Strategy
//!
//! Points are buffered and handed to the sink in batches:
//! - **Size trigger**: flush once `batch_size` points are buffered
//! - **Time trigger**: flush every `flush_interval` if anything is buffered
//!
//! Whatever is left when the channel closes is flushed before returning.
//! A failed batch is logged and dropped; the drain keeps going.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, instrument, trace};

use crate::config::SinkConfig;
use crate::datapoint::DataPoint;

#[async_trait]
pub trait Sink: Send + Sync {
    /// Deliver one batch. The batch is never empty.
    async fn send_batch(&self, batch: &[DataPoint]) -> anyhow::Result<()>;

    fn name(&self) -> &str;
}

/// Writes every point as a JSON line on stdout
#[derive(Debug, Default)]
pub struct PrintSink;

#[async_trait]
impl Sink for PrintSink {
    async fn send_batch(&self, batch: &[DataPoint]) -> anyhow::Result<()> {
        let mut stdout = std::io::stdout().lock();
        for dp in batch {
            serde_json::to_writer(&mut stdout, dp)?;
            stdout.write_all(b"\n")?;
        }
        stdout.flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "print"
    }
}

/// POSTs batches as a JSON array to an OpenTSDB-style `/api/put`
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
}

impl HttpSink {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            url: format!("{}/api/put", base_url.trim_end_matches('/')),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Sink for HttpSink {
    async fn send_batch(&self, batch: &[DataPoint]) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(batch)
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("{} responded with {status}", self.url);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainOptions {
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl Default for DrainOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub points: u64,
    pub batches: u64,
    pub failed_batches: u64,
}

/// Builds the sink and drain options described by `config`.
pub fn from_config(config: &SinkConfig) -> anyhow::Result<(Box<dyn Sink>, DrainOptions)> {
    match config {
        SinkConfig::Print => Ok((Box::new(PrintSink), DrainOptions::default())),
        SinkConfig::Http {
            url,
            batch_size,
            flush_secs,
        } => Ok((
            Box::new(HttpSink::new(url)?),
            DrainOptions {
                batch_size: (*batch_size).max(1),
                flush_interval: Duration::from_secs((*flush_secs).max(1)),
            },
        )),
    }
}

/// Forwards everything received on `rx` to `sink` until the channel closes.
#[instrument(skip_all, fields(sink = sink.name()))]
pub async fn drain(
    mut rx: mpsc::Receiver<DataPoint>,
    sink: &dyn Sink,
    options: DrainOptions,
) -> DrainStats {
    let batch_size = options.batch_size.max(1);
    let mut stats = DrainStats::default();
    let mut buffer = Vec::with_capacity(batch_size);

    let mut ticker = time::interval_at(
        Instant::now() + options.flush_interval,
        options.flush_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(dp) => {
                    buffer.push(dp);
                    if buffer.len() >= batch_size {
                        trace!("batch size reached");
                        flush(sink, &mut buffer, &mut stats).await;
                    }
                }
                None => break,
            },

            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    trace!("flush interval reached");
                    flush(sink, &mut buffer, &mut stats).await;
                }
            }
        }
    }

    if !buffer.is_empty() {
        flush(sink, &mut buffer, &mut stats).await;
    }

    debug!(
        "output closed after {} points in {} batches ({} failed)",
        stats.points, stats.batches, stats.failed_batches
    );
    stats
}

async fn flush(sink: &dyn Sink, buffer: &mut Vec<DataPoint>, stats: &mut DrainStats) {
    let batch = std::mem::take(buffer);
    stats.batches += 1;
    stats.points += batch.len() as u64;

    if let Err(e) = sink.send_batch(&batch).await {
        stats.failed_batches += 1;
        error!("failed to send {} points: {e:#}", batch.len());
    }
}
