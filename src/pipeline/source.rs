//! Collaborator interfaces and JSON-lines boundary adapters.
//!
//! The controller talks to the outside world through three traits:
//! a forecast source, a telemetry source and a command sink. Transport and
//! provider payloads live behind them.
//!
//! The adapters here speak a neutral line protocol, one JSON object per line:
//!
//! ```text
//! {"type":"forecast","points":[{"timestamp":"...","outdoor_temp":4.0,...}]}
//! {"type":"telemetry","timestamp":"...","indoor_temp":20.6,"modulation_pct":35.0}
//! ```
//!
//! and emit one `SlotDecision` per committed tick on stdout.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::{Forecast, SlotDecision, Telemetry, WeatherPoint};

/// Where forecasts come from.
///
/// The controller wraps every call in a timeout.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn fetch_forecast(&self) -> Result<Forecast>;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;
}

/// Where live heat-pump readings come from.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn fetch_telemetry(&self) -> Result<Telemetry>;

    fn source_name(&self) -> &str;
}

/// Where the current slot's command goes.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send(&self, slot: &SlotDecision) -> Result<()>;

    fn sink_name(&self) -> &str;
}

// ============================================================================
// JSON-lines Feed (stdin)
// ============================================================================

/// One input line.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    Forecast { points: Vec<WeatherPoint> },
    Telemetry(Telemetry),
}

#[derive(Debug, Default)]
struct FeedInputs {
    forecast: Option<Forecast>,
    telemetry: Option<Telemetry>,
    lines: u64,
    rejected: u64,
}

/// Latest forecast and telemetry received over a JSON-lines stream.
///
/// Serves as both `ForecastSource` and `TelemetrySource`. Fetches return
/// the most recent message; the controller judges staleness from the
/// telemetry timestamp.
#[derive(Debug, Default)]
pub struct JsonLinesFeed {
    inputs: Mutex<FeedInputs>,
}

impl JsonLinesFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and apply one line. Blank lines are ignored.
    pub fn ingest_line(&self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        let mut inputs = self.inputs.lock().unwrap_or_else(|e| e.into_inner());
        inputs.lines += 1;

        let parsed = serde_json::from_str::<FeedMessage>(line)
            .context("malformed feed message")
            .and_then(|msg| match msg {
                FeedMessage::Forecast { points } => {
                    Forecast::new(points).map(FeedInput::Forecast).context("invalid forecast")
                }
                FeedMessage::Telemetry(t) => Ok(FeedInput::Telemetry(t)),
            });

        match parsed {
            Ok(FeedInput::Forecast(f)) => {
                debug!(points = f.len(), "[Feed] Forecast received");
                inputs.forecast = Some(f);
                Ok(())
            }
            Ok(FeedInput::Telemetry(t)) => {
                inputs.telemetry = Some(t);
                Ok(())
            }
            Err(e) => {
                inputs.rejected += 1;
                Err(e)
            }
        }
    }

    /// Read lines until EOF or cancellation. Malformed lines are skipped.
    ///
    /// Returns the number of lines read.
    pub async fn run<R>(self: Arc<Self>, reader: R, cancel: CancellationToken) -> Result<u64>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        let mut lines = reader.lines();
        let mut count = 0u64;
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[Feed] Shutdown signal received");
                    break;
                }
                line = lines.next_line() => line.context("failed to read feed")?,
            };
            let Some(line) = next else {
                info!(lines = count, "[Feed] Input reached end");
                break;
            };
            count += 1;
            if let Err(e) = self.ingest_line(&line) {
                warn!("[Feed] Skipping line {}: {:#}", count, e);
            }
        }
        Ok(count)
    }

    /// (lines seen, lines rejected)
    pub fn counters(&self) -> (u64, u64) {
        let inputs = self.inputs.lock().unwrap_or_else(|e| e.into_inner());
        (inputs.lines, inputs.rejected)
    }
}

enum FeedInput {
    Forecast(Forecast),
    Telemetry(Telemetry),
}

#[async_trait]
impl ForecastSource for JsonLinesFeed {
    async fn fetch_forecast(&self) -> Result<Forecast> {
        let inputs = self.inputs.lock().unwrap_or_else(|e| e.into_inner());
        inputs.forecast.clone().ok_or_else(|| anyhow!("no forecast received yet"))
    }

    fn source_name(&self) -> &str {
        "json-lines"
    }
}

#[async_trait]
impl TelemetrySource for JsonLinesFeed {
    async fn fetch_telemetry(&self) -> Result<Telemetry> {
        let inputs = self.inputs.lock().unwrap_or_else(|e| e.into_inner());
        inputs.telemetry.ok_or_else(|| anyhow!("no telemetry received yet"))
    }

    fn source_name(&self) -> &str {
        "json-lines"
    }
}

// ============================================================================
// Stdout Sink
// ============================================================================

/// Writes each committed slot as one JSON line on stdout.
pub struct StdoutSink {
    out: tokio::sync::Mutex<tokio::io::Stdout>,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self {
            out: tokio::sync::Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandSink for StdoutSink {
    async fn send(&self, slot: &SlotDecision) -> Result<()> {
        let mut line = serde_json::to_vec(slot)?;
        line.push(b'\n');
        let mut out = self.out.lock().await;
        out.write_all(&line).await?;
        out.flush().await?;
        Ok(())
    }

    fn sink_name(&self) -> &str {
        "stdout"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORECAST: &str = r#"{"type":"forecast","points":[
        {"timestamp":"2024-01-10T08:00:00Z","outdoor_temp":4.0,"wind_speed":2.0,"solar_irradiance":0.0},
        {"timestamp":"2024-01-10T09:00:00Z","outdoor_temp":5.0}]}"#;

    const TELEMETRY: &str = r#"{"type":"telemetry","timestamp":"2024-01-10T08:05:00Z","indoor_temp":20.6,"modulation_pct":35.0}"#;

    #[tokio::test]
    async fn test_feed_serves_latest_messages() {
        let feed = JsonLinesFeed::new();
        assert!(feed.fetch_forecast().await.is_err());

        feed.ingest_line(&FORECAST.replace('\n', "")).unwrap();
        feed.ingest_line(TELEMETRY).unwrap();

        let forecast = feed.fetch_forecast().await.unwrap();
        assert_eq!(forecast.len(), 2);
        assert_eq!(forecast.points()[1].wind_speed, None);
        let telemetry = feed.fetch_telemetry().await.unwrap();
        assert_eq!(telemetry.modulation_pct, 35.0);
        assert_eq!(telemetry.power_kw, None);
    }

    #[tokio::test]
    async fn test_run_skips_malformed_lines() {
        let input = format!("not json\n\n{}\n{{\"type\":\"forecast\",\"points\":[]}}\n", TELEMETRY);
        let feed = Arc::new(JsonLinesFeed::new());
        let mock = tokio_test::io::Builder::new().read(input.as_bytes()).build();
        let reader = tokio::io::BufReader::new(mock);

        let lines = Arc::clone(&feed)
            .run(reader, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(lines, 4);
        assert_eq!(feed.counters(), (3, 2));
        assert!(feed.fetch_telemetry().await.is_ok());
        assert!(feed.fetch_forecast().await.is_err());
    }
}
