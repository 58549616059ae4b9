//! Retrain Scheduler
//!
//! Decides when the learning engine refits and runs the fit off the async
//! runtime. A retrain is due when either:
//! - `retrain_interval_secs` have passed since the last attempt, or
//! - `retrain_every_samples` new records reached the history store.
//!
//! The interval can be overridden for testing:
//! ```bash
//! # Retrain every 10 minutes
//! HEATWISE_RETRAIN_INTERVAL_SECS=600 heatwise --simulate
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::engine::{LearningEngine, RetrainReport};
use super::storage::LearningStateStore;
use crate::config::LearningConfig;
use crate::pipeline::{Clock, StatusHandle};
use crate::storage::HistoricalDataStore;

/// Environment override for the retrain interval.
pub const RETRAIN_INTERVAL_ENV: &str = "HEATWISE_RETRAIN_INTERVAL_SECS";

/// Learning-state versions kept in the database.
const STATE_VERSIONS_KEPT: usize = 30;

/// Get the retrain interval.
///
/// Precedence: `HEATWISE_RETRAIN_INTERVAL_SECS` env var > `learning.retrain_interval_secs` TOML
pub fn get_interval_secs(config: &LearningConfig) -> u64 {
    std::env::var(RETRAIN_INTERVAL_ENV)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(config.retrain_interval_secs)
}

/// Time- and volume-based retrain trigger.
#[derive(Debug, Clone)]
pub struct RetrainPolicy {
    interval: chrono::Duration,
    every_samples: u64,
    last_attempt: Option<DateTime<Utc>>,
    appended_at_last_attempt: u64,
}

impl RetrainPolicy {
    pub fn new(interval_secs: u64, every_samples: u64) -> Self {
        Self {
            interval: chrono::Duration::seconds(i64::try_from(interval_secs).unwrap_or(i64::MAX)),
            every_samples: every_samples.max(1),
            last_attempt: None,
            appended_at_last_attempt: 0,
        }
    }

    /// `total_appended` is the store's lifetime append counter.
    ///
    /// The first check after startup is always due.
    pub fn is_due(&self, now: DateTime<Utc>, total_appended: u64) -> bool {
        let Some(last) = self.last_attempt else {
            return true;
        };
        now - last >= self.interval
            || total_appended.saturating_sub(self.appended_at_last_attempt) >= self.every_samples
    }

    pub fn mark_attempt(&mut self, now: DateTime<Utc>, total_appended: u64) {
        self.last_attempt = Some(now);
        self.appended_at_last_attempt = total_appended;
    }
}

/// Periodic retrain task.
pub struct LearningScheduler {
    engine: Arc<LearningEngine>,
    history: Arc<HistoricalDataStore>,
    state_store: Option<Arc<LearningStateStore>>,
    status: Arc<StatusHandle>,
    clock: Arc<dyn Clock>,
    policy: RetrainPolicy,
    poll_interval: Duration,
}

impl LearningScheduler {
    pub fn new(
        config: &LearningConfig,
        engine: Arc<LearningEngine>,
        history: Arc<HistoricalDataStore>,
        status: Arc<StatusHandle>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let interval_secs = get_interval_secs(config);
        info!(
            interval_secs,
            every_samples = config.retrain_every_samples,
            "[Learning] Retrain scheduler created (env: {})",
            RETRAIN_INTERVAL_ENV
        );
        Self {
            engine,
            history,
            state_store: None,
            status,
            clock,
            policy: RetrainPolicy::new(interval_secs, config.retrain_every_samples),
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
        }
    }

    /// Persist every published state.
    pub fn with_state_store(mut self, store: Arc<LearningStateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    /// Retrain if due. The fit and the database write run on a blocking thread.
    pub async fn run_once(&mut self) -> Result<Option<RetrainReport>> {
        let now = self.clock.now();
        let appended = self.history.total_appended();
        if !self.policy.is_due(now, appended) {
            return Ok(None);
        }
        self.policy.mark_attempt(now, appended);

        let engine = Arc::clone(&self.engine);
        let history = Arc::clone(&self.history);
        let store = self.state_store.clone();

        let report = tokio::task::spawn_blocking(move || {
            let snapshot = history.snapshot();
            debug!(records = snapshot.len(), "[Learning] Retraining");
            let report = engine.retrain(&snapshot, now);
            if report.published {
                if let Some(store) = store {
                    persist(&store, &report);
                }
            }
            report
        })
        .await
        .context("retrain task panicked")?;

        self.status.record_retrain(now, report.outcome.clone());
        Ok(Some(report))
    }

    /// Poll until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[Learning] Shutdown signal received");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!("[Learning] Retrain failed: {:#}", e);
                    }
                }
            }
        }
    }
}

fn persist(store: &LearningStateStore, report: &RetrainReport) {
    if let Err(e) = store.store(&report.state) {
        error!(version = report.state.version, error = %e, "[Learning] Failed to persist learning state");
        return;
    }
    if let Err(e) = store.prune(STATE_VERSIONS_KEPT) {
        error!(error = %e, "[Learning] Failed to prune old learning states");
    }
}
