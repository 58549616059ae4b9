//! Periodic control loop
//!
//! Drives a [`PredictiveController`] on a fixed tick. Ticks are strictly
//! sequential: a slow tick delays the next one instead of overlapping it.

use std::sync::Arc;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::clock::Clock;
use super::controller::PredictiveController;

/// Counters returned when the loop stops.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LoopStats {
    pub ticks: u64,
    pub committed: u64,
    pub holds: u64,
    pub observations: u64,
}

pub struct ControlLoop {
    controller: PredictiveController,
    clock: Arc<dyn Clock>,
    cancel_token: CancellationToken,
}

impl ControlLoop {
    pub fn new(controller: PredictiveController, clock: Arc<dyn Clock>, cancel_token: CancellationToken) -> Self {
        Self {
            controller,
            clock,
            cancel_token,
        }
    }

    /// Tick until cancelled.
    pub async fn run(mut self) -> LoopStats {
        let period = self.controller.tick_interval();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats = LoopStats::default();

        info!(interval_secs = period.as_secs(), "[ControlLoop] Started");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("[ControlLoop] Shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.controller.tick(self.clock.now()).await;
                    stats.ticks += 1;
                    if report.committed {
                        stats.committed += 1;
                    }
                    if report.decision.is_hold() {
                        stats.holds += 1;
                    }
                    if report.observation.is_some() {
                        stats.observations += 1;
                    }
                }
            }
        }

        info!(
            ticks = stats.ticks,
            committed = stats.committed,
            holds = stats.holds,
            observations = stats.observations,
            "[ControlLoop] Stopped"
        );
        stats
    }
}
