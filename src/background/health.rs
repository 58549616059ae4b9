//! Health board - surfaced health signals and overall status
//!
//! Only two conditions are surfaced to operators:
//! - repeated tick failure: `failure_threshold` consecutive ticks could not
//!   fetch their inputs (raised once, cleared by the first good tick)
//! - persistence corruption: a journal tail or learning-state entry had to
//!   be discarded at startup
//!
//! Everything else (a single failed fetch, insufficient history, a skipped
//! retrain) is logged but does not change health.

use std::collections::VecDeque;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

/// Events kept for the status API.
const MAX_EVENTS: usize = 100;

/// Component health status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum HealthStatus {
    /// Operating normally
    Healthy,
    /// Running with reduced capability
    Degraded { reason: String },
    /// Not producing fresh decisions
    Unhealthy { reason: String },
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded { reason } => write!(f, "DEGRADED: {}", reason),
            HealthStatus::Unhealthy { reason } => write!(f, "UNHEALTHY: {}", reason),
        }
    }
}

/// A health transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum HealthSignal {
    RepeatedTickFailure { consecutive: u32, last_error: String },
    /// A good tick after a raised tick failure
    Recovered { after_failures: u32 },
    PersistenceCorruption { component: String, detail: String },
}

impl HealthSignal {
    pub fn is_tick_failure(&self) -> bool {
        matches!(self, HealthSignal::RepeatedTickFailure { .. })
    }
}

impl std::fmt::Display for HealthSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthSignal::RepeatedTickFailure { consecutive, last_error } => {
                write!(f, "{} consecutive failed ticks (last: {})", consecutive, last_error)
            }
            HealthSignal::Recovered { after_failures } => {
                write!(f, "recovered after {} failed ticks", after_failures)
            }
            HealthSignal::PersistenceCorruption { component, detail } => {
                write!(f, "{} corruption: {}", component, detail)
            }
        }
    }
}

// ============================================================================
// Tick Failure Tracker
// ============================================================================

/// Counts consecutive failed ticks and decides when to raise or clear the
/// repeated-failure condition.
#[derive(Debug, Clone)]
pub struct TickFailureTracker {
    threshold: u32,
    consecutive: u32,
    raised: bool,
}

impl TickFailureTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
            raised: false,
        }
    }

    /// Returns a signal exactly once, on the failure that reaches the threshold.
    pub fn record_failure(&mut self, reason: &str) -> Option<HealthSignal> {
        self.consecutive = self.consecutive.saturating_add(1);
        if !self.raised && self.consecutive >= self.threshold {
            self.raised = true;
            return Some(HealthSignal::RepeatedTickFailure {
                consecutive: self.consecutive,
                last_error: reason.to_string(),
            });
        }
        None
    }

    /// Resets the count; returns `Recovered` if the condition was raised.
    pub fn record_success(&mut self) -> Option<HealthSignal> {
        let after_failures = std::mem::take(&mut self.consecutive);
        if std::mem::take(&mut self.raised) {
            Some(HealthSignal::Recovered { after_failures })
        } else {
            None
        }
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn is_raised(&self) -> bool {
        self.raised
    }
}

// ============================================================================
// Health Board
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct HealthEvent {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub signal: HealthSignal,
}

#[derive(Debug, Default)]
struct BoardInner {
    tick_failure: Option<HealthSignal>,
    corruption: Vec<HealthSignal>,
    degraded_inputs: Option<String>,
    events: VecDeque<HealthEvent>,
}

/// Shared health state, written by the tasks and read by the API.
#[derive(Debug, Default)]
pub struct HealthBoard {
    inner: RwLock<BoardInner>,
}

impl HealthBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a signal and update the active conditions.
    pub fn emit(&self, signal: HealthSignal, at: DateTime<Utc>) {
        match &signal {
            HealthSignal::RepeatedTickFailure { .. } => error!(signal = %signal, "Health condition raised"),
            HealthSignal::Recovered { .. } => info!(signal = %signal, "Health condition cleared"),
            HealthSignal::PersistenceCorruption { .. } => error!(signal = %signal, "Persistence corruption"),
        }

        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        match &signal {
            HealthSignal::RepeatedTickFailure { .. } => inner.tick_failure = Some(signal.clone()),
            HealthSignal::Recovered { .. } => inner.tick_failure = None,
            HealthSignal::PersistenceCorruption { .. } => inner.corruption.push(signal.clone()),
        }
        if inner.events.len() >= MAX_EVENTS {
            inner.events.pop_front();
        }
        inner.events.push_back(HealthEvent { at, signal });
    }

    /// Note that the controller is running on fallback data (or clear it).
    pub fn set_degraded_inputs(&self, reason: Option<String>) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.degraded_inputs != reason {
            if let Some(r) = &reason {
                warn!(reason = %r, "Control inputs degraded");
            }
            inner.degraded_inputs = reason;
        }
    }

    /// Worst active condition.
    pub fn status(&self) -> HealthStatus {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        if let Some(signal) = &inner.tick_failure {
            return HealthStatus::Unhealthy { reason: signal.to_string() };
        }
        if let Some(signal) = inner.corruption.last() {
            return HealthStatus::Degraded { reason: signal.to_string() };
        }
        if let Some(reason) = &inner.degraded_inputs {
            return HealthStatus::Degraded { reason: reason.clone() };
        }
        HealthStatus::Healthy
    }

    /// Recorded signals, oldest first.
    pub fn events(&self) -> Vec<HealthEvent> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.events.iter().cloned().collect()
    }

    /// How many recorded signals match `predicate`.
    pub fn count(&self, predicate: impl Fn(&HealthSignal) -> bool) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.events.iter().filter(|e| predicate(&e.signal)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_raises_exactly_once() {
        let mut tracker = TickFailureTracker::new(3);
        assert!(tracker.record_failure("timeout").is_none());
        assert!(tracker.record_failure("timeout").is_none());
        let raised = tracker.record_failure("timeout");
        assert!(matches!(
            raised,
            Some(HealthSignal::RepeatedTickFailure { consecutive: 3, .. })
        ));
        assert!(tracker.record_failure("timeout").is_none());
        assert!(tracker.record_failure("timeout").is_none());
        assert!(tracker.is_raised());
    }

    #[test]
    fn test_success_clears_and_rearms() {
        let mut tracker = TickFailureTracker::new(2);
        tracker.record_failure("x");
        tracker.record_failure("x");
        assert_eq!(tracker.record_success(), Some(HealthSignal::Recovered { after_failures: 2 }));
        assert_eq!(tracker.consecutive(), 0);
        assert!(tracker.record_success().is_none());

        tracker.record_failure("y");
        assert!(tracker.record_failure("y").is_some());
    }

    #[test]
    fn test_success_below_threshold_is_silent() {
        let mut tracker = TickFailureTracker::new(3);
        tracker.record_failure("x");
        assert!(tracker.record_success().is_none());
    }

    #[test]
    fn test_board_status_precedence() {
        let board = HealthBoard::new();
        let now = Utc::now();
        assert_eq!(board.status(), HealthStatus::Healthy);

        board.set_degraded_inputs(Some("telemetry stale".to_string()));
        assert!(matches!(board.status(), HealthStatus::Degraded { .. }));

        board.emit(
            HealthSignal::RepeatedTickFailure { consecutive: 3, last_error: "timeout".to_string() },
            now,
        );
        assert!(matches!(board.status(), HealthStatus::Unhealthy { .. }));

        board.emit(HealthSignal::Recovered { after_failures: 3 }, now);
        board.set_degraded_inputs(None);
        assert_eq!(board.status(), HealthStatus::Healthy);
        assert_eq!(board.count(HealthSignal::is_tick_failure), 1);
        assert_eq!(board.events().len(), 2);
    }

    #[test]
    fn test_corruption_degrades() {
        let board = HealthBoard::new();
        board.emit(
            HealthSignal::PersistenceCorruption {
                component: "history journal".to_string(),
                detail: "2 lines discarded".to_string(),
            },
            Utc::now(),
        );
        assert!(board.status().to_string().starts_with("DEGRADED"));
    }
}
