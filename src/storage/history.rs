//! Historical Data Store - bounded, time-ordered observation log
//!
//! A `VecDeque` ring holds the most recent `capacity` records in timestamp
//! order; the oldest record is evicted first once full. An optional
//! JSON-lines journal makes the contents survive restarts.
//!
//! Readers take a stable copy under a read lock, so an append that lands
//! while the learning engine iterates never disturbs what it sees.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use super::journal::{Journal, JournalError, JournalRecovery};
use crate::types::ObservationRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record at {got} is older than the newest stored record ({last})")]
    OutOfOrder { last: DateTime<Utc>, got: DateTime<Utc> },
    /// The record was kept in memory but could not be persisted.
    #[error("record kept in memory but not persisted: {0}")]
    Journal(#[from] JournalError),
}

/// Counters exposed for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub len: usize,
    pub capacity: usize,
    pub total_appended: u64,
    pub evicted: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub persistent: bool,
}

#[derive(Debug, Default)]
struct Ring {
    records: VecDeque<ObservationRecord>,
    total_appended: u64,
    evicted: u64,
}

/// Bounded FIFO of observation records.
#[derive(Debug)]
pub struct HistoricalDataStore {
    capacity: usize,
    // Lock order: journal before ring.
    journal: Option<Mutex<Journal>>,
    ring: RwLock<Ring>,
}

impl HistoricalDataStore {
    /// Memory-only store; contents are lost on drop.
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            journal: None,
            ring: RwLock::new(Ring::default()),
        }
    }

    /// Open a journal-backed store, recovering whatever the journal holds.
    ///
    /// A malformed tail is discarded and reported in the returned
    /// `JournalRecovery`; it never fails the open.
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<(Self, JournalRecovery), StoreError> {
        let capacity = capacity.max(1);
        let (journal, mut recovery) = Journal::open(path)?;

        if !recovery.is_clean() {
            error!(
                path = %journal.path().display(),
                discarded_lines = recovery.discarded_lines,
                truncated_bytes = recovery.truncated_bytes,
                "History journal had an unreadable tail, continuing with valid prefix"
            );
        }

        let mut ring = Ring::default();
        for record in recovery.records.drain(..) {
            if let Some(last) = ring.records.back() {
                if record.timestamp < last.timestamp {
                    warn!(timestamp = %record.timestamp, "Skipping out-of-order journal record");
                    continue;
                }
            }
            ring.records.push_back(record);
            if ring.records.len() > capacity {
                ring.records.pop_front();
            }
        }
        ring.total_appended = ring.records.len() as u64;
        recovery.records = ring.records.iter().cloned().collect();

        Ok((
            Self {
                capacity,
                journal: Some(Mutex::new(journal)),
                ring: RwLock::new(ring),
            },
            recovery,
        ))
    }

    /// Append a record, evicting the oldest one if the store is full.
    ///
    /// Records must not be older than the newest stored record. A journal
    /// failure is returned after the record has been kept in memory.
    pub fn append(&self, record: ObservationRecord) -> Result<(), StoreError> {
        let mut journal = self
            .journal
            .as_ref()
            .map(|j| j.lock().unwrap_or_else(|e| e.into_inner()));

        {
            let mut ring = self.ring.write().unwrap_or_else(|e| e.into_inner());
            if let Some(last) = ring.records.back() {
                if record.timestamp < last.timestamp {
                    return Err(StoreError::OutOfOrder {
                        last: last.timestamp,
                        got: record.timestamp,
                    });
                }
            }
            let persisted = journal.as_deref_mut().map(|j| j.append(&record));
            ring.records.push_back(record);
            ring.total_appended += 1;
            while ring.records.len() > self.capacity {
                ring.records.pop_front();
                ring.evicted += 1;
            }
            if let Some(Err(e)) = persisted {
                return Err(e.into());
            }
        }

        if let Some(j) = journal.as_deref_mut() {
            if j.line_count() > self.capacity.saturating_mul(2) {
                let ring = self.ring.read().unwrap_or_else(|e| e.into_inner());
                j.rewrite(ring.records.iter())?;
            }
        }
        Ok(())
    }

    /// Stable copy of every stored record, oldest first.
    pub fn snapshot(&self) -> Vec<ObservationRecord> {
        let ring = self.ring.read().unwrap_or_else(|e| e.into_inner());
        ring.records.iter().cloned().collect()
    }

    /// Records with `start <= timestamp <= end`, oldest first.
    pub fn query_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<ObservationRecord> {
        if end < start {
            return Vec::new();
        }
        let ring = self.ring.read().unwrap_or_else(|e| e.into_inner());
        let from = ring.records.partition_point(|r| r.timestamp < start);
        let to = ring.records.partition_point(|r| r.timestamp <= end);
        ring.records.range(from..to).cloned().collect()
    }

    pub fn latest(&self) -> Option<ObservationRecord> {
        let ring = self.ring.read().unwrap_or_else(|e| e.into_inner());
        ring.records.back().cloned()
    }

    pub fn len(&self) -> usize {
        self.ring.read().unwrap_or_else(|e| e.into_inner()).records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records appended over the store's lifetime, including recovered ones.
    pub fn total_appended(&self) -> u64 {
        self.ring.read().unwrap_or_else(|e| e.into_inner()).total_appended
    }

    pub fn stats(&self) -> StoreStats {
        let ring = self.ring.read().unwrap_or_else(|e| e.into_inner());
        StoreStats {
            len: ring.records.len(),
            capacity: self.capacity,
            total_appended: ring.total_appended,
            evicted: ring.evicted,
            oldest: ring.records.front().map(|r| r.timestamp),
            newest: ring.records.back().map(|r| r.timestamp),
            persistent: self.journal.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    fn make_record(i: i64) -> ObservationRecord {
        ObservationRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap() + Duration::minutes(5 * i),
            indoor_temp: 20.0 + i as f64 * 0.01,
            prior_indoor_temp: 20.0,
            predicted_indoor_temp: 20.0,
            outdoor_temp: 5.0,
            wind_speed: Some(0.0),
            solar_irradiance: Some(0.0),
            target_temp: 21.0,
            heat_pump_modulation_pct: 40.0,
            measured_power: None,
            derived_cop: None,
            interval_hours: 5.0 / 60.0,
        }
    }

    #[test]
    fn test_capacity_never_exceeded_and_fifo_eviction() {
        let store = HistoricalDataStore::in_memory(10);
        for i in 0..25 {
            store.append(make_record(i)).unwrap();
            assert!(store.len() <= 10);
            if i >= 10 {
                // Oldest survivor is always the record appended `capacity` ago
                let snap = store.snapshot();
                assert_eq!(snap[0], make_record(i - 9));
            }
        }
        let stats = store.stats();
        assert_eq!(stats.total_appended, 25);
        assert_eq!(stats.evicted, 15);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let store = HistoricalDataStore::in_memory(10);
        store.append(make_record(5)).unwrap();
        let err = store.append(make_record(2)).unwrap_err();
        assert!(matches!(err, StoreError::OutOfOrder { .. }));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_query_range_inclusive() {
        let store = HistoricalDataStore::in_memory(100);
        for i in 0..20 {
            store.append(make_record(i)).unwrap();
        }
        let start = make_record(5).timestamp;
        let end = make_record(9).timestamp;
        let hits = store.query_range(start, end);
        assert_eq!(hits.len(), 5);
        assert_eq!(hits[0].timestamp, start);
        assert_eq!(hits[4].timestamp, end);
        assert!(store.query_range(end, start).is_empty());
    }

    #[test]
    fn test_snapshot_unaffected_by_later_appends() {
        let store = HistoricalDataStore::in_memory(100);
        for i in 0..5 {
            store.append(make_record(i)).unwrap();
        }
        let snap = store.snapshot();
        store.append(make_record(5)).unwrap();
        assert_eq!(snap.len(), 5);
        assert_eq!(store.len(), 6);
    }

    #[test]
    fn test_persistent_store_restores_last_capacity_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        {
            let (store, _) = HistoricalDataStore::open(&path, 8).unwrap();
            for i in 0..30 {
                store.append(make_record(i)).unwrap();
            }
        }
        let (store, recovery) = HistoricalDataStore::open(&path, 8).unwrap();
        assert!(recovery.is_clean());
        assert_eq!(store.len(), 8);
        assert_eq!(store.snapshot()[0].timestamp, make_record(22).timestamp);
        assert_eq!(store.latest().map(|r| r.timestamp), Some(make_record(29).timestamp));
    }
}
