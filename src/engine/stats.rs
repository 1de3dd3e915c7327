use metriken::*;
use serde::Serialize;

use std::sync::atomic::{AtomicU64, Ordering};

#[metric(
    name = "measurements_collected",
    description = "The number of measurement values handed to the transport",
    metadata = { unit = "values" }
)]
pub static MEASUREMENTS_COLLECTED: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "measurement_collection_time",
    description = "Time spent inside measurement facets for sent reports",
    metadata = { unit = "milliseconds" }
)]
pub static MEASUREMENT_COLLECTION_TIME: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "late_collections",
    description = "The number of measurements whose collection started too late",
    metadata = { unit = "measurements" }
)]
pub static LATE_COLLECTIONS: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "failed_collections",
    description = "The number of measurements whose collection failed",
    metadata = { unit = "measurements" }
)]
pub static FAILED_COLLECTIONS: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "reports_sent",
    description = "The number of reports accepted by the transport",
    metadata = { unit = "reports" }
)]
pub static REPORTS_SENT: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "reports_failed",
    description = "The number of reports the transport failed to deliver",
    metadata = { unit = "reports" }
)]
pub static REPORTS_FAILED: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "scheduled_measurements",
    description = "The number of entries in the collection schedule",
    metadata = { unit = "measurements" }
)]
pub static SCHEDULED_MEASUREMENTS: LazyGauge = LazyGauge::new(Gauge::default);

const MINUTE_MILLIS: u64 = 60_000;

/// Per-engine monitoring counters. Each update is mirrored into the
/// process-wide metriken statics for exposition.
pub struct EngineStats {
    collected: AtomicU64,
    collection_time: AtomicU64,
    late: AtomicU64,
    failed: AtomicU64,
    reports_sent: AtomicU64,
    reports_failed: AtomicU64,

    window_start: AtomicU64,
    window_count: AtomicU64,
    last_rate: AtomicU64,
}

impl EngineStats {
    pub fn new(now: u64) -> Self {
        Self {
            collected: AtomicU64::new(0),
            collection_time: AtomicU64::new(0),
            late: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            reports_sent: AtomicU64::new(0),
            reports_failed: AtomicU64::new(0),
            window_start: AtomicU64::new(now),
            window_count: AtomicU64::new(0),
            last_rate: AtomicU64::new(0),
        }
    }

    /// Record a report that is about to be handed to the transport.
    pub fn record_report(&self, values: u64, collection_time: u64) {
        self.collected.fetch_add(values, Ordering::Relaxed);
        self.window_count.fetch_add(values, Ordering::Relaxed);
        self.collection_time
            .fetch_add(collection_time, Ordering::Relaxed);

        MEASUREMENTS_COLLECTED.add(values);
        MEASUREMENT_COLLECTION_TIME.add(collection_time);
    }

    pub fn late(&self, measurements: u64) {
        self.late.fetch_add(measurements, Ordering::Relaxed);
        LATE_COLLECTIONS.add(measurements);
    }

    pub fn failed(&self, measurements: u64) {
        self.failed.fetch_add(measurements, Ordering::Relaxed);
        FAILED_COLLECTIONS.add(measurements);
    }

    pub fn sent(&self) {
        self.reports_sent.fetch_add(1, Ordering::Relaxed);
        REPORTS_SENT.increment();
    }

    pub fn send_failed(&self) {
        self.reports_failed.fetch_add(1, Ordering::Relaxed);
        REPORTS_FAILED.increment();
    }

    /// Values collected per minute over the last completed window. A window
    /// closes the first time this is read at least a minute after it opened.
    pub fn measurements_per_minute(&self, now: u64) -> u64 {
        let start = self.window_start.load(Ordering::Relaxed);
        let elapsed = now.saturating_sub(start);

        if elapsed >= MINUTE_MILLIS
            && self
                .window_start
                .compare_exchange(start, now, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        {
            let count = self.window_count.swap(0, Ordering::AcqRel);
            let rate = count * MINUTE_MILLIS / elapsed;
            self.last_rate.store(rate, Ordering::Relaxed);
            return rate;
        }

        self.last_rate.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, now: u64, scheduled: usize, blacklisted: Vec<String>) -> StatsSnapshot {
        SCHEDULED_MEASUREMENTS.set(scheduled as i64);

        StatsSnapshot {
            measurements_collected: self.collected.load(Ordering::Relaxed),
            total_collection_time: self.collection_time.load(Ordering::Relaxed),
            measurements_per_minute: self.measurements_per_minute(now),
            late_collections: self.late.load(Ordering::Relaxed),
            failed_collections: self.failed.load(Ordering::Relaxed),
            reports_sent: self.reports_sent.load(Ordering::Relaxed),
            reports_failed: self.reports_failed.load(Ordering::Relaxed),
            scheduled_measurements: scheduled,
            blacklisted_types: blacklisted,
        }
    }
}

/// A point in time view of the engine's monitoring counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub measurements_collected: u64,
    /// milliseconds
    pub total_collection_time: u64,
    pub measurements_per_minute: u64,
    pub late_collections: u64,
    pub failed_collections: u64,
    pub reports_sent: u64,
    pub reports_failed: u64,
    pub scheduled_measurements: usize,
    pub blacklisted_types: Vec<String>,
}
