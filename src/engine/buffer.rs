use crate::measurement::MeasurementReport;

use parking_lot::{Mutex, RwLock};
use std::time::Duration;

/// Holds the in-flight report. Collector appends take the read side (and
/// serialize on the inner mutex only for the append itself); the sender
/// takes the write side to swap in an empty report.
#[derive(Default)]
pub(crate) struct ReportBuffer {
    active: RwLock<Mutex<MeasurementReport>>,
}

impl ReportBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one batch worth of samples and its collection time.
    pub fn append(&self, report: Option<MeasurementReport>, elapsed: Duration) {
        let active = self.active.read();
        let mut active = active.lock();

        if let Some(report) = report {
            active.append(report);
        }

        active.add_collection_time(elapsed.as_millis() as u64);
    }

    /// Detach the in-flight report, leaving an empty one in its place.
    pub fn swap(&self) -> MeasurementReport {
        let mut active = self.active.write();
        std::mem::take(active.get_mut())
    }

    #[cfg(test)]
    pub fn data_count(&self) -> usize {
        self.active.read().lock().data_count()
    }
}
