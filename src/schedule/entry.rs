use crate::measurement::{MeasurementScheduleRequest, ResourceId, ScheduleId};

use std::fmt;

/// Identity of a scheduled measurement. Two entries with the same key are
/// the same schedule regardless of when they are next due.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScheduleKey {
    pub schedule_id: ScheduleId,
    pub resource_id: ResourceId,
    pub name: String,
}

impl ScheduleKey {
    pub fn new(
        schedule_id: ScheduleId,
        resource_id: ResourceId,
        name: impl Into<String>,
    ) -> Self {
        Self {
            schedule_id,
            resource_id,
            name: name.into(),
        }
    }
}

/// Position of an entry in the queue. The derived order, by field, is the
/// collection order; it is total, so two distinct entries never compare
/// equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrderKey {
    next_collection: u64,
    resource_id: ResourceId,
    name: String,
    schedule_id: ScheduleId,
}

/// A schedule request together with its mutable scheduling state.
#[derive(Debug, Clone)]
pub struct ScheduledMeasurement {
    resource_id: ResourceId,
    request: MeasurementScheduleRequest,
    next_collection: u64,
    last_collection: Option<u64>,
}

impl ScheduledMeasurement {
    pub fn new(
        resource_id: ResourceId,
        request: MeasurementScheduleRequest,
        next_collection: u64,
    ) -> Self {
        Self {
            resource_id,
            request,
            next_collection,
            last_collection: None,
        }
    }

    pub fn key(&self) -> ScheduleKey {
        ScheduleKey::new(
            self.request.schedule_id(),
            self.resource_id,
            self.request.name(),
        )
    }

    pub fn order_key(&self) -> OrderKey {
        OrderKey {
            next_collection: self.next_collection,
            resource_id: self.resource_id,
            name: self.request.name().to_string(),
            schedule_id: self.request.schedule_id(),
        }
    }

    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    pub fn schedule_id(&self) -> ScheduleId {
        self.request.schedule_id()
    }

    pub fn request(&self) -> &MeasurementScheduleRequest {
        &self.request
    }

    pub fn interval_millis(&self) -> u64 {
        self.request.interval_millis()
    }

    /// Epoch milliseconds at which this measurement is next due.
    pub fn next_collection(&self) -> u64 {
        self.next_collection
    }

    /// The due time of the previous collection, if any.
    pub fn last_collection(&self) -> Option<u64> {
        self.last_collection
    }

    pub fn set_next_collection(&mut self, next_collection: u64) {
        self.next_collection = next_collection;
    }

    /// Move to the next interval.
    pub fn advance(&mut self) {
        self.last_collection = Some(self.next_collection);
        self.next_collection += self.interval_millis();
    }
}

impl fmt::Display for ScheduledMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "schedule {} ({}) for resource {} due at {}",
            self.request.schedule_id(),
            self.request.name(),
            self.resource_id,
            self.next_collection
        )
    }
}
