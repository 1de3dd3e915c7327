use serde::{Deserialize, Serialize};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

mod report;

pub use report::{MeasurementReport, NumericSample, TraitSample};

/// Identifier of a managed resource, assigned by the inventory.
pub type ResourceId = u32;

/// Stable identifier of a single metric schedule, assigned externally.
pub type ScheduleId = u32;

/// Returns the current wall-clock time as milliseconds since the epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// What kind of value a schedule produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    /// A numeric value that is already a rate and is forwarded as-is.
    NumericRate,
    /// A numeric gauge value forwarded as-is.
    NumericAbsolute,
    /// A string valued trait, forwarded only when it changes.
    Trait,
    /// A monotonic counter that is converted into a per-minute rate before
    /// it is sent.
    PerMinute,
}

/// The expected direction of a numeric series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericType {
    #[default]
    Dynamic,
    TrendsUp,
    TrendsDown,
}

/// A request to collect one metric on a fixed interval.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementScheduleRequest {
    schedule_id: ScheduleId,
    name: String,
    interval: Duration,
    enabled: bool,
    kind: DataKind,
    numeric_type: NumericType,
}

impl MeasurementScheduleRequest {
    pub fn new(
        schedule_id: ScheduleId,
        name: impl Into<String>,
        interval: Duration,
        kind: DataKind,
    ) -> Self {
        Self {
            schedule_id,
            name: name.into(),
            interval,
            enabled: true,
            kind,
            numeric_type: NumericType::default(),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_numeric_type(mut self, numeric_type: NumericType) -> Self {
        self.numeric_type = numeric_type;
        self
    }

    pub fn schedule_id(&self) -> ScheduleId {
        self.schedule_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn interval_millis(&self) -> u64 {
        self.interval.as_millis() as u64
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn kind(&self) -> DataKind {
        self.kind
    }

    pub fn numeric_type(&self) -> NumericType {
        self.numeric_type
    }
}

/// All schedule requests for a single resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceScheduleRequest {
    pub resource_id: ResourceId,
    pub requests: Vec<MeasurementScheduleRequest>,
}

impl ResourceScheduleRequest {
    pub fn new(resource_id: ResourceId, requests: Vec<MeasurementScheduleRequest>) -> Self {
        Self {
            resource_id,
            requests,
        }
    }
}
