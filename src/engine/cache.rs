use crate::measurement::{MeasurementReport, NumericSample, NumericType, ScheduleId, TraitSample};
use crate::{debug, trace};

use std::collections::HashMap;

/// Last reported value of each trait schedule.
#[derive(Default)]
pub struct TraitCache {
    values: HashMap<ScheduleId, Option<String>>,
}

impl TraitCache {
    /// Returns true if the value is new or changed and should be reported.
    /// The cache is only updated when the value changed.
    pub fn check(&mut self, schedule_id: ScheduleId, value: Option<&str>) -> bool {
        match self.values.get(&schedule_id) {
            Some(previous) if previous.as_deref() == value => false,
            _ => {
                self.values
                    .insert(schedule_id, value.map(str::to_string));
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CachedValue {
    timestamp: u64,
    value: f64,
}

/// Previous raw sample of each per-minute schedule.
#[derive(Default)]
pub struct PerMinuteCache {
    values: HashMap<ScheduleId, CachedValue>,
}

impl PerMinuteCache {
    /// Record the raw sample and return the per-minute rate since the
    /// previous one, if a rate can be reported. The cache always moves to
    /// the new sample.
    pub fn update(
        &mut self,
        schedule_id: ScheduleId,
        timestamp: u64,
        value: f64,
        numeric_type: NumericType,
    ) -> Option<f64> {
        let previous = self
            .values
            .insert(schedule_id, CachedValue { timestamp, value })?;

        if timestamp <= previous.timestamp {
            return None;
        }

        let elapsed = (timestamp - previous.timestamp) as f64;
        let mut rate = (60_000.0 / elapsed) * (value - previous.value);

        if numeric_type == NumericType::TrendsDown {
            rate = -rate;
        }

        // a negative rate means the counter was reset
        if rate < 0.0 || !rate.is_finite() {
            return None;
        }

        Some(rate)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Post-processing applied to every detached report before it is sent.
#[derive(Default)]
pub struct DerivedCaches {
    traits: TraitCache,
    per_minute: PerMinuteCache,
}

impl DerivedCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop unchanged traits and invalid numeric values, and turn per-minute
    /// counters into rates.
    pub fn process(&mut self, report: MeasurementReport) -> MeasurementReport {
        let (numeric, traits, collection_time) = report.into_parts();

        let traits: Vec<TraitSample> = traits
            .into_iter()
            .filter(|sample| {
                let changed = self.traits.check(sample.schedule_id, sample.value.as_deref());
                if !changed {
                    trace!("trait {} unchanged, not reporting", sample.name);
                }
                changed
            })
            .collect();

        let numeric: Vec<NumericSample> = numeric
            .into_iter()
            .filter_map(|mut sample| {
                let Some(value) = sample.finite_value() else {
                    debug!(
                        "dropping invalid value {:?} for schedule {} ({})",
                        sample.value, sample.schedule_id, sample.name
                    );
                    return None;
                };

                if sample.per_minute {
                    let rate = self.per_minute.update(
                        sample.schedule_id,
                        sample.timestamp,
                        value,
                        sample.numeric_type,
                    )?;
                    sample.value = Some(rate);
                }

                Some(sample)
            })
            .collect();

        MeasurementReport::from_parts(numeric, traits, collection_time)
    }
}
