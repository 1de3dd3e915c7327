use super::*;

/// A single numeric observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSample {
    pub schedule_id: ScheduleId,
    pub name: String,
    pub timestamp: u64,
    pub value: Option<f64>,
    pub numeric_type: NumericType,
    pub per_minute: bool,
}

impl NumericSample {
    /// Returns the value if it is present and finite.
    pub fn finite_value(&self) -> Option<f64> {
        self.value.filter(|v| v.is_finite())
    }
}

/// A single trait observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraitSample {
    pub schedule_id: ScheduleId,
    pub name: String,
    pub timestamp: u64,
    pub value: Option<String>,
}

/// An accumulating batch of samples plus collection counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeasurementReport {
    numeric: Vec<NumericSample>,
    traits: Vec<TraitSample>,
    collection_time: u64,
}

impl MeasurementReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a numeric value for the given request, stamped with the
    /// current time.
    pub fn add_numeric(&mut self, request: &MeasurementScheduleRequest, value: f64) {
        self.add_numeric_at(request, now_millis(), Some(value));
    }

    pub fn add_numeric_at(
        &mut self,
        request: &MeasurementScheduleRequest,
        timestamp: u64,
        value: Option<f64>,
    ) {
        self.numeric.push(NumericSample {
            schedule_id: request.schedule_id(),
            name: request.name().to_string(),
            timestamp,
            value,
            numeric_type: request.numeric_type(),
            per_minute: request.kind() == DataKind::PerMinute,
        });
    }

    /// Record a trait value for the given request, stamped with the current
    /// time.
    pub fn add_trait(&mut self, request: &MeasurementScheduleRequest, value: Option<String>) {
        self.add_trait_at(request, now_millis(), value);
    }

    pub fn add_trait_at(
        &mut self,
        request: &MeasurementScheduleRequest,
        timestamp: u64,
        value: Option<String>,
    ) {
        self.traits.push(TraitSample {
            schedule_id: request.schedule_id(),
            name: request.name().to_string(),
            timestamp,
            value,
        });
    }

    pub fn push_numeric(&mut self, sample: NumericSample) {
        self.numeric.push(sample);
    }

    pub fn push_trait(&mut self, sample: TraitSample) {
        self.traits.push(sample);
    }

    /// Move every sample and counter of `other` into this report.
    pub fn append(&mut self, mut other: MeasurementReport) {
        self.numeric.append(&mut other.numeric);
        self.traits.append(&mut other.traits);
        self.collection_time += other.collection_time;
    }

    pub fn numeric(&self) -> &[NumericSample] {
        &self.numeric
    }

    pub fn traits(&self) -> &[TraitSample] {
        &self.traits
    }

    pub fn into_parts(self) -> (Vec<NumericSample>, Vec<TraitSample>, u64) {
        (self.numeric, self.traits, self.collection_time)
    }

    pub fn from_parts(
        numeric: Vec<NumericSample>,
        traits: Vec<TraitSample>,
        collection_time: u64,
    ) -> Self {
        Self {
            numeric,
            traits,
            collection_time,
        }
    }

    /// Milliseconds spent collecting the samples in this report.
    pub fn collection_time(&self) -> u64 {
        self.collection_time
    }

    pub fn add_collection_time(&mut self, millis: u64) {
        self.collection_time += millis;
    }

    pub fn data_count(&self) -> usize {
        self.numeric.len() + self.traits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_count() == 0
    }
}
