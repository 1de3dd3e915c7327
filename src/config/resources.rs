use crate::config::duration;
use crate::inventory::ResourceCategory;
use crate::measurement::{
    DataKind, MeasurementScheduleRequest, NumericType, ResourceId, ResourceScheduleRequest,
    ScheduleId,
};

use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

/// Built-in components a resource can be backed by.
pub const COMPONENTS: &[&str] = &["host"];

fn component() -> String {
    "host".into()
}

fn enabled() -> bool {
    true
}

/// A statically configured resource and its metric schedules.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    id: ResourceId,
    #[serde(rename = "type")]
    resource_type: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    category: ResourceCategory,
    #[serde(default = "component")]
    component: String,
    #[serde(default)]
    metrics: Vec<MetricConfig>,
}

impl ResourceConfig {
    pub fn check(&self) -> Result<(), String> {
        if !COMPONENTS.contains(&self.component.as_str()) {
            return Err(format!(
                "resource {} uses unknown component: {}",
                self.id, self.component
            ));
        }

        let mut ids = HashSet::new();
        for metric in &self.metrics {
            if !ids.insert(metric.schedule_id) {
                return Err(format!(
                    "resource {} schedules id {} more than once",
                    self.id, metric.schedule_id
                ));
            }
            metric.check()?;
        }

        Ok(())
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn category(&self) -> ResourceCategory {
        self.category
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn metrics(&self) -> &[MetricConfig] {
        &self.metrics
    }

    pub fn schedule_request(&self) -> ResourceScheduleRequest {
        ResourceScheduleRequest::new(
            self.id,
            self.metrics.iter().map(MetricConfig::request).collect(),
        )
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricConfig {
    schedule_id: ScheduleId,
    name: String,
    kind: DataKind,
    #[serde(default)]
    numeric_type: NumericType,
    #[serde(deserialize_with = "duration")]
    interval: Duration,
    #[serde(default = "enabled")]
    enabled: bool,
}

impl MetricConfig {
    pub fn check(&self) -> Result<(), String> {
        if self.interval < Duration::from_secs(1) {
            return Err(format!(
                "metric {} interval is too short. Minimum interval is: 1s",
                self.name
            ));
        }

        Ok(())
    }

    pub fn request(&self) -> MeasurementScheduleRequest {
        MeasurementScheduleRequest::new(self.schedule_id, &self.name, self.interval, self.kind)
            .with_numeric_type(self.numeric_type)
            .with_enabled(self.enabled)
    }
}
