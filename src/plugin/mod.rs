//! Capability interfaces implemented by resource components.
//!
//! Component code is untrusted: it may block, panic or never return. The
//! engine never calls these traits directly, it always goes through the
//! guarded adapters in [`crate::invoke`].

use crate::measurement::{MeasurementReport, MeasurementScheduleRequest};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

mod host;

pub use host::HostComponent;

/// Error raised by component code.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FacetError {
    #[error("{0}")]
    Failed(String),
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}

impl FacetError {
    pub fn failed(message: impl fmt::Display) -> Self {
        Self::Failed(message.to_string())
    }
}

impl From<std::io::Error> for FacetError {
    fn from(other: std::io::Error) -> Self {
        Self::Failed(other.to_string())
    }
}

/// Flat key/value resource configuration.
pub type Configuration = BTreeMap<String, String>;

/// Last known availability of a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Up,
    Down,
    #[default]
    Unknown,
}

pub trait MeasurementFacet: Send + Sync {
    /// Collect the values for every request, adding them to `report`.
    fn get_values(
        &self,
        report: &mut MeasurementReport,
        requests: &[MeasurementScheduleRequest],
    ) -> Result<(), FacetError>;
}

pub trait ConfigurationFacet: Send + Sync {
    fn load_configuration(&self) -> Result<Configuration, FacetError>;

    fn update_configuration(&self, configuration: Configuration) -> Result<(), FacetError>;
}

pub trait AvailabilityFacet: Send + Sync {
    fn availability(&self) -> Result<Availability, FacetError>;
}

/// The facets a resource component exposes.
#[derive(Clone, Default)]
pub struct Component {
    measurement: Option<Arc<dyn MeasurementFacet>>,
    configuration: Option<Arc<dyn ConfigurationFacet>>,
    availability: Option<Arc<dyn AvailabilityFacet>>,
}

impl Component {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_measurement(mut self, facet: Arc<dyn MeasurementFacet>) -> Self {
        self.measurement = Some(facet);
        self
    }

    pub fn with_configuration(mut self, facet: Arc<dyn ConfigurationFacet>) -> Self {
        self.configuration = Some(facet);
        self
    }

    pub fn with_availability(mut self, facet: Arc<dyn AvailabilityFacet>) -> Self {
        self.availability = Some(facet);
        self
    }

    pub fn measurement(&self) -> Option<Arc<dyn MeasurementFacet>> {
        self.measurement.clone()
    }

    pub fn configuration(&self) -> Option<Arc<dyn ConfigurationFacet>> {
        self.configuration.clone()
    }

    pub fn availability(&self) -> Option<Arc<dyn AvailabilityFacet>> {
        self.availability.clone()
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("measurement", &self.measurement.is_some())
            .field("configuration", &self.configuration.is_some())
            .field("availability", &self.availability.is_some())
            .finish()
    }
}
