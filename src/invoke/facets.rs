use super::*;
use crate::measurement::{MeasurementReport, MeasurementScheduleRequest};
use crate::plugin::{
    Availability, AvailabilityFacet, Configuration, ConfigurationFacet, MeasurementFacet,
};

use std::fmt;

// Debug formatting on the adapters only touches the target and policy, it
// never calls into the component, so it runs directly on the caller.
macro_rules! guarded {
    ($name:ident, $facet:ident) => {
        pub struct $name {
            invoker: Arc<Invoker>,
            facet: Arc<dyn $facet>,
            target: Target,
            lock: LockType,
            timeout: Duration,
        }

        impl $name {
            pub(super) fn new(
                invoker: Arc<Invoker>,
                facet: Arc<dyn $facet>,
                target: Target,
                lock: LockType,
                timeout: Duration,
            ) -> Self {
                Self {
                    invoker,
                    facet,
                    target,
                    lock,
                    timeout,
                }
            }

            pub fn target(&self) -> &Target {
                &self.target
            }

            pub fn lock_type(&self) -> LockType {
                self.lock
            }

            pub fn timeout(&self) -> Duration {
                self.timeout
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("resource_id", &self.target.resource_id)
                    .field("resource_type", &self.target.resource_type)
                    .field("lock", &self.lock)
                    .field("timeout", &self.timeout)
                    .finish()
            }
        }
    };
}

guarded!(GuardedMeasurementFacet, MeasurementFacet);
guarded!(GuardedConfigurationFacet, ConfigurationFacet);
guarded!(GuardedAvailabilityFacet, AvailabilityFacet);

impl GuardedMeasurementFacet {
    /// Collect all `requests` into a fresh report.
    pub async fn get_values(
        &self,
        requests: Vec<MeasurementScheduleRequest>,
    ) -> Result<MeasurementReport, InvokeError> {
        let facet = self.facet.clone();
        self.invoker
            .invoke(&self.target, self.lock, self.timeout, "get_values", move || {
                let mut report = MeasurementReport::new();
                facet.get_values(&mut report, &requests)?;
                Ok(report)
            })
            .await
    }
}

impl GuardedConfigurationFacet {
    pub async fn load_configuration(&self) -> Result<Configuration, InvokeError> {
        let facet = self.facet.clone();
        self.invoker
            .invoke(&self.target, self.lock, self.timeout, "load_configuration", move || {
                facet.load_configuration()
            })
            .await
    }

    pub async fn update_configuration(
        &self,
        configuration: Configuration,
    ) -> Result<(), InvokeError> {
        let facet = self.facet.clone();
        self.invoker
            .invoke(&self.target, self.lock, self.timeout, "update_configuration", move || {
                facet.update_configuration(configuration)
            })
            .await
    }
}

impl GuardedAvailabilityFacet {
    pub async fn availability(&self) -> Result<Availability, InvokeError> {
        let facet = self.facet.clone();
        self.invoker
            .invoke(&self.target, self.lock, self.timeout, "availability", move || {
                facet.availability()
            })
            .await
    }
}
