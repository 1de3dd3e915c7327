//! The measurement engine: schedules metric collections, runs them through
//! the invocation guard and periodically delivers what was collected.

use crate::invoke::{InvokeError, Invoker, LockType};
use crate::inventory::{ResourceCategory, ResourceLookup};
use crate::measurement::{
    now_millis, MeasurementScheduleRequest, NumericSample, ResourceId, ResourceScheduleRequest,
};
use crate::plugin::{Availability, Configuration};
use crate::schedule::{ScheduleQueue, ScheduledMeasurement};
use crate::transport::Transport;
use crate::{debug, error, info};

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

mod buffer;
mod cache;
mod collector;
mod driver;
mod sender;
mod stats;

pub use cache::{DerivedCaches, PerMinuteCache, TraitCache};
pub use stats::{EngineStats, StatsSnapshot};

use buffer::ReportBuffer;

const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(5);
const SERVER_AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("resource {0} is not in inventory")]
    UnknownResource(ResourceId),
    #[error("resource {resource_id} has no {facet} facet")]
    NoFacet {
        resource_id: ResourceId,
        facet: &'static str,
    },
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(&'static str),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Timing and sizing of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of batches collected concurrently.
    pub collector_threads: usize,
    /// Delay before the first collection after [`Engine::start`].
    pub initial_delay: Duration,
    /// Delay between scheduling a metric and its first collection.
    pub schedule_delay: Duration,
    /// How long the driver sleeps when nothing is scheduled.
    pub idle_sleep: Duration,
    /// How far past its due time a batch may start before it is considered
    /// late and rescheduled instead of collected.
    pub late_threshold: Duration,
    /// Timeout for each component call.
    pub facet_timeout: Duration,
    /// Period of report delivery.
    pub send_interval: Duration,
    /// Maximum number of concurrent component calls.
    pub invoker_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            collector_threads: 5,
            initial_delay: Duration::from_secs(30),
            schedule_delay: Duration::ZERO,
            idle_sleep: Duration::from_secs(10),
            late_threshold: Duration::from_secs(30),
            facet_timeout: Duration::from_secs(30),
            send_interval: Duration::from_secs(30),
            invoker_threads: 100,
        }
    }
}

impl EngineConfig {
    pub fn check(&self) -> Result<(), EngineError> {
        if self.send_interval.is_zero() {
            return Err(EngineError::InvalidConfig("send interval must be non-zero"));
        }

        if self.idle_sleep.is_zero() {
            return Err(EngineError::InvalidConfig("idle sleep must be non-zero"));
        }

        if self.facet_timeout.is_zero() {
            return Err(EngineError::InvalidConfig("facet timeout must be non-zero"));
        }

        Ok(())
    }
}

/// State shared by the driver, collector and sender tasks.
pub(crate) struct Shared {
    config: EngineConfig,
    queue: Mutex<ScheduleQueue>,
    wakeup: Notify,
    buffer: ReportBuffer,
    caches: Mutex<DerivedCaches>,
    stats: EngineStats,
    invoker: Arc<Invoker>,
    lookup: Arc<dyn ResourceLookup>,
    transport: Arc<dyn Transport>,
}

impl Shared {
    fn next_batch(&self, now: u64) -> Vec<ScheduledMeasurement> {
        self.queue.lock().next_due_batch(now)
    }

    fn reschedule(&self, batch: Vec<ScheduledMeasurement>) {
        self.queue.lock().reschedule(batch);
        self.wakeup.notify_one();
    }

    fn reschedule_at(&self, batch: Vec<ScheduledMeasurement>, next_collection: u64) {
        self.queue.lock().reschedule_at(batch, next_collection);
        self.wakeup.notify_one();
    }
}

pub struct Engine {
    shared: Arc<Shared>,
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    shutdown: watch::Sender<bool>,
    started: Mutex<bool>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        lookup: Arc<dyn ResourceLookup>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, EngineError> {
        config.check()?;

        let invoker = Arc::new(Invoker::new(config.invoker_threads)?);

        let runtime = Builder::new_multi_thread()
            .worker_threads(config.collector_threads.max(1) + 1)
            .thread_name("mensura-engine")
            .enable_all()
            .build()?;

        let handle = runtime.handle().clone();
        let (shutdown, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            config,
            queue: Mutex::new(ScheduleQueue::new()),
            wakeup: Notify::new(),
            buffer: ReportBuffer::new(),
            caches: Mutex::new(DerivedCaches::new()),
            stats: EngineStats::new(now_millis()),
            invoker,
            lookup,
            transport,
        });

        Ok(Self {
            shared,
            runtime: Mutex::new(Some(runtime)),
            handle,
            shutdown,
            started: Mutex::new(false),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Load every stored schedule and start the driver and sender tasks.
    /// Calling this more than once has no further effect.
    pub fn start(&self) {
        let mut started = self.started.lock();
        if *started || self.runtime.lock().is_none() {
            return;
        }
        *started = true;

        self.reschedule_all();

        let driver = self.handle.spawn(driver::run(
            self.shared.clone(),
            self.shutdown.subscribe(),
        ));
        let sender = self.handle.spawn(sender::run(
            self.shared.clone(),
            self.shutdown.subscribe(),
        ));

        self.supervise("collection driver", driver);
        self.supervise("report sender", sender);

        info!(
            "measurement engine started with {} scheduled measurements",
            self.scheduled()
        );
    }

    fn supervise(&self, name: &'static str, task: JoinHandle<()>) {
        self.handle.spawn(async move {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!("{name} task panicked: {e}");
                }
            }
        });
    }

    /// Replace the schedules of one resource. Returns false, without
    /// scheduling anything, when the resource is unknown.
    pub fn schedule_collection(
        &self,
        resource_id: ResourceId,
        requests: Vec<MeasurementScheduleRequest>,
    ) -> bool {
        self.apply(resource_id, requests, false)
    }

    /// Merge schedules into those already stored for one resource.
    pub fn update_collection(
        &self,
        resource_id: ResourceId,
        requests: Vec<MeasurementScheduleRequest>,
    ) -> bool {
        self.apply(resource_id, requests, true)
    }

    /// Replace schedules of many resources, skipping unknown resources.
    /// Returns the number of resources scheduled.
    pub fn schedule_collection_bulk(&self, requests: Vec<ResourceScheduleRequest>) -> usize {
        self.apply_bulk(requests, false)
    }

    /// Merge schedules of many resources, skipping unknown resources.
    pub fn update_collection_bulk(&self, requests: Vec<ResourceScheduleRequest>) -> usize {
        self.apply_bulk(requests, true)
    }

    fn apply_bulk(&self, requests: Vec<ResourceScheduleRequest>, merge: bool) -> usize {
        let mut applied = 0;
        for request in requests {
            if self.apply(request.resource_id, request.requests, merge) {
                applied += 1;
            }
        }

        let removed = self.shared.queue.lock().remove_duplicate_schedules();
        if removed > 0 {
            debug!("removed {removed} duplicate schedules");
        }

        applied
    }

    fn apply(
        &self,
        resource_id: ResourceId,
        requests: Vec<MeasurementScheduleRequest>,
        merge: bool,
    ) -> bool {
        if !self
            .shared
            .lookup
            .store_schedules(resource_id, &requests, merge)
        {
            debug!("resource {resource_id} is not in inventory, not scheduling collection");
            return false;
        }

        let first_collection =
            now_millis() + self.shared.config.schedule_delay.as_millis() as u64;
        self.shared
            .queue
            .lock()
            .schedule(resource_id, requests, first_collection);
        self.shared.wakeup.notify_one();

        true
    }

    /// Remove every scheduled collection for the given resources. Batches
    /// being collected right now are not put back.
    pub fn unschedule_collection(&self, resource_ids: &HashSet<ResourceId>) -> usize {
        let removed = self.shared.queue.lock().unschedule(resource_ids);
        debug!("unscheduled {removed} measurements");
        self.shared.wakeup.notify_one();
        removed
    }

    /// Schedule everything the resource lookup has stored, as after a
    /// restart.
    pub fn reschedule_all(&self) {
        let stored = self.shared.lookup.stored_schedules();
        let first_collection =
            now_millis() + self.shared.config.schedule_delay.as_millis() as u64;

        let mut queue = self.shared.queue.lock();
        for (resource_id, requests) in stored {
            queue.schedule(resource_id, requests, first_collection);
        }
        queue.remove_duplicate_schedules();
        drop(queue);

        self.shared.wakeup.notify_one();
    }

    /// Collect the named metrics from a resource right now, bypassing the
    /// schedule and the report buffer.
    pub async fn realtime_values(
        &self,
        resource_id: ResourceId,
        names: &[&str],
    ) -> Result<Vec<NumericSample>, EngineError> {
        let resource = self
            .shared
            .lookup
            .resource(resource_id)
            .ok_or(EngineError::UnknownResource(resource_id))?;

        let facet = resource.component.measurement().ok_or(EngineError::NoFacet {
            resource_id,
            facet: "measurement",
        })?;

        let requests = names
            .iter()
            .map(|name| {
                MeasurementScheduleRequest::new(
                    1,
                    *name,
                    Duration::ZERO,
                    crate::measurement::DataKind::NumericAbsolute,
                )
            })
            .collect();

        let report = self
            .shared
            .invoker
            .measurement(
                facet,
                resource.target(),
                LockType::Read,
                self.shared.config.facet_timeout,
            )
            .get_values(requests)
            .await?;

        let (numeric, _, _) = report.into_parts();
        Ok(numeric)
    }

    /// Ask a resource for its availability and record the answer. Any
    /// failure records the resource as down.
    pub async fn refresh_availability(
        &self,
        resource_id: ResourceId,
    ) -> Result<Availability, EngineError> {
        let resource = self
            .shared
            .lookup
            .resource(resource_id)
            .ok_or(EngineError::UnknownResource(resource_id))?;

        let facet = resource.component.availability().ok_or(EngineError::NoFacet {
            resource_id,
            facet: "availability",
        })?;

        let timeout = match resource.category {
            ResourceCategory::Server => SERVER_AVAILABILITY_TIMEOUT,
            _ => AVAILABILITY_TIMEOUT,
        };

        let result = self
            .shared
            .invoker
            .availability(facet, resource.target(), LockType::None, timeout)
            .availability()
            .await;

        let availability = match &result {
            Ok(availability) => *availability,
            Err(e) => {
                debug!("availability check for resource {resource_id} failed: {e}");
                Availability::Down
            }
        };

        self.shared
            .lookup
            .set_availability(resource_id, availability);

        Ok(result?)
    }

    pub async fn load_configuration(
        &self,
        resource_id: ResourceId,
    ) -> Result<Configuration, EngineError> {
        let resource = self
            .shared
            .lookup
            .resource(resource_id)
            .ok_or(EngineError::UnknownResource(resource_id))?;

        let facet = resource.component.configuration().ok_or(EngineError::NoFacet {
            resource_id,
            facet: "configuration",
        })?;

        Ok(self
            .shared
            .invoker
            .configuration(
                facet,
                resource.target(),
                LockType::Read,
                self.shared.config.facet_timeout,
            )
            .load_configuration()
            .await?)
    }

    pub async fn update_configuration(
        &self,
        resource_id: ResourceId,
        configuration: Configuration,
    ) -> Result<(), EngineError> {
        let resource = self
            .shared
            .lookup
            .resource(resource_id)
            .ok_or(EngineError::UnknownResource(resource_id))?;

        let facet = resource.component.configuration().ok_or(EngineError::NoFacet {
            resource_id,
            facet: "configuration",
        })?;

        Ok(self
            .shared
            .invoker
            .configuration(
                facet,
                resource.target(),
                LockType::Write,
                self.shared.config.facet_timeout,
            )
            .update_configuration(configuration)
            .await?)
    }

    /// Collect every batch that is due now on the calling task. Returns the
    /// number of batches processed.
    pub async fn collect_due(&self) -> usize {
        let mut batches = 0;
        loop {
            let batch = self.shared.next_batch(now_millis());
            if batch.is_empty() {
                return batches;
            }
            collector::collect(&self.shared, batch).await;
            batches += 1;
        }
    }

    /// Run one delivery cycle on the calling task. Returns the number of
    /// values handed to the transport.
    pub async fn send_report(&self) -> usize {
        sender::send(&self.shared).await
    }

    /// Earliest pending collection time in epoch milliseconds.
    pub fn next_collection(&self) -> Option<u64> {
        self.shared.queue.lock().peek_next_due()
    }

    /// Scheduled entries in collection order.
    pub fn scheduled_measurements(&self) -> Vec<ScheduledMeasurement> {
        self.shared.queue.lock().iter().cloned().collect()
    }

    pub fn scheduled(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot(
            now_millis(),
            self.scheduled(),
            self.blacklisted_types(),
        )
    }

    pub fn blacklisted_types(&self) -> Vec<String> {
        self.shared.invoker.blacklist().types()
    }

    pub fn clear_blacklist(&self) {
        info!("clearing resource type blacklist");
        self.shared.invoker.blacklist().clear();
    }

    /// Stop collection and delivery and release both worker pools. Calls
    /// still running component code are abandoned.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);

        if let Some(runtime) = self.runtime.lock().take() {
            info!("shutting down measurement engine");
            runtime.shutdown_background();
        }

        self.shared.invoker.shutdown();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
