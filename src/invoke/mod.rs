//! Guarded invocation of component code.
//!
//! Every facet call runs on a bounded pool of blocking workers while the
//! caller waits up to a timeout. A call that overruns on a worker blacklists
//! the resource type, raises the worker's interrupt flag and returns a
//! timeout error; the worker itself may keep running. A call that is still
//! waiting for a free worker when the timeout expires is cancelled without
//! blacklisting anything. Calls for a blacklisted type fail without being
//! attempted.

use crate::measurement::ResourceId;
use crate::plugin::FacetError;
use crate::{debug, warn};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::{Builder, Handle, Runtime};

mod blacklist;
mod facets;
mod interrupt;
mod lock;

pub use blacklist::Blacklist;
pub use facets::{GuardedAvailabilityFacet, GuardedConfigurationFacet, GuardedMeasurementFacet};
pub use interrupt::interrupted;
pub use lock::{FacetLock, FacetLockGuard, LockType};

use interrupt::Interrupt;

#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("resource type [{resource_type}] is blacklisted")]
    Blacklisted { resource_type: String },
    #[error(
        "call to {method} on resource {resource_id} of type [{resource_type}] \
         timed out after {timeout:?} (stalled on thread {thread})"
    )]
    Timeout {
        resource_id: ResourceId,
        resource_type: String,
        method: &'static str,
        timeout: Duration,
        thread: String,
    },
    #[error("no worker picked up {method} on resource {resource_id} within {timeout:?}")]
    PoolExhausted {
        resource_id: ResourceId,
        method: &'static str,
        timeout: Duration,
    },
    #[error("component panicked during {method}")]
    Panicked { method: &'static str },
    #[error("invocation pool is shut down")]
    Shutdown,
    #[error(transparent)]
    Facet(#[from] FacetError),
}

impl InvokeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_blacklisted(&self) -> bool {
        matches!(self, Self::Blacklisted { .. })
    }

    pub fn is_pool_exhausted(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. })
    }
}

/// Where a guarded call is when the caller stops waiting for it.
enum Progress {
    Queued,
    Running(String),
    Cancelled,
}

/// The resource a guarded call is made against.
#[derive(Debug, Clone)]
pub struct Target {
    pub resource_id: ResourceId,
    pub resource_type: String,
    pub lock: Arc<FacetLock>,
}

impl Target {
    pub fn new(
        resource_id: ResourceId,
        resource_type: impl Into<String>,
        lock: Arc<FacetLock>,
    ) -> Self {
        Self {
            resource_id,
            resource_type: resource_type.into(),
            lock,
        }
    }
}

/// Bounded pool of workers running component code, plus the type blacklist.
pub struct Invoker {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    blacklist: Blacklist,
}

impl Invoker {
    /// Create an invoker with at most `threads` concurrent component calls.
    pub fn new(threads: usize) -> Result<Self, std::io::Error> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(threads.max(1))
            .thread_name_fn(|| {
                static ID: AtomicUsize = AtomicUsize::new(0);
                let id = ID.fetch_add(1, Ordering::Relaxed);
                format!("mensura-invoker-{id}")
            })
            .enable_all()
            .build()?;

        let handle = runtime.handle().clone();

        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            handle,
            blacklist: Blacklist::new(),
        })
    }

    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    /// Run `call` against `target` under the given lock discipline, waiting
    /// at most `timeout` for it to complete. The lock is acquired on the
    /// worker so time spent waiting for it counts toward the timeout.
    pub async fn invoke<T, F>(
        &self,
        target: &Target,
        lock: LockType,
        timeout: Duration,
        method: &'static str,
        call: F,
    ) -> Result<T, InvokeError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, FacetError> + Send + 'static,
    {
        if self.blacklist.contains(&target.resource_type) {
            return Err(InvokeError::Blacklisted {
                resource_type: target.resource_type.clone(),
            });
        }

        if self.runtime.lock().is_none() {
            return Err(InvokeError::Shutdown);
        }

        let interrupt = Interrupt::new();
        let progress = Arc::new(Mutex::new(Progress::Queued));

        let task = self.handle.spawn_blocking({
            let interrupt = interrupt.clone();
            let progress = progress.clone();
            let facet_lock = target.lock.clone();
            move || {
                {
                    let mut progress = progress.lock();
                    if matches!(*progress, Progress::Cancelled) {
                        return Err(FacetError::failed("cancelled before start"));
                    }
                    let thread = std::thread::current();
                    *progress = Progress::Running(thread.name().unwrap_or("unnamed").to_string());
                }

                let _scope = interrupt.install();
                let _guard = facet_lock.acquire(lock);
                call()
            }
        });
        let abort = task.abort_handle();

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result.map_err(InvokeError::Facet),
            Ok(Err(e)) if e.is_panic() => Err(InvokeError::Panicked { method }),
            Ok(Err(_)) => Err(InvokeError::Shutdown),
            Err(_) => {
                let thread = {
                    let mut progress = progress.lock();
                    match std::mem::replace(&mut *progress, Progress::Cancelled) {
                        Progress::Running(thread) => thread,
                        _ => {
                            abort.abort();
                            debug!(
                                "{method} on resource {} was still queued after {timeout:?}",
                                target.resource_id
                            );
                            return Err(InvokeError::PoolExhausted {
                                resource_id: target.resource_id,
                                method,
                                timeout,
                            });
                        }
                    }
                };

                interrupt.raise();

                if self.blacklist.insert(&target.resource_type) {
                    warn!(
                        "blacklisting resource type [{}] after {method} timed out on resource {} \
                         (thread {thread})",
                        target.resource_type, target.resource_id
                    );
                }

                Err(InvokeError::Timeout {
                    resource_id: target.resource_id,
                    resource_type: target.resource_type.clone(),
                    method,
                    timeout,
                    thread,
                })
            }
        }
    }

    /// Measurement facet adapter for `target`.
    pub fn measurement(
        self: &Arc<Self>,
        facet: Arc<dyn crate::plugin::MeasurementFacet>,
        target: Target,
        lock: LockType,
        timeout: Duration,
    ) -> GuardedMeasurementFacet {
        GuardedMeasurementFacet::new(self.clone(), facet, target, lock, timeout)
    }

    /// Configuration facet adapter for `target`.
    pub fn configuration(
        self: &Arc<Self>,
        facet: Arc<dyn crate::plugin::ConfigurationFacet>,
        target: Target,
        lock: LockType,
        timeout: Duration,
    ) -> GuardedConfigurationFacet {
        GuardedConfigurationFacet::new(self.clone(), facet, target, lock, timeout)
    }

    /// Availability facet adapter for `target`.
    pub fn availability(
        self: &Arc<Self>,
        facet: Arc<dyn crate::plugin::AvailabilityFacet>,
        target: Target,
        lock: LockType,
        timeout: Duration,
    ) -> GuardedAvailabilityFacet {
        GuardedAvailabilityFacet::new(self.clone(), facet, target, lock, timeout)
    }

    /// Stop accepting calls and release the worker pool. Workers still
    /// running component code are abandoned, not joined.
    pub fn shutdown(&self) {
        if let Some(runtime) = self.runtime.lock().take() {
            debug!("shutting down invocation pool");
            runtime.shutdown_background();
        }
    }
}

impl Drop for Invoker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
