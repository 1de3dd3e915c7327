//! Mensura schedules metric collection against managed resources, runs each
//! collection through a guarded invocation layer and periodically delivers
//! the collected values to a remote collector.
//!
//! The [`engine::Engine`] owns everything that runs: the schedule, the
//! collection driver, the report sender and the invocation pool. Resources
//! are found through an [`inventory::ResourceLookup`] and reports leave the
//! process through a [`transport::Transport`].

pub mod config;
pub mod engine;
pub mod exposition;
pub mod inventory;
pub mod invoke;
pub mod measurement;
pub mod plugin;
pub mod schedule;
pub mod transport;

pub use engine::{Engine, EngineConfig, EngineError, StatsSnapshot};

pub(crate) use tracing::{debug, error, info, trace, warn};
