use crate::config::duration;

use serde::Deserialize;
use std::time::Duration;

fn collector_threads() -> usize {
    5
}

fn initial_delay() -> Duration {
    Duration::from_secs(30)
}

fn idle_sleep() -> Duration {
    Duration::from_secs(10)
}

fn late_threshold() -> Duration {
    Duration::from_secs(30)
}

fn facet_timeout() -> Duration {
    Duration::from_secs(30)
}

fn send_interval() -> Duration {
    Duration::from_secs(30)
}

fn send_timeout() -> Duration {
    Duration::from_secs(10)
}

fn invoker_threads() -> usize {
    100
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Collection {
    #[serde(default = "collector_threads")]
    threads: usize,
    #[serde(default = "initial_delay", deserialize_with = "duration")]
    initial_delay: Duration,
    #[serde(default, deserialize_with = "duration")]
    schedule_delay: Duration,
    #[serde(default = "idle_sleep", deserialize_with = "duration")]
    idle_sleep: Duration,
    #[serde(default = "late_threshold", deserialize_with = "duration")]
    late_threshold: Duration,
    #[serde(default = "facet_timeout", deserialize_with = "duration")]
    facet_timeout: Duration,
}

impl Default for Collection {
    fn default() -> Self {
        Self {
            threads: collector_threads(),
            initial_delay: initial_delay(),
            schedule_delay: Duration::ZERO,
            idle_sleep: idle_sleep(),
            late_threshold: late_threshold(),
            facet_timeout: facet_timeout(),
        }
    }
}

impl Collection {
    pub fn check(&self) -> Result<(), String> {
        if self.threads == 0 {
            return Err("collection threads must be at least 1".into());
        }

        if self.idle_sleep < Duration::from_millis(1) {
            return Err("collection idle_sleep is too short. Minimum is: 1ms".into());
        }

        if self.facet_timeout < Duration::from_millis(1) {
            return Err("collection facet_timeout is too short. Minimum is: 1ms".into());
        }

        Ok(())
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn schedule_delay(&self) -> Duration {
        self.schedule_delay
    }

    pub fn idle_sleep(&self) -> Duration {
        self.idle_sleep
    }

    pub fn late_threshold(&self) -> Duration {
        self.late_threshold
    }

    pub fn facet_timeout(&self) -> Duration {
        self.facet_timeout
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sender {
    #[serde(default = "send_interval", deserialize_with = "duration")]
    interval: Duration,
    /// Timeout for a single delivery to the collector.
    #[serde(default = "send_timeout", deserialize_with = "duration")]
    timeout: Duration,
}

impl Default for Sender {
    fn default() -> Self {
        Self {
            interval: send_interval(),
            timeout: send_timeout(),
        }
    }
}

impl Sender {
    pub fn check(&self) -> Result<(), String> {
        if self.interval < Duration::from_millis(1) {
            return Err("sender interval is too short. Minimum interval is: 1ms".into());
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Invoker {
    #[serde(default = "invoker_threads")]
    threads: usize,
}

impl Default for Invoker {
    fn default() -> Self {
        Self {
            threads: invoker_threads(),
        }
    }
}

impl Invoker {
    pub fn check(&self) -> Result<(), String> {
        if self.threads == 0 {
            return Err("invoker threads must be at least 1".into());
        }

        Ok(())
    }

    pub fn threads(&self) -> usize {
        self.threads
    }
}
