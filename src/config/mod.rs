use crate::engine::EngineConfig;

use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

mod collection;
mod general;
mod log;
mod resources;

pub use collection::{Collection, Invoker, Sender};
pub use general::General;
pub use log::{Log, LogLevel};
pub use resources::{MetricConfig, ResourceConfig};

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    general: General,
    #[serde(default)]
    log: Log,
    #[serde(default)]
    collection: Collection,
    #[serde(default)]
    sender: Sender,
    #[serde(default)]
    invoker: Invoker,
    #[serde(default)]
    resources: Vec<ResourceConfig>,
}

impl Config {
    pub fn load(path: &dyn AsRef<Path>) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("unable to open config file: {e}"))?;

        content.parse()
    }

    pub fn check(&self) -> Result<(), String> {
        self.general.check()?;
        self.collection.check()?;
        self.sender.check()?;
        self.invoker.check()?;

        let mut ids = HashSet::new();
        for resource in &self.resources {
            if !ids.insert(resource.id()) {
                return Err(format!("resource id {} is configured twice", resource.id()));
            }
            resource.check()?;
        }

        Ok(())
    }

    pub fn general(&self) -> &General {
        &self.general
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn invoker(&self) -> &Invoker {
        &self.invoker
    }

    pub fn resources(&self) -> &[ResourceConfig] {
        &self.resources
    }
}

impl FromStr for Config {
    type Err = String;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(content).map_err(|e| format!("failed to parse config file: {e}"))?;

        config.check()?;

        Ok(config)
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            collector_threads: config.collection.threads(),
            initial_delay: config.collection.initial_delay(),
            schedule_delay: config.collection.schedule_delay(),
            idle_sleep: config.collection.idle_sleep(),
            late_threshold: config.collection.late_threshold(),
            facet_timeout: config.collection.facet_timeout(),
            send_interval: config.sender.interval(),
            invoker_threads: config.invoker.threads(),
        }
    }
}

/// Deserialize a human readable duration such as `30s` or `1m 30s`.
pub(crate) fn duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    value
        .parse::<humantime::Duration>()
        .map(Into::into)
        .map_err(|e| serde::de::Error::custom(format!("invalid duration `{value}`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::ResourceCategory;
    use crate::measurement::DataKind;
    use std::io::Write;

    const FULL: &str = r#"
[general]
listen = "127.0.0.1:4251"
collector = "http://collector.local:8080/reports"

[log]
level = "debug"

[collection]
threads = 2
initial_delay = "5s"
late_threshold = "1m"

[sender]
interval = "15s"

[invoker]
threads = 8

[[resources]]
id = 1
type = "Host"
category = "platform"

[[resources.metrics]]
schedule_id = 10
name = "load.1m"
kind = "numeric_absolute"
interval = "30s"

[[resources.metrics]]
schedule_id = 11
name = "os.release"
kind = "trait"
interval = "10m"
enabled = false
"#;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = "".parse().unwrap();
        assert_eq!(EngineConfig::from(&config), EngineConfig::default());
        assert_eq!(config.general().listen().unwrap().port(), 4250);
        assert!(config.general().collector().is_none());
        assert_eq!(config.log().level(), LogLevel::Info);
        assert!(config.resources().is_empty());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();

        let config = Config::load(&file.path()).unwrap();
        assert_eq!(config.general().collector(), Some("http://collector.local:8080/reports"));
        assert_eq!(config.log().level(), LogLevel::Debug);

        let engine = EngineConfig::from(&config);
        assert_eq!(engine.collector_threads, 2);
        assert_eq!(engine.initial_delay, Duration::from_secs(5));
        assert_eq!(engine.late_threshold, Duration::from_secs(60));
        assert_eq!(engine.facet_timeout, Duration::from_secs(30));
        assert_eq!(engine.send_interval, Duration::from_secs(15));
        assert_eq!(engine.invoker_threads, 8);

        let resource = &config.resources()[0];
        assert_eq!(resource.category(), ResourceCategory::Platform);

        let requests = resource.schedule_request();
        assert_eq!(requests.resource_id, 1);
        assert_eq!(requests.requests.len(), 2);
        assert_eq!(requests.requests[1].kind(), DataKind::Trait);
        assert!(!requests.requests[1].enabled());
        assert_eq!(requests.requests[0].interval(), Duration::from_secs(30));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("missing.toml")).err().unwrap();
        assert!(err.contains("unable to open"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!("[collection]\ninitial_delay = \"soon\"".parse::<Config>().is_err());
        assert!("[collection]\nthreads = 0".parse::<Config>().is_err());
        assert!("[invoker]\nthreads = 0".parse::<Config>().is_err());
        assert!("[sender]\ninterval = \"0s\"".parse::<Config>().is_err());
        assert!("[general]\nlisten = \"nowhere\"".parse::<Config>().is_err());
        assert!("[unknown]\nkey = 1".parse::<Config>().is_err());
    }

    #[test]
    fn duplicate_resources_are_rejected() {
        let config = r#"
[[resources]]
id = 1
type = "Host"

[[resources]]
id = 1
type = "Host"
"#;
        let err = config.parse::<Config>().err().unwrap();
        assert!(err.contains("configured twice"));
    }
}
