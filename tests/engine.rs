use mensura::engine::{Engine, EngineConfig};
use mensura::inventory::{Inventory, Resource};
use mensura::invoke::interrupted;
use mensura::measurement::{DataKind, MeasurementReport, MeasurementScheduleRequest, NumericType};
use mensura::plugin::{Component, FacetError, MeasurementFacet};
use mensura::transport::{Transport, TransportError};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Reports a growing counter, a gauge and a fixed version string.
#[derive(Default)]
struct Server {
    requests: AtomicU64,
}

impl MeasurementFacet for Server {
    fn get_values(
        &self,
        report: &mut MeasurementReport,
        requests: &[MeasurementScheduleRequest],
    ) -> Result<(), FacetError> {
        let total = self.requests.fetch_add(60, Ordering::SeqCst) + 60;

        for request in requests {
            match request.name() {
                "requests" => report.add_numeric(request, total as f64),
                "threads" => report.add_numeric(request, 8.0),
                "version" => report.add_trait(request, Some("2.4.1".to_string())),
                other => return Err(FacetError::failed(format!("unknown metric {other}"))),
            }
        }

        Ok(())
    }
}

/// Never answers on its own; gives up only once interrupted.
struct Stuck;

impl MeasurementFacet for Stuck {
    fn get_values(
        &self,
        _report: &mut MeasurementReport,
        _requests: &[MeasurementScheduleRequest],
    ) -> Result<(), FacetError> {
        let start = Instant::now();
        while !interrupted() && start.elapsed() < Duration::from_secs(10) {
            std::thread::sleep(Duration::from_millis(5));
        }
        Err(FacetError::failed("interrupted"))
    }
}

#[derive(Default)]
struct Recording {
    reports: Mutex<Vec<MeasurementReport>>,
}

impl Recording {
    fn numeric(&self, name: &str) -> Vec<f64> {
        self.reports
            .lock()
            .iter()
            .flat_map(|report| report.numeric().iter())
            .filter(|sample| sample.name == name)
            .filter_map(|sample| sample.value)
            .collect()
    }

    fn traits(&self) -> usize {
        self.reports
            .lock()
            .iter()
            .map(|report| report.traits().len())
            .sum()
    }
}

#[async_trait]
impl Transport for Recording {
    async fn send(&self, report: MeasurementReport) -> Result<(), TransportError> {
        self.reports.lock().push(report);
        Ok(())
    }
}

fn config() -> EngineConfig {
    EngineConfig {
        collector_threads: 2,
        initial_delay: Duration::ZERO,
        idle_sleep: Duration::from_millis(50),
        facet_timeout: Duration::from_millis(200),
        send_interval: Duration::from_millis(200),
        invoker_threads: 4,
        ..Default::default()
    }
}

fn requests() -> Vec<MeasurementScheduleRequest> {
    let interval = Duration::from_millis(1000);
    vec![
        MeasurementScheduleRequest::new(1, "requests", interval, DataKind::PerMinute)
            .with_numeric_type(NumericType::TrendsUp),
        MeasurementScheduleRequest::new(2, "threads", interval, DataKind::NumericAbsolute),
        MeasurementScheduleRequest::new(3, "version", interval, DataKind::Trait),
    ]
}

#[tokio::test(flavor = "multi_thread")]
async fn collected_values_are_derived_and_delivered() {
    let inventory = Arc::new(Inventory::new());
    inventory.register(Resource::new(
        1,
        "AppServer",
        Component::new().with_measurement(Arc::new(Server::default())),
    ));

    let transport = Arc::new(Recording::default());
    let engine = Engine::new(config(), inventory, transport.clone()).unwrap();

    assert!(engine.schedule_collection(1, requests()));

    assert_eq!(engine.collect_due().await, 1);
    // the first counter sample only seeds the rate
    assert_eq!(engine.send_report().await, 2);

    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(engine.collect_due().await, 1);
    // the unchanged trait is not sent again
    assert_eq!(engine.send_report().await, 2);

    assert_eq!(transport.numeric("threads"), vec![8.0, 8.0]);
    assert_eq!(transport.traits(), 1);

    // 60 requests per collection, collections about a second apart
    let rates = transport.numeric("requests");
    assert_eq!(rates.len(), 1);
    assert!(rates[0] > 0.0 && rates[0] <= 3600.0);

    let stats = engine.stats();
    assert_eq!(stats.measurements_collected, 4);
    assert_eq!(stats.reports_sent, 2);
    assert_eq!(stats.late_collections, 0);
    assert_eq!(stats.failed_collections, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn running_engine_collects_on_schedule() {
    let inventory = Arc::new(Inventory::new());
    inventory.register(Resource::new(
        1,
        "AppServer",
        Component::new().with_measurement(Arc::new(Server::default())),
    ));

    let transport = Arc::new(Recording::default());
    let engine = Engine::new(config(), inventory, transport.clone()).unwrap();

    engine.start();
    engine.schedule_collection(1, requests());

    tokio::time::sleep(Duration::from_millis(1600)).await;
    engine.shutdown();

    assert!(transport.numeric("threads").len() >= 2);
    assert_eq!(transport.traits(), 1);
    assert!(engine.stats().reports_sent >= 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn stuck_resource_type_is_blacklisted() {
    let inventory = Arc::new(Inventory::new());
    inventory.register(Resource::new(
        1,
        "LegacyDb",
        Component::new().with_measurement(Arc::new(Stuck)),
    ));
    inventory.register(Resource::new(
        2,
        "LegacyDb",
        Component::new().with_measurement(Arc::new(Stuck)),
    ));

    let transport = Arc::new(Recording::default());
    let engine = Engine::new(config(), inventory, transport.clone()).unwrap();

    let interval = Duration::from_secs(60);
    let connections = |id| {
        MeasurementScheduleRequest::new(id, "connections", interval, DataKind::NumericAbsolute)
    };
    engine.schedule_collection(1, vec![connections(1)]);

    let start = Instant::now();
    engine.collect_due().await;
    assert!(start.elapsed() < Duration::from_secs(5));

    assert_eq!(engine.blacklisted_types(), vec!["LegacyDb".to_string()]);
    assert_eq!(engine.stats().failed_collections, 1);

    // same type, different resource: rejected without a call
    engine.schedule_collection(2, vec![connections(2)]);

    let start = Instant::now();
    engine.collect_due().await;
    assert!(start.elapsed() < Duration::from_millis(150));
    assert_eq!(engine.stats().failed_collections, 2);

    // both resources stay scheduled
    assert_eq!(engine.scheduled(), 2);
    assert_eq!(engine.send_report().await, 0);

    engine.clear_blacklist();
    assert!(engine.blacklisted_types().is_empty());
}
