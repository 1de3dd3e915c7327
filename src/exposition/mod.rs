//! Admin HTTP endpoint.

use crate::engine::{Engine, StatsSnapshot};
use crate::info;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use metriken::Value;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;

use std::net::SocketAddr;
use std::sync::Arc;

struct AppState {
    engine: Arc<Engine>,
}

pub async fn serve(listen: SocketAddr, engine: Arc<Engine>) -> std::io::Result<()> {
    let listener = TcpListener::bind(listen).await?;
    info!("admin endpoint listening on {listen}");

    axum::serve(listener, app(engine)).await
}

fn app(engine: Arc<Engine>) -> Router {
    let state = Arc::new(AppState { engine });

    Router::new()
        .route("/", get(root))
        .route("/vars", get(human_stats))
        .route("/metrics", get(prometheus_stats))
        .route("/stats", get(stats))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(CompressionLayer::new()))
}

async fn root() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("Mensura {version}\nEndpoints: /vars /metrics /stats\n")
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsSnapshot> {
    // refreshes the scheduled measurements gauge as a side effect
    Json(state.engine.stats())
}

async fn human_stats(State(state): State<Arc<AppState>>) -> String {
    state.engine.stats();

    let mut data = Vec::new();

    for metric in &metriken::metrics() {
        let value = match metric.value() {
            Some(Value::Counter(value)) => value.to_string(),
            Some(Value::Gauge(value)) => value.to_string(),
            _ => continue,
        };

        data.push(format!("{}: {value}", metric.name()));
    }

    data.sort();
    let mut content = data.join("\n");
    content += "\n";
    content
}

async fn prometheus_stats(State(state): State<Arc<AppState>>) -> String {
    state.engine.stats();

    let mut data = Vec::new();

    for metric in &metriken::metrics() {
        let name = metric.name();
        let formatted = if metric.metadata().is_empty() {
            name.to_string()
        } else {
            metric.formatted(metriken::Format::Prometheus)
        };

        match metric.value() {
            Some(Value::Counter(value)) => {
                data.push(format!("# TYPE {name} counter\n{formatted} {value}"));
            }
            Some(Value::Gauge(value)) => {
                data.push(format!("# TYPE {name} gauge\n{formatted} {value}"));
            }
            _ => continue,
        }
    }

    data.sort();
    let mut content = data.join("\n");
    content += "\n";
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::inventory::Inventory;
    use crate::transport::LogTransport;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn engine() -> Arc<Engine> {
        let config = EngineConfig {
            invoker_threads: 1,
            collector_threads: 1,
            ..Default::default()
        };
        Arc::new(Engine::new(config, Arc::new(Inventory::new()), Arc::new(LogTransport)).unwrap())
    }

    async fn get(path: &str) -> (StatusCode, String) {
        let response = app(engine())
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn root_names_endpoints() {
        let (status, body) = get("/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("/metrics"));
    }

    #[tokio::test]
    async fn stats_are_json() {
        let (status, body) = get("/stats").await;
        assert_eq!(status, StatusCode::OK);

        let stats: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(stats["scheduled_measurements"], 0);
        assert!(stats["blacklisted_types"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn metrics_include_engine_gauges() {
        let (status, body) = get("/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("# TYPE scheduled_measurements gauge"));

        let (_, body) = get("/vars").await;
        assert!(body.contains("scheduled_measurements: "));
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let (status, _) = get("/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
