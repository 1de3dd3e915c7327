//! Delivery of completed reports to the remote collector.
//!
//! Delivery is attempted once per report; retries, if any, belong to the
//! transport implementation.

use crate::info;
use crate::measurement::MeasurementReport;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, report: MeasurementReport) -> Result<(), TransportError>;
}

/// Posts each report as a JSON document.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, report: MeasurementReport) -> Result<(), TransportError> {
        let body = serde_json::to_vec(&report)?;

        self.client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

/// Logs a summary of each report instead of delivering it.
#[derive(Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, report: MeasurementReport) -> Result<(), TransportError> {
        info!(
            "measurement report: {} numeric, {} traits, collected in {} ms",
            report.numeric().len(),
            report.traits().len(),
            report.collection_time()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{DataKind, MeasurementScheduleRequest};

    #[test]
    fn report_encodes_as_json() {
        let request = MeasurementScheduleRequest::new(
            3,
            "load.1m",
            Duration::from_secs(60),
            DataKind::NumericAbsolute,
        );
        let mut report = MeasurementReport::new();
        report.add_numeric_at(&request, 1000, Some(0.5));

        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["numeric"][0]["schedule_id"], 3);
        assert_eq!(json["numeric"][0]["value"], 0.5);
        assert_eq!(json["numeric"][0]["numeric_type"], "dynamic");
    }

    #[tokio::test]
    async fn log_transport_accepts_reports() {
        assert!(LogTransport.send(MeasurementReport::new()).await.is_ok());
    }
}
