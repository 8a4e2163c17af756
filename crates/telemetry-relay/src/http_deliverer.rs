// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::time::Duration;

use async_trait::async_trait;
use reliable_delivery::{Deliverer, DeliveryError, Record};
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::http_utils::build_client;
use crate::wire::{encode_reading, DOTTED_TIMESTAMP_FORMAT};

/// Posts records to a single downstream URL over HTTP.
///
/// Readings are sent as JSON, alerts as plain text. Alerts coming back from the retry
/// log are annotated with the time they were raised.
pub struct HttpDeliverer {
    client: reqwest::Client,
    target_url: String,
}

impl HttpDeliverer {
    pub fn new(
        target_url: impl Into<String>,
        timeout: Duration,
        proxy_url: Option<&str>,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        Ok(Self::with_client(build_client(proxy_url, timeout)?, target_url))
    }

    pub fn with_client(client: reqwest::Client, target_url: impl Into<String>) -> Self {
        HttpDeliverer {
            client,
            target_url: target_url.into(),
        }
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    async fn post(&self, content_type: &str, body: String) -> Result<(), DeliveryError> {
        let time = std::time::Instant::now();
        let response = self
            .client
            .post(&self.target_url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }
        debug!(
            "Posted to {} in {} ms",
            self.target_url,
            time.elapsed().as_millis()
        );
        Ok(())
    }
}

#[async_trait]
impl Deliverer for HttpDeliverer {
    async fn attempt(&self, record: &Record) -> Result<(), DeliveryError> {
        match record {
            Record::Reading { .. } => {
                let body =
                    encode_reading(record).map_err(|e| DeliveryError::Encode(e.to_string()))?;
                self.post("application/json", body).await
            }
            Record::Alert { text, .. } => self.post("text/plain", text.clone()).await,
        }
    }

    async fn redeliver(&self, record: &Record) -> Result<(), DeliveryError> {
        match record {
            Record::Alert { text, timestamp } => {
                let text = format!(
                    "{text} (from cache, sent at {})",
                    timestamp.format(DOTTED_TIMESTAMP_FORMAT)
                );
                self.post("text/plain", text).await
            }
            Record::Reading { .. } => self.attempt(record).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mockito::{Matcher, Server};

    fn deliverer(url: String) -> HttpDeliverer {
        HttpDeliverer::new(url, Duration::from_secs(2), None).unwrap()
    }

    #[tokio::test]
    async fn test_reading_is_posted_as_json() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/data")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(serde_json::json!({
                "sensorId": "1",
                "temperature": 22.5,
                "timestamp": "2024-05-17T10:30:00Z"
            })))
            .with_status(200)
            .create_async()
            .await;

        let record = Record::reading_at(
            "1",
            22.5,
            Utc.with_ymd_and_hms(2024, 5, 17, 10, 30, 0).unwrap(),
        );
        deliverer(format!("{}/data", server.url()))
            .attempt(&record)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_alert_is_posted_as_text() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/response")
            .match_header("content-type", "text/plain")
            .match_body("Warning: Average temperature 26.00 exceeds 25 degrees.")
            .with_status(200)
            .create_async()
            .await;

        deliverer(format!("{}/response", server.url()))
            .attempt(&Record::alert(
                "Warning: Average temperature 26.00 exceeds 25 degrees.",
            ))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_redelivered_alert_is_annotated() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/response")
            .match_body("too hot (from cache, sent at 2024.05.17.10.30.05)")
            .with_status(200)
            .create_async()
            .await;

        let alert = Record::alert_at(
            "too hot",
            Utc.with_ymd_and_hms(2024, 5, 17, 10, 30, 5).unwrap(),
        );
        deliverer(format!("{}/response", server.url()))
            .redeliver(&alert)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/data")
            .with_status(503)
            .create_async()
            .await;

        let result = deliverer(format!("{}/data", server.url()))
            .attempt(&Record::reading("1", 20.0))
            .await;
        assert!(matches!(result, Err(DeliveryError::Status(503))));
    }

    #[tokio::test]
    async fn test_unreachable_target_is_a_transport_error() {
        let result = deliverer("http://127.0.0.1:1/data".to_string())
            .attempt(&Record::reading("1", 20.0))
            .await;
        assert!(matches!(result, Err(DeliveryError::Transport(_))));
    }
}
