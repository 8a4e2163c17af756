// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use reliable_delivery::{AlertEvaluator, Record, ReliableSender};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::http_deliverer::HttpDeliverer;
use crate::ingress::{IngressServer, RecordSink, RunningTier};

pub const CLOUD_ALERTS_SENDER: &str = "cloud-alerts";
pub const CLOUD_DATA_ACK: &str = "Data processed successfully";

struct AlertingSink(AlertEvaluator);

#[async_trait]
impl RecordSink for AlertingSink {
    async fn accept(&self, record: Record) {
        info!("Received data: {record}");
        self.0.process(&record).await;
    }
}

/// Receives averaged readings and sends a warning back to the edge for each one above
/// the threshold.
pub struct CloudNode {
    evaluator: AlertEvaluator,
    sender: Arc<ReliableSender>,
    max_request_content_length: usize,
}

impl CloudNode {
    pub fn new(
        sender: Arc<ReliableSender>,
        alert_threshold: f64,
        max_request_content_length: usize,
    ) -> Self {
        CloudNode {
            evaluator: AlertEvaluator::new(alert_threshold, Arc::clone(&sender)),
            sender,
            max_request_content_length,
        }
    }

    /// Builds a cloud whose sender `cloud-alerts` posts warnings to the configured alert URL.
    pub fn from_config(config: &Config) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let deliverer = HttpDeliverer::new(
            config.alert_url.clone(),
            config.delivery_timeout,
            config.proxy_url.as_deref(),
        )?;
        let sender = ReliableSender::open(
            CLOUD_ALERTS_SENDER,
            Arc::new(deliverer),
            &config.state_dir,
            config.sender_config(),
        )?;
        Ok(Self::new(
            Arc::new(sender),
            config.alert_threshold,
            config.max_request_content_length,
        ))
    }

    pub fn sender(&self) -> &Arc<ReliableSender> {
        &self.sender
    }

    /// Binds the ingress on `port` and spawns the server and the alert retry loop.
    pub async fn start(
        self,
        port: u16,
        cancel: CancellationToken,
    ) -> Result<RunningTier, Box<dyn Error + Send + Sync>> {
        let listener = IngressServer::bind(port).await?;
        Ok(self.start_on(listener, cancel))
    }

    pub fn start_on(self, listener: TcpListener, cancel: CancellationToken) -> RunningTier {
        let local_addr = listener.local_addr().ok();

        let ingress = IngressServer::new(
            Arc::new(AlertingSink(self.evaluator)),
            self.max_request_content_length,
        )
        .with_data_ack(CLOUD_DATA_ACK);

        let tasks = vec![
            ingress.spawn(listener, cancel.clone()),
            self.sender.spawn_retry_loop(cancel),
        ];
        info!("Cloud started on {local_addr:?}");
        RunningTier { local_addr, tasks }
    }
}
