// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reliable_delivery::{Aggregator, IngestBuffer, MeanReducer, Record, ReliableSender};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::http_deliverer::HttpDeliverer;
use crate::ingress::{IngressServer, RecordSink, RunningTier, DATA_ENDPOINT_PATH};

pub const EDGE_TO_CLOUD_SENDER: &str = "edge-to-cloud";

struct BufferSink(IngestBuffer);

#[async_trait]
impl RecordSink for BufferSink {
    async fn accept(&self, record: Record) {
        debug!("Buffered {record}");
        self.0.push(record);
    }
}

struct WarningLog;

#[async_trait]
impl RecordSink for WarningLog {
    async fn accept(&self, record: Record) {
        if let Record::Alert { text, .. } = record {
            info!("Received warning from cloud server: {text}");
        }
    }
}

/// Collects sensor readings, forwards their periodic average to the cloud tier and
/// receives the warnings the cloud sends back.
pub struct EdgeNode {
    buffer: IngestBuffer,
    sender: Arc<ReliableSender>,
    warnings: Arc<dyn RecordSink + Send + Sync>,
    aggregation_interval: Duration,
    max_request_content_length: usize,
}

impl EdgeNode {
    pub fn new(
        sender: Arc<ReliableSender>,
        aggregation_interval: Duration,
        max_request_content_length: usize,
    ) -> Self {
        EdgeNode {
            buffer: IngestBuffer::new(),
            sender,
            warnings: Arc::new(WarningLog),
            aggregation_interval,
            max_request_content_length,
        }
    }

    /// Builds an edge whose sender `edge-to-cloud` posts averages to the cloud's `/data`.
    pub fn from_config(config: &Config) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let deliverer = HttpDeliverer::new(
            format!("{}{DATA_ENDPOINT_PATH}", config.cloud_url),
            config.delivery_timeout,
            config.proxy_url.as_deref(),
        )?;
        let sender = ReliableSender::open(
            EDGE_TO_CLOUD_SENDER,
            Arc::new(deliverer),
            &config.state_dir,
            config.sender_config(),
        )?;
        Ok(Self::new(
            Arc::new(sender),
            config.aggregation_interval,
            config.max_request_content_length,
        ))
    }

    /// Replaces the default handling of warnings, which only logs them.
    pub fn with_warning_sink(mut self, warnings: Arc<dyn RecordSink + Send + Sync>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn buffer(&self) -> &IngestBuffer {
        &self.buffer
    }

    pub fn sender(&self) -> &Arc<ReliableSender> {
        &self.sender
    }

    /// Binds the ingress on `port` and spawns the server, the aggregator and the retry loop.
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
            Arc::new(BufferSink(self.buffer.clone())),
            self.max_request_content_length,
        )
        .with_alerts(self.warnings);

        let aggregator = Aggregator::new(
            self.buffer,
            Box::new(MeanReducer),
            Arc::clone(&self.sender),
            self.aggregation_interval,
        );

        let tasks = vec![
            ingress.spawn(listener, cancel.clone()),
            aggregator.spawn(cancel.clone()),
            self.sender.spawn_retry_loop(cancel),
        ];
        info!("Edge started on {local_addr:?}");
        RunningTier { local_addr, tasks }
    }
}
