// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reliable_delivery::{Record, ReliableSender, SubmitOutcome};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::http_deliverer::HttpDeliverer;
use crate::ingress::DATA_ENDPOINT_PATH;

pub const TEMPERATURE_RANGE: Range<f64> = 20.0..35.0;

/// A simulated temperature sensor reporting to the edge tier.
pub struct Sensor {
    id: String,
    sender: Arc<ReliableSender>,
    interval: Duration,
}

impl Sensor {
    pub fn new(id: impl Into<String>, sender: Arc<ReliableSender>, interval: Duration) -> Self {
        Sensor {
            id: id.into(),
            sender,
            interval,
        }
    }

    /// Builds a sensor whose sender `sensor-<id>` posts to the edge's `/data` endpoint.
    pub fn from_config(id: &str, config: &Config) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let deliverer = HttpDeliverer::new(
            format!("{}{DATA_ENDPOINT_PATH}", config.edge_url),
            config.delivery_timeout,
            config.proxy_url.as_deref(),
        )?;
        let sender = ReliableSender::open(
            format!("sensor-{id}"),
            Arc::new(deliverer),
            &config.state_dir,
            config.sender_config(),
        )?;
        Ok(Self::new(id, Arc::new(sender), config.sensor_interval))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sender(&self) -> &Arc<ReliableSender> {
        &self.sender
    }

    /// Takes one reading and submits it.
    pub async fn emit(&self) -> SubmitOutcome {
        let temperature = rand::thread_rng().gen_range(TEMPERATURE_RANGE);
        let record = Record::reading(self.id.as_str(), temperature);
        let outcome = self.sender.submit(record).await;
        match outcome {
            SubmitOutcome::Delivered => {
                info!("Data sent successfully: sensor {} temperature {temperature:.2}", self.id)
            }
            _ => info!(
                "Failed to send data, queued for retry: sensor {} temperature {temperature:.2}",
                self.id
            ),
        }
        outcome
    }

    /// Emits a reading right away and then once per interval until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        debug!("Sensor {} started", self.id);
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.emit().await;
                }
            }
        }
        debug!("Sensor {} stopped", self.id);
    }

    /// Spawns the reading loop and the sender's retry loop.
    pub fn spawn(self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let retry = self.sender.spawn_retry_loop(cancel.clone());
        let readings = tokio::spawn(async move { self.run(cancel).await });
        vec![readings, retry]
    }
}
