// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::error::Error;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use telemetry_relay::{
    cloud::CloudNode,
    config::{Config, Role},
    edge::EdgeNode,
    ingress::RunningTier,
    sensor::Sensor,
};

#[tokio::main]
pub async fn main() {
    let config = match Config::new() {
        Ok(c) => c,
        Err(e) => {
            // logging is not set up yet
            eprintln!("Error creating config on telemetry relay startup: {e}");
            return;
        }
    };

    let env_filter = format!("h2=off,hyper=off,reqwest=off,{}", config.log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let Some(role) = config.role else {
        error!("RELAY_ROLE is not set, expected sensor, edge or cloud");
        return;
    };

    let cancel = CancellationToken::new();
    let tier = match start(role, &config, cancel.clone()).await {
        Ok(tier) => tier,
        Err(e) => {
            error!("Error starting {role:?} tier: {e}");
            return;
        }
    };

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Unable to listen for shutdown signal: {e}"),
    }
    cancel.cancel();
    tier.join().await;
    info!("{role:?} tier stopped");
}

async fn start(
    role: Role,
    config: &Config,
    cancel: CancellationToken,
) -> Result<RunningTier, Box<dyn Error + Send + Sync>> {
    match role {
        Role::Sensor => {
            let mut tasks = Vec::new();
            for id in &config.sensor_ids {
                let sensor = Sensor::from_config(id, config)?;
                info!("Starting sensor {}", sensor.id());
                tasks.extend(sensor.spawn(cancel.clone()));
            }
            Ok(RunningTier {
                local_addr: None,
                tasks,
            })
        }
        Role::Edge => {
            EdgeNode::from_config(config)?
                .start(config.port, cancel)
                .await
        }
        Role::Cloud => {
            CloudNode::from_config(config)?
                .start(config.port, cancel)
                .await
        }
    }
}
