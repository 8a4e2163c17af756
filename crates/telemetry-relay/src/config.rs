// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reliable_delivery::SenderConfig;

const DEFAULT_EDGE_PORT: u16 = 8000;
const DEFAULT_CLOUD_PORT: u16 = 8089;
const DEFAULT_MAX_REQUEST_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sensor,
    Edge,
    Cloud,
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sensor" => Ok(Role::Sensor),
            "edge" => Ok(Role::Edge),
            "cloud" => Ok(Role::Cloud),
            other => Err(anyhow::anyhow!(
                "unknown role {other:?}, expected sensor, edge or cloud"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub role: Option<Role>,
    pub log_level: String,
    /// port the ingress server listens on
    pub port: u16,
    /// directory holding one retry log per sender
    pub state_dir: PathBuf,
    pub retry_interval: Duration,
    pub retry_batch_size: usize,
    pub aggregation_interval: Duration,
    pub alert_threshold: f64,
    /// timeout for each outbound delivery attempt
    pub delivery_timeout: Duration,
    pub max_request_content_length: usize,
    pub edge_url: String,
    pub cloud_url: String,
    /// where the cloud tier posts alerts, the edge's `/response` endpoint
    pub alert_url: String,
    pub sensor_ids: Vec<String>,
    pub sensor_interval: Duration,
    pub proxy_url: Option<String>,
}

impl Config {
    pub fn new() -> anyhow::Result<Config> {
        let role = env::var("RELAY_ROLE")
            .ok()
            .map(|val| val.parse::<Role>())
            .transpose()
            .map_err(|e| anyhow::anyhow!("Invalid RELAY_ROLE: {e}"))?;

        let default_port = match role {
            Some(Role::Cloud) => DEFAULT_CLOUD_PORT,
            _ => DEFAULT_EDGE_PORT,
        };

        let retry_batch_size = parse_env("RELAY_RETRY_BATCH_SIZE", 25usize)?;
        if retry_batch_size == 0 {
            anyhow::bail!("Invalid RELAY_RETRY_BATCH_SIZE: must be at least 1");
        }

        let sensor_ids: Vec<String> = env::var("RELAY_SENSOR_IDS")
            .unwrap_or_else(|_| "1,2".to_string())
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Config {
            role,
            log_level: env::var("RELAY_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or_else(|_| "info".to_string()),
            port: parse_env("RELAY_PORT", default_port)?,
            state_dir: env::var("RELAY_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./relay-state")),
            retry_interval: parse_secs("RELAY_RETRY_INTERVAL_SECS", 5)?,
            retry_batch_size,
            aggregation_interval: parse_secs("RELAY_AGGREGATION_INTERVAL_SECS", 5)?,
            alert_threshold: parse_env("RELAY_ALERT_THRESHOLD", 25.0f64)?,
            delivery_timeout: parse_secs("RELAY_DELIVERY_TIMEOUT_SECS", 10)?,
            max_request_content_length: parse_env(
                "RELAY_MAX_REQUEST_BYTES",
                DEFAULT_MAX_REQUEST_BYTES,
            )?,
            edge_url: url_env("RELAY_EDGE_URL", "http://localhost:8000"),
            cloud_url: url_env("RELAY_CLOUD_URL", "http://localhost:8089"),
            alert_url: url_env("EDGE_DEVICE_URL", "http://localhost:8000/response"),
            sensor_ids,
            sensor_interval: parse_secs("RELAY_SENSOR_INTERVAL_SECS", 5)?,
            proxy_url: env::var("RELAY_PROXY_HTTPS")
                .or_else(|_| env::var("HTTPS_PROXY"))
                .ok(),
        })
    }

    pub fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            retry_interval: self.retry_interval,
            max_batch: self.retry_batch_size,
        }
    }
}

fn parse_env<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid {name} {val:?}: {e}")),
        Err(_) => Ok(default),
    }
}

fn parse_secs(name: &str, default: u64) -> anyhow::Result<Duration> {
    let secs = parse_env(name, default)?;
    if secs == 0 {
        anyhow::bail!("Invalid {name}: must be at least 1 second");
    }
    Ok(Duration::from_secs(secs))
}

fn url_env(name: &str, default: &str) -> String {
    env::var(name)
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or_else(|_| default.to_string())
}
