// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! JSON body exchanged between tiers for a single reading.
//!
//! ```json
//! {"sensorId": "1", "temperature": 22.5, "timestamp": "2024-05-17T10:30:00Z"}
//! ```
//!
//! Timestamps are written in RFC 3339. On the way in, the dotted
//! `yyyy.MM.dd.HH.mm.ss` layout used by older sensors is accepted too and read as UTC.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use reliable_delivery::{MalformedRecord, Record};
use serde::{Deserialize, Serialize};

pub const DOTTED_TIMESTAMP_FORMAT: &str = "%Y.%m.%d.%H.%M.%S";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadingBody {
    sensor_id: String,
    temperature: f64,
    timestamp: String,
}

pub fn decode_reading(body: &[u8]) -> Result<Record, MalformedRecord> {
    let parsed: ReadingBody =
        serde_json::from_slice(body).map_err(|e| MalformedRecord::new(e.to_string()))?;

    if parsed.sensor_id.trim().is_empty() {
        return Err(MalformedRecord::new("empty sensorId"));
    }
    if !parsed.temperature.is_finite() {
        return Err(MalformedRecord::new("temperature is not a finite number"));
    }
    let timestamp = parse_timestamp(&parsed.timestamp)?;

    Ok(Record::reading_at(
        parsed.sensor_id,
        parsed.temperature,
        timestamp,
    ))
}

/// Fails for alerts, which travel as plain text.
pub fn encode_reading(record: &Record) -> Result<String, MalformedRecord> {
    let Record::Reading {
        source_id,
        value,
        timestamp,
    } = record
    else {
        return Err(MalformedRecord::new("alerts have no reading body"));
    };

    let body = ReadingBody {
        sensor_id: source_id.clone(),
        temperature: *value,
        timestamp: timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
    };
    serde_json::to_string(&body).map_err(|e| MalformedRecord::new(e.to_string()))
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, MalformedRecord> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, DOTTED_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| MalformedRecord::new(format!("unrecognized timestamp {raw:?}")))
}
