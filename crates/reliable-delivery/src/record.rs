// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The unit of data moved through every delivery pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An immutable, timestamped record.
///
/// A record is either a numeric `Reading` produced by a source (a sensor, or the
/// aggregation tier with the `"average"` source id) or an `Alert` carrying human
/// readable warning text. The timestamp is assigned by the producer when the record is
/// created and is never changed afterwards; two records are the same record if all of
/// their fields are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Reading {
        source_id: String,
        value: f64,
        timestamp: DateTime<Utc>,
    },
    Alert {
        text: String,
        timestamp: DateTime<Utc>,
    },
}

impl Record {
    /// Creates a reading stamped with the current time.
    pub fn reading(source_id: impl Into<String>, value: f64) -> Self {
        Self::reading_at(source_id, value, Utc::now())
    }

    pub fn reading_at(source_id: impl Into<String>, value: f64, timestamp: DateTime<Utc>) -> Self {
        Record::Reading {
            source_id: source_id.into(),
            value,
            timestamp,
        }
    }

    /// Creates an alert stamped with the current time.
    pub fn alert(text: impl Into<String>) -> Self {
        Self::alert_at(text, Utc::now())
    }

    pub fn alert_at(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Record::Alert {
            text: text.into(),
            timestamp,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Record::Reading { timestamp, .. } | Record::Alert { timestamp, .. } => *timestamp,
        }
    }

    /// The numeric value of a reading, `None` for alerts.
    pub fn value(&self) -> Option<f64> {
        match self {
            Record::Reading { value, .. } => Some(*value),
            Record::Alert { .. } => None,
        }
    }

    pub fn source_id(&self) -> Option<&str> {
        match self {
            Record::Reading { source_id, .. } => Some(source_id),
            Record::Alert { .. } => None,
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Reading {
                source_id,
                value,
                timestamp,
            } => write!(
                f,
                "source={source_id} value={value} timestamp={}",
                timestamp.to_rfc3339()
            ),
            Record::Alert { text, timestamp } => {
                write!(f, "alert=\"{text}\" timestamp={}", timestamp.to_rfc3339())
            }
        }
    }
}
