// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// A single delivery attempt did not succeed. Always recoverable: the record is queued
/// for redelivery.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response status {0}")]
    Status(u16),

    #[error("failed to encode record: {0}")]
    Encode(String),
}

/// The retry log's backing store could not be read or written.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("retry log io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode retry log entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// An inbound payload could not be decoded into a record. Such records are dropped at
/// the boundary and never enter a pipeline.
#[derive(Debug, thiserror::Error)]
#[error("malformed record: {reason}")]
pub struct MalformedRecord {
    pub reason: String,
}

impl MalformedRecord {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
