// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use crate::errors::DeliveryError;
use crate::record::Record;

/// A single-attempt delivery capability.
///
/// Implementations perform exactly one outbound operation per call and never retry,
/// sleep or keep state between calls. Any transport level problem (refused connection,
/// timeout, non-success status) is reported as a `DeliveryError`. The per-attempt
/// timeout is the implementation's responsibility.
#[async_trait]
pub trait Deliverer {
    /// Attempts to deliver a freshly submitted record.
    async fn attempt(&self, record: &Record) -> Result<(), DeliveryError>;

    /// Attempts to deliver a record taken from the retry log.
    async fn redeliver(&self, record: &Record) -> Result<(), DeliveryError> {
        self.attempt(record).await
    }
}
