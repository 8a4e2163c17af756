// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tracing::info;

use crate::record::Record;
use crate::sender::{ReliableSender, SubmitOutcome};

pub const DEFAULT_ALERT_THRESHOLD: f64 = 25.0;

/// Raises an alert for every aggregated reading strictly above a fixed threshold.
///
/// There is no hysteresis and no suppression window: each qualifying reading produces a
/// new alert.
pub struct AlertEvaluator {
    threshold: f64,
    sender: Arc<ReliableSender>,
}

impl AlertEvaluator {
    pub fn new(threshold: f64, sender: Arc<ReliableSender>) -> Self {
        AlertEvaluator { threshold, sender }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn evaluate(&self, record: &Record) -> Option<Record> {
        match record {
            Record::Reading { value, .. } if *value > self.threshold => Some(Record::alert(
                format!(
                    "Warning: Average temperature {value:.2} exceeds {} degrees.",
                    self.threshold
                ),
            )),
            _ => None,
        }
    }

    /// Evaluates `record` and hands any resulting alert to the alert sender.
    pub async fn process(&self, record: &Record) -> Option<SubmitOutcome> {
        let alert = self.evaluate(record)?;
        info!("Raising alert for {record}");
        Some(self.sender.submit(alert).await)
    }
}
