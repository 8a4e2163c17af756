// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock record sinks

use async_trait::async_trait;
use reliable_delivery::Record;
use std::sync::Mutex;
use telemetry_relay::ingress::RecordSink;

/// Keeps every record handed to it.
#[derive(Default)]
pub struct CapturingSink {
    records: Mutex<Vec<Record>>,
}

#[allow(dead_code)]
impl CapturingSink {
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    pub fn alert_texts(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter_map(|record| match record {
                Record::Alert { text, .. } => Some(text.clone()),
                Record::Reading { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl RecordSink for CapturingSink {
    async fn accept(&self, record: Record) {
        self.records.lock().unwrap().push(record);
    }
}
