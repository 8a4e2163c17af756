// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock deliverers with scriptable failure patterns

use async_trait::async_trait;
use reliable_delivery::{Deliverer, DeliveryError, Record};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Deliverer whose failures are controlled by the test.
#[derive(Default)]
pub struct ScriptedDeliverer {
    fail_all: AtomicBool,
    /// Fail every attempt whose 1-based sequence number is a multiple of this value.
    fail_every: AtomicUsize,
    rejected_sources: Mutex<HashSet<String>>,
    attempt_count: AtomicUsize,
    attempts: Mutex<Vec<Record>>,
    delivered: Mutex<Vec<Record>>,
}

#[allow(dead_code)]
impl ScriptedDeliverer {
    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_every(&self, n: usize) {
        self.fail_every.store(n, Ordering::SeqCst);
    }

    pub fn reject_source(&self, source_id: &str) {
        self.rejected_sources
            .lock()
            .unwrap()
            .insert(source_id.to_string());
    }

    pub fn accept_source(&self, source_id: &str) {
        self.rejected_sources.lock().unwrap().remove(source_id);
    }

    pub fn attempts(&self) -> Vec<Record> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> Vec<Record> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Deliverer for ScriptedDeliverer {
    async fn attempt(&self, record: &Record) -> Result<(), DeliveryError> {
        let seq = self.attempt_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.attempts.lock().unwrap().push(record.clone());

        if self.fail_all.load(Ordering::SeqCst) {
            return Err(DeliveryError::Transport("connection refused".to_string()));
        }
        let fail_every = self.fail_every.load(Ordering::SeqCst);
        if fail_every > 0 && seq % fail_every == 0 {
            return Err(DeliveryError::Status(503));
        }
        if let Some(source) = record.source_id() {
            if self.rejected_sources.lock().unwrap().contains(source) {
                return Err(DeliveryError::Status(500));
            }
        }

        self.delivered.lock().unwrap().push(record.clone());
        Ok(())
    }
}
