// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex};

use crate::record::Record;

/// Unbounded FIFO between the network ingress and an aggregator.
///
/// Handles are cheap to clone and share the same queue. `drain_all` swaps the queue out
/// under the lock, so every record pushed before the call is returned exactly once and
/// the buffer is empty right after.
#[derive(Debug, Clone, Default)]
pub struct IngestBuffer {
    queue: Arc<Mutex<Vec<Record>>>,
}

impl IngestBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: Record) {
        #[allow(clippy::expect_used)]
        let mut queue = self.queue.lock().expect("lock poisoned");
        queue.push(record);
    }

    /// Takes every buffered record, in arrival order.
    pub fn drain_all(&self) -> Vec<Record> {
        #[allow(clippy::expect_used)]
        let mut queue = self.queue.lock().expect("lock poisoned");
        std::mem::take(&mut *queue)
    }

    pub fn len(&self) -> usize {
        #[allow(clippy::expect_used)]
        let queue = self.queue.lock().expect("lock poisoned");
        queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
