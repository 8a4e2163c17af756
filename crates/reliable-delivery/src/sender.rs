// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Submit-then-fallback delivery with a durable, strictly ordered retry path.
//!
//! ```text
//!   submit(record)
//!        │
//!        v
//!   ┌──────────┐  ok   Delivered
//!   │ attempt  ├─────>
//!   └────┬─────┘
//!        │ err
//!        v
//!   ┌──────────┐  ok   Queued
//!   │ RetryLog ├─────>
//!   │  append  │
//!   └────┬─────┘
//!        │ err
//!        v
//!   in-memory pending queue   Buffered (persisted on the next retry tick)
//! ```
//!
//! The retry loop redelivers the oldest entries first, at most `max_batch` per tick, and
//! stops the pass at the first failure so a newer record is never acknowledged ahead of
//! an older one.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::deliverer::Deliverer;
use crate::errors::StorageError;
use crate::record::Record;
use crate::retry_log::RetryLog;

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_BATCH: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderConfig {
    /// Time between two retry passes.
    pub retry_interval: Duration,
    /// Maximum number of entries examined by one retry pass.
    pub max_batch: usize,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_batch: DEFAULT_MAX_BATCH,
        }
    }
}

/// What happened to a submitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The immediate attempt succeeded.
    Delivered,
    /// The immediate attempt failed and the record was durably queued.
    Queued,
    /// The immediate attempt failed and the retry log could not be written; the record
    /// is held in memory until the next retry pass persists or delivers it.
    Buffered,
}

/// Result of a single retry pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryReport {
    pub attempted: usize,
    pub delivered: usize,
    pub remaining: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered_immediately: u64,
    pub queued: u64,
    pub buffered: u64,
    pub delivered_on_retry: u64,
    pub retry_failures: u64,
    pub storage_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    delivered_immediately: AtomicU64,
    queued: AtomicU64,
    buffered: AtomicU64,
    delivered_on_retry: AtomicU64,
    retry_failures: AtomicU64,
    storage_failures: AtomicU64,
}

impl Counters {
    fn incr(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            delivered_immediately: self.delivered_immediately.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            buffered: self.buffered.load(Ordering::Relaxed),
            delivered_on_retry: self.delivered_on_retry.load(Ordering::Relaxed),
            retry_failures: self.retry_failures.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
struct Store {
    log: RetryLog,
    // Records whose append failed, newer than everything in `log`.
    pending: VecDeque<Record>,
}

pub struct ReliableSender {
    name: String,
    deliverer: Arc<dyn Deliverer + Send + Sync>,
    config: SenderConfig,
    store: Mutex<Store>,
    // Serializes retry passes; only a pass removes entries.
    retry_pass: Mutex<()>,
    counters: Counters,
}

impl ReliableSender {
    pub fn new(
        name: impl Into<String>,
        deliverer: Arc<dyn Deliverer + Send + Sync>,
        retry_log: RetryLog,
        config: SenderConfig,
    ) -> Self {
        let config = SenderConfig {
            max_batch: config.max_batch.max(1),
            ..config
        };
        ReliableSender {
            name: name.into(),
            deliverer,
            config,
            store: Mutex::new(Store {
                log: retry_log,
                pending: VecDeque::new(),
            }),
            retry_pass: Mutex::new(()),
            counters: Counters::default(),
        }
    }

    /// Creates a sender whose retry log lives at `<state_dir>/<name>.log`.
    pub fn open(
        name: impl Into<String>,
        deliverer: Arc<dyn Deliverer + Send + Sync>,
        state_dir: &Path,
        config: SenderConfig,
    ) -> Result<Self, StorageError> {
        let name = name.into();
        let retry_log = RetryLog::open(state_dir.join(format!("{name}.log")))?;
        Ok(Self::new(name, deliverer, retry_log, config))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> SenderConfig {
        self.config
    }

    pub fn stats(&self) -> DeliveryStats {
        self.counters.snapshot()
    }

    /// Number of records waiting for redelivery.
    pub async fn backlog(&self) -> usize {
        let store = self.store.lock().await;
        store.log.len() + store.pending.len()
    }

    /// Attempts to deliver `record` right away and falls back to the retry path.
    ///
    /// Never fails: downstream unavailability only shows up in the outcome, the
    /// counters and the retry log.
    pub async fn submit(&self, record: Record) -> SubmitOutcome {
        match self.deliverer.attempt(&record).await {
            Ok(()) => {
                Counters::incr(&self.counters.delivered_immediately, 1);
                debug!(sender = %self.name, "Delivered immediately: {record}");
                return SubmitOutcome::Delivered;
            }
            Err(e) => {
                warn!(sender = %self.name, "Delivery failed, will retry: {record}: {e}");
            }
        }

        let mut store = self.store.lock().await;
        if store.pending.is_empty() {
            match store.log.append(&record) {
                Ok(()) => {
                    Counters::incr(&self.counters.queued, 1);
                    info!(sender = %self.name, "Queued after failure: {record}");
                    return SubmitOutcome::Queued;
                }
                Err(e) => {
                    Counters::incr(&self.counters.storage_failures, 1);
                    error!(sender = %self.name, "Failed to persist record, holding it in memory: {e}");
                }
            }
        }
        Counters::incr(&self.counters.buffered, 1);
        store.pending.push_back(record);
        SubmitOutcome::Buffered
    }

    /// Runs one retry pass over the oldest queued records.
    pub async fn retry_pending(&self) -> RetryReport {
        let _pass = self.retry_pass.lock().await;

        let (batch, from_log) = {
            let mut store = self.store.lock().await;
            self.persist_pending(&mut store);

            let mut batch = store.log.peek_oldest(self.config.max_batch);
            let from_log = batch.len();
            let room = self.config.max_batch - from_log;
            batch.extend(store.pending.iter().take(room).cloned());
            (batch, from_log)
        };

        if batch.is_empty() {
            return RetryReport::default();
        }

        let mut report = RetryReport::default();
        for record in &batch {
            report.attempted += 1;
            match self.deliverer.redeliver(record).await {
                Ok(()) => {
                    report.delivered += 1;
                    info!(sender = %self.name, "Delivered on retry: {record}");
                }
                Err(e) => {
                    Counters::incr(&self.counters.retry_failures, 1);
                    warn!(sender = %self.name, "Retry failed, stopping this pass: {record}: {e}");
                    break;
                }
            }
        }
        Counters::incr(&self.counters.delivered_on_retry, report.delivered as u64);

        let mut store = self.store.lock().await;
        let log_delivered = report.delivered.min(from_log);
        if log_delivered > 0 {
            if let Err(e) = store.log.remove_oldest(log_delivered) {
                // The entries stay in the log and will be delivered again.
                Counters::incr(&self.counters.storage_failures, 1);
                error!(sender = %self.name, "Failed to remove {log_delivered} delivered entries: {e}");
            }
        }
        store.pending.drain(..report.delivered - log_delivered);

        report.remaining = store.log.len() + store.pending.len();
        report
    }

    /// Ticks every `retry_interval` until `cancel` fires. A pass that has started is
    /// always completed.
    pub async fn run_retry_loop(&self, cancel: CancellationToken) {
        debug!(sender = %self.name, "Retry loop started");
        let mut ticker = interval(self.config.retry_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.retry_pending().await;
                    if report.attempted > 0 {
                        debug!(
                            sender = %self.name,
                            "Retry pass: attempted={} delivered={} remaining={}",
                            report.attempted, report.delivered, report.remaining
                        );
                    }
                }
            }
        }
        debug!(sender = %self.name, "Retry loop stopped");
    }

    pub fn spawn_retry_loop(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let sender = Arc::clone(self);
        tokio::spawn(async move { sender.run_retry_loop(cancel).await })
    }

    fn persist_pending(&self, store: &mut Store) {
        while let Some(record) = store.pending.front() {
            match store.log.append(record) {
                Ok(()) => {}
                Err(StorageError::Encode(e)) => {
                    // No encoding exists for it, so it can neither be stored nor sent.
                    Counters::incr(&self.counters.storage_failures, 1);
                    error!(sender = %self.name, "Dropping unencodable record {record}: {e}");
                }
                Err(e) => {
                    Counters::incr(&self.counters.storage_failures, 1);
                    error!(
                        sender = %self.name,
                        "Still unable to persist {} buffered records: {e}",
                        store.pending.len()
                    );
                    return;
                }
            }
            store.pending.pop_front();
        }
    }
}

impl std::fmt::Debug for ReliableSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReliableSender")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
