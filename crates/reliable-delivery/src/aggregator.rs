// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic batch reduction of ingested records into one derived record.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ingest_buffer::IngestBuffer;
use crate::record::Record;
use crate::sender::{ReliableSender, SubmitOutcome};

pub const AVERAGE_SOURCE_ID: &str = "average";
pub const DEFAULT_AGGREGATION_INTERVAL: Duration = Duration::from_secs(5);

/// Reduces a batch of records to a single derived record.
///
/// A reduction depends only on the batch it is given, never on earlier batches.
pub trait Reducer {
    fn reduce(&self, batch: &[Record]) -> Option<Record>;
}

/// Averages the values of the readings in a batch. Alerts and non-finite values are
/// ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanReducer;

impl Reducer for MeanReducer {
    fn reduce(&self, batch: &[Record]) -> Option<Record> {
        let values: Vec<f64> = batch
            .iter()
            .filter_map(Record::value)
            .filter(|v| v.is_finite())
            .collect();
        if values.is_empty() {
            return None;
        }
        let count = values.len() as f64;
        let sum: f64 = values.iter().sum();
        let mean = if sum.is_finite() {
            sum / count
        } else {
            // The plain sum overflowed; scale each value first.
            values.iter().map(|v| v / count).sum::<f64>()
        };
        // A mean never leaves the range of its inputs, which also keeps it finite.
        let (min, max) = values
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        let mean = mean.clamp(min, max);
        Some(Record::reading(AVERAGE_SOURCE_ID, mean))
    }
}

pub struct Aggregator {
    buffer: IngestBuffer,
    reducer: Box<dyn Reducer + Send + Sync>,
    downstream: Arc<ReliableSender>,
    interval: Duration,
}

impl Aggregator {
    pub fn new(
        buffer: IngestBuffer,
        reducer: Box<dyn Reducer + Send + Sync>,
        downstream: Arc<ReliableSender>,
        interval: Duration,
    ) -> Self {
        Aggregator {
            buffer,
            reducer,
            downstream,
            interval,
        }
    }

    /// Drains the buffer, reduces the batch and submits the result downstream.
    ///
    /// Returns `None` when there was nothing to submit.
    pub async fn tick(&self) -> Option<SubmitOutcome> {
        let batch = self.buffer.drain_all();
        if batch.is_empty() {
            return None;
        }

        let derived = self.reducer.reduce(&batch)?;
        debug!("Reduced {} records into {derived}", batch.len());
        Some(self.downstream.submit(derived).await)
    }

    pub async fn run(&self, cancel: CancellationToken) {
        debug!("Aggregator started");
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        debug!("Aggregator stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_of_readings() {
        let batch = vec![
            Record::reading("1", 20.0),
            Record::reading("2", 22.0),
            Record::reading("1", 30.0),
        ];
        let derived = MeanReducer.reduce(&batch).unwrap();
        assert_eq!(derived.value(), Some(24.0));
        assert_eq!(derived.source_id(), Some(AVERAGE_SOURCE_ID));
    }

    #[test]
    fn test_mean_ignores_alerts() {
        let batch = vec![Record::alert("hot"), Record::reading("1", 26.0)];
        assert_eq!(MeanReducer.reduce(&batch).unwrap().value(), Some(26.0));
        assert!(MeanReducer.reduce(&[Record::alert("hot")]).is_none());
        assert!(MeanReducer.reduce(&[]).is_none());
    }

    #[test]
    fn test_mean_of_huge_values_stays_finite() {
        let batch = vec![
            Record::reading("1", 1e308),
            Record::reading("2", 1e308),
            Record::reading("3", f64::MAX),
        ];
        let mean = MeanReducer.reduce(&batch).unwrap().value().unwrap();
        assert!(mean.is_finite());
        assert!(mean >= 1e308);

        let batch = vec![Record::reading("1", 1e308), Record::reading("2", 1e308)];
        assert_eq!(MeanReducer.reduce(&batch).unwrap().value(), Some(1e308));

        let batch = vec![Record::reading("1", -f64::MAX), Record::reading("2", f64::MAX)];
        assert_eq!(MeanReducer.reduce(&batch).unwrap().value(), Some(0.0));
    }
}
