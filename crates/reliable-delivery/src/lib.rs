// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Durable, ordered, at-least-once delivery of timestamped records.
//!
//! Every hop of a relay uses the same pipeline: a [`sender::ReliableSender`] tries to
//! deliver a record right away through a [`deliverer::Deliverer`] and, when that fails,
//! appends it to a disk-backed [`retry_log::RetryLog`] that a background retry loop
//! drains oldest first. [`ingest_buffer::IngestBuffer`], [`aggregator::Aggregator`] and
//! [`alert::AlertEvaluator`] are the stages that feed senders.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod aggregator;
pub mod alert;
pub mod deliverer;
pub mod errors;
pub mod ingest_buffer;
pub mod record;
pub mod retry_log;
pub mod sender;

pub use aggregator::{Aggregator, MeanReducer, Reducer};
pub use alert::AlertEvaluator;
pub use deliverer::Deliverer;
pub use errors::{DeliveryError, MalformedRecord, StorageError};
pub use ingest_buffer::IngestBuffer;
pub use record::Record;
pub use retry_log::RetryLog;
pub use sender::{DeliveryStats, ReliableSender, RetryReport, SenderConfig, SubmitOutcome};
