// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The three tiers of the temperature relay and their HTTP plumbing.
//!
//! Sensors post readings to the edge, the edge forwards the average of each batch to
//! the cloud, and the cloud posts a warning back to the edge whenever an average is too
//! high. Every hop goes through a [`reliable_delivery::ReliableSender`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod cloud;
pub mod config;
pub mod edge;
pub mod http_deliverer;
pub mod http_utils;
pub mod ingress;
pub mod sensor;
pub mod wire;
