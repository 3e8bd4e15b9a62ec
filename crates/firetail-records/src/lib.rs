// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoding, batching and delivery of Lambda invocation records.
//!
//! Records enter through a [`queue::RecordSender`], are pulled into batches by the
//! [`assembler::BatchAssembler`] and shipped by a [`flusher::BatchSink`] from inside the
//! [`delivery::DeliveryLoop`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod assembler;
pub mod decoder;
pub mod delivery;
pub mod error_sink;
pub mod errors;
pub mod flusher;
pub mod gateway;
pub mod log_entry;
pub mod queue;
pub mod record;
