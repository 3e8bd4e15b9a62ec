// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Lambda-facing half of the Firetail extension: the two record sources, the runtime
//! lifecycle clients and the configuration that ties them together.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod correlator;
pub mod errors;
pub mod extensions_api;
pub mod http_utils;
pub mod logs_api;
pub mod logs_receiver;
pub mod proxy;
