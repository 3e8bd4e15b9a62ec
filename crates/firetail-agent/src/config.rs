// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use firetail_records::delivery::DEFAULT_MAX_BATCH_SIZE;
use firetail_records::flusher::DEFAULT_SINK_URL;
use firetail_records::queue::DEFAULT_QUEUE_CAPACITY;
use std::env;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_PROXY_PORT: u16 = 9009;
/// Address the Lambda sandbox resolves for extensions; the Logs API pushes here.
pub const LOG_RECEIVER_ADDRESS: &str = "sandbox:1234";
pub const LOCAL_LOG_RECEIVER_ADDRESS: &str = "0.0.0.0:1234";
pub const LOG_RECEIVER_URI: &str = "http://sandbox:1234";

/// Where invocation records come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSource {
    /// Records printed by the function, pushed to us by the Lambda Logs API.
    LogsApi,
    /// Records built by sitting between the runtime and the Runtime API.
    Proxy,
}

impl FromStr for RecordSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "logs-api" => Ok(RecordSource::LogsApi),
            "proxy" => Ok(RecordSource::Proxy),
            other => Err(anyhow::anyhow!(
                "FIRETAIL_RECORD_SOURCE invalid: {other:?} is not one of \"logs-api\", \"proxy\""
            )),
        }
    }
}

impl fmt::Display for RecordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordSource::LogsApi => write!(f, "logs-api"),
            RecordSource::Proxy => write!(f, "proxy"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_token: String,
    pub api_url: String,
    /// Capacity of the record queue between the sources and the delivery loop.
    pub log_buffer_size: usize,
    pub max_batch_size: usize,
    pub debug: bool,
    pub proxy_port: u16,
    pub record_source: RecordSource,
    /// host:port of the Lambda Runtime API.
    pub runtime_api: String,
    pub log_receiver_address: String,
}

impl Config {
    pub fn new() -> Result<Config, Box<dyn std::error::Error>> {
        let api_token = non_empty_var("FIRETAIL_API_TOKEN")
            .ok_or_else(|| anyhow::anyhow!("FIRETAIL_API_TOKEN not set"))?;
        let api_url =
            non_empty_var("FIRETAIL_API_URL").unwrap_or_else(|| DEFAULT_SINK_URL.to_string());

        let log_buffer_size = read_size("FIRETAIL_LOG_BUFFER_SIZE", DEFAULT_QUEUE_CAPACITY, 1)?;
        let max_batch_size = read_size("FIRETAIL_MAX_BATCH_SIZE", DEFAULT_MAX_BATCH_SIZE, 1)?;

        let debug = non_empty_var("FIRETAIL_EXTENSION_DEBUG")
            .map(|val| is_enabled(&val))
            .unwrap_or(false);
        let proxy_port = env::var("FIRETAIL_LAMBDA_EXTENSION_PORT")
            .ok()
            .and_then(|port| port.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PROXY_PORT);
        let record_source = match non_empty_var("FIRETAIL_RECORD_SOURCE") {
            Some(val) => val.parse()?,
            None => RecordSource::LogsApi,
        };

        let runtime_api = non_empty_var("AWS_LAMBDA_RUNTIME_API")
            .ok_or_else(|| anyhow::anyhow!("AWS_LAMBDA_RUNTIME_API not set"))?;
        let sam_local = env::var("AWS_SAM_LOCAL")
            .map(|val| val.to_lowercase() == "true")
            .unwrap_or(false);
        let log_receiver_address = if sam_local {
            LOCAL_LOG_RECEIVER_ADDRESS
        } else {
            LOG_RECEIVER_ADDRESS
        }
        .to_string();

        Ok(Config {
            api_token,
            api_url,
            log_buffer_size,
            max_batch_size,
            debug,
            proxy_port,
            record_source,
            runtime_api,
            log_receiver_address,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|val| !val.trim().is_empty())
}

fn is_enabled(val: &str) -> bool {
    matches!(val.trim().to_lowercase().as_str(), "true" | "1")
}

fn read_size(name: &str, default: usize, min: usize) -> Result<usize, anyhow::Error> {
    let Some(raw) = non_empty_var(name) else {
        return Ok(default);
    };
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{name} invalid: {e}"))?;
    match usize::try_from(value) {
        Ok(size) if size >= min => Ok(size),
        _ => Err(anyhow::anyhow!("{name} is {value} but must be >= {min}")),
    }
}
