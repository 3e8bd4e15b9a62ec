// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod logger;

use std::{env, path::Path, process::ExitCode, sync::Arc};
use tokio::{
    net::TcpListener,
    signal::unix::{signal, SignalKind},
    task::JoinHandle,
    time::{sleep, timeout_at, Duration, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use firetail_agent::{
    config::{Config, RecordSource},
    correlator::Correlator,
    errors::RuntimeApiError,
    extensions_api::{EventType, ExtensionsClient},
    logs_api::{LogsApiClient, SubscribeRequest},
    logs_receiver::LogsReceiver,
    proxy::RuntimeProxy,
};
use firetail_records::{
    delivery::{DeliveryConfig, DeliveryLoop, DeliveryStats},
    error_sink::{ErrorSink, LogErrorSink},
    flusher::{FlusherConfig, Forwarder, DEFAULT_TIMEOUT},
    queue::{self, RecordSender},
};

const DEFAULT_EXTENSION_NAME: &str = "firetail-lambda-extension";
/// Logs API deliveries can still arrive for a short while after SHUTDOWN.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(500);
const DELIVERY_DRAIN_DEADLINE: Duration = Duration::from_millis(1500);

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = Config::new();
    if let Err(e) = logger::init(config.as_ref().is_ok_and(|config| config.debug)) {
        eprintln!("Failed to set up logging: {e}");
    }
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Error creating config on Firetail extension startup: {e}");
            return ExitCode::FAILURE;
        }
    };
    debug!("Logging subsystem enabled");

    let mut extensions = match ExtensionsClient::new(&config.runtime_api) {
        Ok(client) => client,
        Err(e) => {
            error!("Error creating Extensions API client: {e}");
            return ExitCode::FAILURE;
        }
    };
    let name = extension_name();
    match extensions.register(&name).await {
        Ok(registered) => info!(
            "Registered {name} for function {} ({})",
            registered.function_name, registered.function_version
        ),
        Err(e) => {
            error!("Error registering extension {name}: {e}");
            return ExitCode::FAILURE;
        }
    }

    let forwarder = match Forwarder::new(FlusherConfig {
        api_key: config.api_token.clone(),
        sink_url: config.api_url.clone(),
        timeout: DEFAULT_TIMEOUT,
    }) {
        Ok(forwarder) => forwarder,
        Err(e) => {
            error!("Error creating Firetail API client: {e}");
            report_init_error(&extensions, "Extension.ForwarderError").await;
            return ExitCode::FAILURE;
        }
    };

    let (queue_tx, queue_rx) = queue::bounded(config.log_buffer_size);
    let errors: Arc<dyn ErrorSink> = Arc::new(LogErrorSink);
    let delivery = tokio::spawn(
        DeliveryLoop::new(
            queue_rx,
            forwarder,
            errors.clone(),
            DeliveryConfig {
                max_batch_size: config.max_batch_size,
                ..Default::default()
            },
        )
        .run(),
    );

    let cancel = CancellationToken::new();
    // The source takes the last producer handle; the queue closes when it stops.
    let source = match start_source(&config, &extensions, queue_tx, errors, cancel.clone()).await
    {
        Ok(source) => source,
        Err(e) => {
            error!("Error starting {} record source: {e}", config.record_source);
            report_init_error(&extensions, "Extension.SourceStartError").await;
            return ExitCode::FAILURE;
        }
    };
    info!("Firetail extension ready, records from {}", config.record_source);

    let clean = event_loop(&extensions).await;
    shutdown(cancel, source, delivery).await;

    if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn extension_name() -> String {
    env::args()
        .next()
        .as_deref()
        .and_then(|arg| Path::new(arg).file_name())
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_EXTENSION_NAME.to_string())
}

async fn start_source(
    config: &Config,
    extensions: &ExtensionsClient,
    queue: RecordSender,
    errors: Arc<dyn ErrorSink>,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>, Box<dyn std::error::Error>> {
    match config.record_source {
        RecordSource::LogsApi => {
            let listener = TcpListener::bind(&config.log_receiver_address).await?;
            let receiver = LogsReceiver::new(queue, errors);
            let server = tokio::spawn(async move {
                if let Err(e) = receiver.serve(listener, cancel).await {
                    error!("Logs receiver stopped: {e}");
                }
            });
            let extension_id = extensions
                .extension_id()
                .ok_or(RuntimeApiError::NotRegistered)?;
            LogsApiClient::new(&config.runtime_api)?
                .subscribe(extension_id, &SubscribeRequest::default())
                .await?;
            Ok(server)
        }
        RecordSource::Proxy => {
            let listener = TcpListener::bind(("0.0.0.0", config.proxy_port)).await?;
            let (proxy, observations) = RuntimeProxy::new(&config.runtime_api)?;
            let correlator = tokio::spawn(Correlator::new(observations, queue, errors).run());
            let server = tokio::spawn(proxy.serve(listener, cancel));
            Ok(tokio::spawn(async move {
                match server.await {
                    Ok(Err(e)) => error!("Runtime proxy stopped: {e}"),
                    Err(e) => error!("Runtime proxy task failed: {e}"),
                    Ok(Ok(())) => {}
                }
                match correlator.await {
                    Ok(queued) => debug!("Correlator queued {queued} record(s)"),
                    Err(e) => error!("Correlator task failed: {e}"),
                }
            }))
        }
    }
}

async fn report_init_error(extensions: &ExtensionsClient, error_type: &str) {
    if let Err(e) = extensions.init_error(error_type).await {
        error!("Error reporting init error to Extensions API: {e}");
    }
}

/// Waits for SHUTDOWN or a termination signal. Returns false if the Extensions API failed.
async fn event_loop(extensions: &ExtensionsClient) -> bool {
    let terminated = termination_signal();
    tokio::pin!(terminated);

    loop {
        tokio::select! {
            event = extensions.next_event() => match event {
                Ok(event) => match event.event_type {
                    EventType::Invoke => debug!("Invocation {}", event.request_id),
                    EventType::Shutdown => {
                        info!(
                            "Shutdown event received: {}",
                            event.shutdown_reason.as_deref().unwrap_or("unknown reason")
                        );
                        return true;
                    }
                    EventType::Unknown => debug!("Ignoring unrecognized lifecycle event"),
                },
                Err(e) => {
                    error!("Error getting next event: {e}");
                    if let Err(e) = extensions.exit_error("Extension.NextEventError").await {
                        error!("Error reporting exit error to Extensions API: {e}");
                    }
                    return false;
                }
            },
            _ = &mut terminated => {
                info!("Termination signal received");
                return true;
            }
        }
    }
}

async fn termination_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => {}
                _ = ctrl_c => {}
            }
        }
        Err(e) => {
            warn!("Unable to listen for SIGTERM: {e}");
            ctrl_c.await;
        }
    }
}

async fn shutdown(
    cancel: CancellationToken,
    source: JoinHandle<()>,
    delivery: JoinHandle<DeliveryStats>,
) {
    sleep(SHUTDOWN_GRACE_PERIOD).await;
    cancel.cancel();

    let deadline = Instant::now() + DELIVERY_DRAIN_DEADLINE;
    match timeout_at(deadline, source).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Record source task failed: {e}"),
        Err(_) => warn!("Record source did not stop before the shutdown deadline"),
    }
    match timeout_at(deadline, delivery).await {
        Ok(Ok(stats)) => info!(
            "Delivered {} record(s) in {} attempt(s), discarded {}",
            stats.delivered, stats.attempts, stats.discarded
        ),
        Ok(Err(e)) => error!("Delivery task failed: {e}"),
        Err(_) => warn!("Records still queued at the shutdown deadline were not delivered"),
    }
}
