// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::Parser;
use ctlplane::{
    config::{write_completions, Cli, Command, Settings},
    constants::TOKIO_WORKER_THREADS,
    controller::run_controllers,
    metrics,
    webhook::{serve, WebhookState},
};
use kube::Client;
use kube_lease_manager::LeaseManagerBuilder;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Completions { shell }) = cli.command {
        write_completions(shell, &mut std::io::stdout());
        return Ok(());
    }

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("ctlplane-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

fn init_logging() {
    // Format: timestamp file:line LEVEL message
    // RUST_LOG selects the level (default info), RUST_LOG_FORMAT=json selects JSON output
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(cli: Cli) -> Result<()> {
    init_logging();

    info!("Starting OpenStack control plane operator");
    debug!(?cli, "Parsed command line");

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let http_state = Arc::new(WebhookState {
        client: client.clone(),
    });
    let settings = cli.settings();

    if !cli.leader_election {
        warn!("Leader election disabled, running controllers unconditionally");
        return tokio::select! {
            result = serve(http_state, cli.metrics_port) => {
                error!("CRITICAL: HTTP server exited unexpectedly: {:?}", result);
                result?;
                anyhow::bail!("HTTP server exited unexpectedly without error")
            }
            result = run_controllers(client, settings) => result,
            () = shutdown_signal() => Ok(()),
        };
    }

    let identity = cli.identity();
    info!(
        lease = %cli.lease_name,
        namespace = %cli.lease_namespace,
        identity = %identity,
        "Starting leader election"
    );
    let manager = LeaseManagerBuilder::new(client.clone(), &cli.lease_name)
        .with_namespace(&cli.lease_namespace)
        .with_identity(&identity)
        .with_duration(cli.lease_duration_secs)
        .with_grace(cli.lease_grace_secs)
        .build()
        .await?;
    let (mut leader, lease_task) = manager.watch().await;

    let result = tokio::select! {
        result = serve(http_state, cli.metrics_port) => {
            error!("CRITICAL: HTTP server exited unexpectedly: {:?}", result);
            result.and_then(|()| Err(anyhow::anyhow!("HTTP server exited unexpectedly without error")))
        }
        result = lead(client, settings, &mut leader, &identity) => result,
        () = shutdown_signal() => Ok(()),
    };

    drop(leader);
    match lease_task.await {
        Ok(Ok(_)) => debug!("Lease manager stopped"),
        Ok(Err(e)) => warn!(error = %e, "Lease manager stopped with error"),
        Err(e) => warn!(error = %e, "Lease manager task failed"),
    }
    result
}

/// Wait for the lease, then run the controllers until leadership is lost.
async fn lead(
    client: Client,
    settings: Settings,
    leader: &mut watch::Receiver<bool>,
    identity: &str,
) -> Result<()> {
    while !*leader.borrow_and_update() {
        debug!("Waiting for leadership");
        leader.changed().await?;
    }
    info!(identity = %identity, "Acquired leadership, starting controllers");
    metrics::record_leader_elected(identity);

    tokio::select! {
        result = run_controllers(client, settings) => result,
        () = leadership_lost(leader) => {
            metrics::record_leader_lost(identity);
            error!(identity = %identity, "Lost leadership, exiting");
            anyhow::bail!("lost leadership of the controller lease")
        }
    }
}

/// Resolves once `leader` reports `false` or its sender goes away.
async fn leadership_lost(leader: &mut watch::Receiver<bool>) {
    loop {
        if !*leader.borrow_and_update() {
            return;
        }
        if leader.changed().await.is_err() {
            return;
        }
    }
}

/// Resolves on SIGTERM or Ctrl+C.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down");
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod main_tests;
