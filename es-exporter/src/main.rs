use std::sync::Arc;

use anyhow::Context;
use es_exporter::{
    client::{EsClient, HttpClient},
    collector::assemble,
    metrics::{internal::Telemetry, server::start_metrics_server},
    registry::ExpositionRegistry,
    runtime::{Runtime, logging},
    scheduler::{Scheduler, ShutdownResult},
};
use tokio::{signal, sync::broadcast};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Runtime { conf, .. } = Runtime::new()?;
    logging::init(conf.log_level, conf.scheduler_log_level);

    if let Some(path) = &conf.config_path {
        info!(
            event.name = "system.config_loaded",
            config.path = %path.display(),
            "configuration loaded"
        );
    }

    let client = HttpClient::new(&conf.cluster).context("failed to build cluster client")?;
    info!(
        event.name = "client.initialized",
        client.hosts = ?client.hosts(),
        "cluster client initialized"
    );
    let client: Arc<dyn EsClient> = Arc::new(client);

    let registry = Arc::new(ExpositionRegistry::new());
    let telemetry = Telemetry::new().context("failed to create exporter metrics")?;
    telemetry
        .register(registry.internal())
        .context("failed to register exporter metrics")?;

    let mut scheduler = Scheduler::new().with_telemetry(telemetry.clone());
    let assembly = assemble(&conf, client, Some(telemetry), &mut scheduler)?;
    for source in assembly.pull_sources() {
        registry.register(source)?;
    }

    let scheduler = scheduler.start();

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    let server_opts = conf.server.clone();
    let server_registry = registry.clone();
    let mut server = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.recv().await;
        };
        if let Err(e) = start_metrics_server(server_opts, server_registry, shutdown).await {
            error!(
                event.name = "metrics.server_failed",
                error.message = %e,
                "metrics server exited with an error"
            );
        }
    });

    info!(
        event.name = "system.started",
        collectors = ?registry.keys(),
        jobs = scheduler.job_count(),
        "exporter running"
    );

    tokio::select! {
        result = wait_for_signal() => result?,
        _ = &mut server => {
            warn!(event.name = "system.server_exited", "metrics server stopped unexpectedly");
        }
    }

    info!(event.name = "system.shutdown_started", "shutting down");
    let _ = shutdown_tx.send(());

    match scheduler.shutdown(conf.server.shutdown_timeout).await {
        ShutdownResult::Graceful { jobs_stopped } => info!(
            event.name = "system.shutdown_completed",
            jobs_stopped, "all scheduled jobs stopped"
        ),
        ShutdownResult::ForcedCancellation { jobs_cancelled } => warn!(
            event.name = "system.shutdown_forced",
            jobs_cancelled, "scheduled jobs cancelled after the shutdown timeout"
        ),
    }

    if !server.is_finished() {
        let _ = server.await;
    }

    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn wait_for_signal() -> anyhow::Result<()> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;

    tokio::select! {
        result = signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!(event.name = "system.signal_received", signal = "SIGINT", "received SIGINT");
        }
        _ = sigterm.recv() => {
            info!(event.name = "system.signal_received", signal = "SIGTERM", "received SIGTERM");
        }
    }
    Ok(())
}
