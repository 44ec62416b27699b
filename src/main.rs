use kanari::app::Context;
use kanari::config::Config;
use kanari::gateway::KubeGateway;
use kanari::server::{
    build_router, create_metrics, run_server, shutdown_channel, wait_for_signal, ReadinessState,
};
use kube::Client;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting kanari canary control plane");

    let config = Config::from_env();
    info!(
        namespace = %config.namespace,
        port = config.port,
        settle_delay_ms = config.timing.settle_delay.as_millis() as u64,
        converge_timeout_ms = config.timing.converge_timeout.as_millis() as u64,
        "Configuration loaded"
    );

    // Create shutdown channel for coordinated shutdown
    let (shutdown_controller, shutdown_signal) = shutdown_channel();

    // Create readiness state (initially not ready)
    let readiness = ReadinessState::new();

    let metrics = create_metrics()?;
    info!("Prometheus metrics registry initialized");

    let client = match Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to create Kubernetes client");
            return Err(e.into());
        }
    };
    info!("Connected to Kubernetes cluster");

    let gateway = KubeGateway::new(client, &config.namespace);
    info!(namespace = %gateway.namespace(), "Cluster gateway scoped to namespace");
    let ctx = Arc::new(Context::new(gateway, config.timing.clone()));

    let router = build_router(
        ctx,
        readiness.clone(),
        metrics,
        shutdown_signal.clone(),
    );
    let mut server_handle = tokio::spawn(run_server(config.port, router, shutdown_signal));

    readiness.set_ready();
    info!("kanari ready");

    // Run until a termination signal, or until the server dies on its own
    tokio::select! {
        signal = wait_for_signal() => match signal {
            Ok(name) => info!(signal = name, "Initiating graceful shutdown"),
            Err(e) => error!(error = %e, "Cannot listen for termination signals, shutting down"),
        },
        result = &mut server_handle => {
            readiness.set_not_ready();
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!(error = %e, "HTTP server failed");
                    Err(e.into())
                }
                Err(e) => {
                    error!(error = %e, "HTTP server task panicked");
                    Err(e.into())
                }
            };
        }
    }

    // Mark not ready so K8s stops sending traffic during shutdown
    readiness.set_not_ready();
    shutdown_controller.shutdown();

    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "HTTP server failed during shutdown"),
        Err(e) => warn!(error = %e, "HTTP server task panicked"),
    }

    info!("kanari shut down gracefully");
    Ok(())
}
