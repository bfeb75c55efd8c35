//! Daemon lifecycle: startup, run, shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use auklet_autoscale::Reconciler;
use auklet_metrics::AutoscaleMetrics;
use auklet_prometheus::PrometheusClient;
use auklet_swarm::DockerClient;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::server::build_router;
use crate::settings::Settings;

/// Run until a shutdown signal arrives or the event stream fails.
///
/// Returns an error for startup failures and for a failed event stream.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?settings.config_path,
        "auklet starting"
    );

    let docker = DockerClient::new(&settings.docker_host)
        .with_context(|| format!("invalid docker host {}", settings.docker_host))?;
    docker
        .ping()
        .await
        .with_context(|| format!("docker is not reachable at {}", settings.docker_host))?;
    info!(host = %docker.host(), "connected to docker");

    let prometheus = PrometheusClient::new(&settings.prometheus_url)
        .with_context(|| format!("invalid Prometheus URL {}", settings.prometheus_url))?;
    info!(endpoint = %prometheus.endpoint(), "using prometheus");

    let metrics = Arc::new(AutoscaleMetrics::new());
    let root = CancellationToken::new();
    let reconciler = Arc::new(Reconciler::new(
        Arc::new(docker),
        Arc::new(prometheus),
        metrics.clone(),
        root.clone(),
    ));

    // ── HTTP server ────────────────────────────────────────────

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.listen));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("can't listen on {addr}"))?;
    info!(%addr, "metrics server listening");

    let server_shutdown = root.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, build_router(metrics))
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });

    // ── Reconciler ─────────────────────────────────────────────

    let mut reconcile = {
        let reconciler = reconciler.clone();
        tokio::spawn(async move { reconciler.run().await })
    };

    let finished = tokio::select! {
        _ = shutdown_signal() => None,
        joined = &mut reconcile => Some(joined),
    };

    let result = match finished {
        None => {
            info!("shutdown signal received");
            Ok(())
        }
        Some(Ok(Ok(()))) => Ok(()),
        Some(Ok(Err(e))) => {
            error!(error = %e, "reconciler stopped");
            Err(anyhow::Error::new(e))
        }
        Some(Err(e)) => Err(anyhow::anyhow!("reconciler task failed: {e}")),
    };

    // ── Shutdown ───────────────────────────────────────────────

    reconciler.shutdown(settings.shutdown_grace).await;
    if !reconcile.is_finished() {
        reconcile.abort();
    }

    match tokio::time::timeout(settings.shutdown_grace, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!(error = %e, "metrics server error"),
        Ok(Err(e)) => warn!(error = %e, "metrics server task failed"),
        Err(_) => warn!("metrics server did not stop in time"),
    }

    info!("auklet stopped");
    result
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "can't listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "can't listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
