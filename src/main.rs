use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use schedauth::api::routes::{create_router, AppState};
use schedauth::config::Config;
use schedauth::observability::metrics::install_prometheus_recorder;
use schedauth::observability::{init_tracing, PrometheusSink};
use schedauth::orchestrator::{EngineContext, Orchestrator};
use schedauth::policy::PolicyLoader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration
    let config = Config::parse();

    // Initialize tracing
    init_tracing(&config.log_level, config.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting schedauth decision engine"
    );

    let metrics_handle = install_prometheus_recorder()?;

    // Load engine configuration once; fall back to the built-in table on failure
    let loaded = PolicyLoader::new(&config.engine_config).load_or_fallback();
    let from_file = loaded.is_from_file();
    if !from_file {
        warn!("Serving with fallback configuration; readiness will report degraded");
    }

    let context = Arc::new(
        EngineContext::new(loaded.policy, Arc::new(PrometheusSink)).with_source(from_file),
    );

    let sweeper = config
        .cache_sweep_interval()
        .map(|every| spawn_cache_sweeper(Arc::clone(&context), every));

    let orchestrator = Orchestrator::new(Arc::clone(&context));
    let state = Arc::new(
        AppState::new(orchestrator)
            .with_metrics(metrics_handle)
            .with_latency_budget(config.latency_budget_ms),
    );

    let app = create_router(state);

    let addr: SocketAddr = config.listen_addr.parse()?;
    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    if config.graceful_shutdown {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        axum::serve(listener, app).await?;
    }

    info!("Shutting down...");
    if let Some(handle) = sweeper {
        handle.abort();
    }

    let pending = context.background.in_flight();
    if pending > 0 {
        info!(pending, "Waiting for background tool calls");
        if tokio::time::timeout(config.shutdown_timeout(), context.background.wait_idle())
            .await
            .is_err()
        {
            warn!(
                pending = context.background.in_flight(),
                "Background tasks still running at shutdown timeout"
            );
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Periodically purge expired decision cache entries.
fn spawn_cache_sweeper(context: Arc<EngineContext>, every: Duration) -> JoinHandle<()> {
    info!(interval_secs = every.as_secs(), "Cache sweep enabled");

    tokio::spawn(async move {
        let mut ticker = interval(every);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let purged = context.cache.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = context.cache.len(), "Purged expired cache entries");
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
