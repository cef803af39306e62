use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use tgc_core::{
    config::{Config, TransportKind},
    registry::JobRegistry,
    transport::{
        memory::{MemoryProvider, MemoryTransport},
        paced::PacedProvider,
        TransportProvider,
    },
};
use tgc_gateway::{GatewayClient, GatewayConfig, GatewayProvider};
use tgc_http::AppState;

/// Upper bound on how long a finished job can outlive its retention window.
const SWEEP_PERIOD: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load()?;
    tgc_core::logging::init("tgc", cfg.log_json)?;

    let provider: Arc<dyn TransportProvider> =
        Arc::new(PacedProvider::new(build_provider(&cfg)?, cfg.pacing));
    let registry = JobRegistry::new(provider);

    if let Some(retention) = cfg.job_retention {
        spawn_retention_sweeper(registry.clone(), retention);
    }

    let listener = TcpListener::bind(cfg.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind_addr))?;

    let state = AppState {
        registry: registry.clone(),
        defaults: cfg.clone.clone(),
        default_account: cfg.default_account.clone(),
    };
    tgc_http::serve(listener, state, shutdown_signal())
        .await
        .context("http server failed")?;

    registry.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

fn build_provider(cfg: &Config) -> anyhow::Result<Arc<dyn TransportProvider>> {
    match cfg.transport {
        TransportKind::Gateway => {
            let base_url = cfg
                .gateway_url
                .clone()
                .context("TGC_GATEWAY_URL is required for the gateway transport")?;
            let client = GatewayClient::new(&GatewayConfig {
                base_url,
                token: cfg.gateway_token.clone(),
                timeout: cfg.gateway_timeout,
            })?;
            info!(transport = "gateway", "transport configured");
            Ok(Arc::new(GatewayProvider::new(client)))
        }
        TransportKind::Memory => {
            let transport = match &cfg.memory_seed {
                Some(path) => {
                    let json = std::fs::read_to_string(path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    MemoryTransport::from_seed_json(&json)?
                }
                None => MemoryTransport::new(),
            };
            warn!(transport = "memory", "using in-process channels; nothing reaches Telegram");
            Ok(Arc::new(MemoryProvider::new(Arc::new(transport))))
        }
    }
}

fn spawn_retention_sweeper(registry: JobRegistry, retention: Duration) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SWEEP_PERIOD.min(retention));
        loop {
            tick.tick().await;
            let pruned = registry.prune_finished(retention).await;
            if pruned > 0 {
                info!(pruned, "pruned finished clone jobs");
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
