use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tracing::{info, warn};

use transfer_domain::api::{RateLimitConfig, create_router_with_rate_limit};
use transfer_domain::app::{AppState, TransferDomainService};
use transfer_domain::config::AppConfig;
use transfer_domain::infra::{init_metrics_handle, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = AppConfig::from_env().context("invalid configuration")?;
    init_tracing("info", config.log_format).context("failed to install tracing subscriber")?;

    let node = Arc::new(
        config
            .defid_client()
            .context("failed to create defid client")?,
    );
    let service = TransferDomainService::new(
        node.clone(),
        node.clone(),
        node.clone(),
        node,
        config.service_settings(),
    );

    let mut app_state = AppState::new(Arc::new(service));
    match init_metrics_handle() {
        Some(handle) => app_state = app_state.with_metrics(handle),
        None => warn!("Prometheus recorder unavailable, /metrics disabled"),
    }
    match &config.api_auth_key {
        Some(key) => app_state = app_state.with_api_key(key.clone()),
        None => warn!("API_AUTH_KEY not set, POST routes are unauthenticated"),
    }

    let router = create_router_with_rate_limit(
        Arc::new(app_state),
        RateLimitConfig::new(config.rate_limit_rps, config.rate_limit_burst),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(
        addr = %config.bind_addr,
        network = %config.network,
        node = %config.defid_rpc_url,
        "Server starting"
    );

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
