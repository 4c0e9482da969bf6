mod api;
mod config;
mod error;
mod extractor;
mod health;
mod listing;
mod price_history;
mod resolver;
mod slug;
mod types;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::error::Result;
use crate::health::HealthState;
use crate::listing::{BrowserListingFetcher, ChromeLauncher};
use crate::price_history::PriceHistoryClient;
use crate::resolver::Resolver;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let listing_timeout = Duration::from_millis(cfg.listing_timeout_ms);

    // --- Listing: one headless browser per resolution ---
    let launcher = ChromeLauncher::new(cfg.chrome_executable.clone(), listing_timeout);
    let listing = BrowserListingFetcher::new(launcher, cfg.storefront_search_url.clone(), listing_timeout);
    info!(
        "Listing fetcher ready: {} (timeout {}ms, browser {})",
        cfg.storefront_search_url,
        cfg.listing_timeout_ms,
        cfg.chrome_executable.as_deref().unwrap_or("auto-detect"),
    );

    // --- Price history upstream ---
    let prices = PriceHistoryClient::new(
        cfg.price_history_api_url.clone(),
        Duration::from_secs(cfg.price_history_timeout_secs),
    )?;
    info!(
        "Price history client ready: {} (timeout {}s)",
        cfg.price_history_api_url, cfg.price_history_timeout_secs
    );

    let resolver = Resolver::new(Arc::new(listing), Arc::new(prices), Arc::new(HealthState::new()));

    // --- HTTP API server ---
    let app = router(ApiState {
        resolver: Arc::new(resolver),
    });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
