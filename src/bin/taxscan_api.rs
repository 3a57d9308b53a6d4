//! taxscan HTTP API server
//!
//! Usage:
//!   cargo run --bin taxscan_api
//!
//! Environment:
//!   PORT / TAXSCAN_PORT - Server port (default: 8080)
//!   TAXSCAN_HOST        - Server host (default: 0.0.0.0)
//!   TAXSCAN_API_KEYS    - Comma-separated accepted API keys (unset: open)
//!   RUST_LOG            - Log filter (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use taxscan::api::{create_router, start_cleanup_task, AppState};
use taxscan::utils::constants::{DEFAULT_API_HOST, DEFAULT_API_PORT, ENV_API_HOST, ENV_API_PORT};
use taxscan::{ScannerConfig, TaxScanner};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let config = ScannerConfig::default();
    if config.api_keys.is_empty() {
        warn!("⚠️ TAXSCAN_API_KEYS not set - API is open to anonymous clients");
    }
    let scanner = TaxScanner::from_config(config)?;
    info!("🤖 Model {} loaded", scanner.model().version);

    let state = Arc::new(AppState::new(scanner));
    let telemetry = state.scanner.telemetry();

    start_cleanup_task(state.clone());
    info!("🧹 Background cleanup task started");

    let app = create_router(state);

    let host = std::env::var(ENV_API_HOST).unwrap_or_else(|_| DEFAULT_API_HOST.to_string());
    let port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var(ENV_API_PORT))
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_API_PORT);
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    info!("🚀 taxscan API starting on http://{}", addr);
    info!("Endpoints:");
    info!("  POST /v1/scan/source    - Scan Solidity source");
    info!("  POST /v1/scan/bytecode  - Scan runtime bytecode");
    info!("  POST /v1/scan/address   - Fetch and scan a deployed contract");
    info!("  POST /v1/scan/batch     - Batch source scan (up to 100 items)");
    info!("  GET  /v1/checklist      - Audit checklist");
    info!("  GET  /v1/stats          - Scan statistics");
    info!("  GET  /v1/health         - Health check");

    let listener = TcpListener::bind(addr).await?;

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("⚠️ Failed to listen for Ctrl+C: {}", e);
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("🛑 Shutdown signal received, exporting telemetry...");
    let stats = telemetry.get_stats();
    info!("   Total scans: {}", stats.total_scans);
    info!("   Tax abuse candidates: {}", stats.tax_abuse_candidates);

    if let Err(e) = telemetry.flush() {
        warn!("   ⚠️ Failed to flush events: {}", e);
    }
    match telemetry.export_stats_json() {
        Ok(path) => info!("   ✅ Stats exported to: {}", path.display()),
        Err(e) => warn!("   ⚠️ Failed to export stats: {}", e),
    }

    info!("👋 taxscan API shutdown complete");
    Ok(())
}
