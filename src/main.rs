use ads_metrics_api::api::{router, AppState};
use ads_metrics_api::config::AppConfig;
use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Serves daily ad metrics for the dashboard.
/// The store only ever holds the latest pull; every view is derived from it on request.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load config ({}), using defaults", e);
        AppConfig::default()
    });

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ads_metrics_api=info,tower_http=info".into());
    if config.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    if let Some(dir) = config.db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            warn!(dir = %dir.display(), "Data directory missing, creating it");
            std::fs::create_dir_all(dir).context("creating data directory")?;
        }
    }

    let state = AppState {
        db_path: config.db_path.clone(),
    };
    let app = router(state);

    let addr = config.socket_addr().context("invalid host/port")?;
    info!(%addr, db_path = %config.db_path.display(), "Server running");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
