use anyhow::Result;
use devmon_alert::cache::RuleCache;
use devmon_alert::watchdog::StaleDeviceWatchdog;
use devmon_server::state::AppState;
use devmon_server::{app, config, seed};
use devmon_storage::store::SqliteStore;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  devmon-server [config.toml]                           Start the server");
    eprintln!("  devmon-server init-rules <config.toml> <seed.json>    Load devices and notification rules from a seed file");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("devmon=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("init-rules") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-rules requires <config.toml> and <seed.json> arguments")
            })?;
            let seed_path = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-rules requires <seed.json> argument")
            })?;
            run_init_rules(config_path, seed_path)
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

fn run_init_rules(config_path: &str, seed_path: &str) -> Result<()> {
    let config = config::ServerConfig::load(config_path)?;
    let store = Arc::new(SqliteStore::open(Path::new(&config.database_path))?);
    let cache = RuleCache::new(store.clone(), store.clone());
    cache.reload();

    let seed_file = seed::read_seed_file(Path::new(seed_path))?;
    let summary = seed::apply_seed(&store, &cache, seed_file)?;

    tracing::info!(
        devices = summary.devices,
        created = summary.created,
        skipped = summary.skipped,
        "init-rules completed"
    );
    Ok(())
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = config::ServerConfig::load(config_path)?;

    tracing::info!(
        http_port = config.http_port,
        db = %config.database_path,
        channels = config.channels.len(),
        admin_api = config.auth.admin_token.is_some(),
        "devmon-server starting"
    );
    if config.auth.admin_token.is_none() {
        tracing::warn!("No [auth].admin_token configured. Rule and device management endpoints are disabled.");
    }

    let http_port = config.http_port;
    let watchdog_tick_secs = config.alert.watchdog_tick_secs;
    let state = AppState::new(config)?;

    match state.store.list_devices() {
        Ok(devices) => tracing::info!(
            devices = devices.len(),
            rules = state.cache.all_rules().len(),
            "Device registry loaded"
        ),
        Err(e) => tracing::error!(error = %e, "Failed to list devices"),
    }

    let watchdog = StaleDeviceWatchdog::new(state.engine.clone(), state.start_time, watchdog_tick_secs);
    let watchdog_handle = tokio::spawn(async move {
        watchdog.run().await;
    });

    let http_addr: SocketAddr = format!("0.0.0.0:{http_port}").parse()?;
    let app = app::build_http_app(state);
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
    let http_server = axum::serve(
        http_listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    tracing::info!(%http_addr, "HTTP server listening");

    tokio::select! {
        result = http_server.with_graceful_shutdown(shutdown_signal()) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    watchdog_handle.abort();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
