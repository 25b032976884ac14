// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Reqtrail demo server
//
//  axum service with the request logging layer installed.
//  Settings: REQTRAIL_* environment, or built-in demo defaults
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

mod app;

use clap::Parser;
use reqtrail_middleware::{LoggerSettings, RequestLoggerLayer};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "reqtrail-server", version, about = "Reqtrail request logging demo")]
struct Cli {
    /// Where request entries are appended (ignored when REQTRAIL_LOG_FILE is set)
    #[arg(long, default_value = "logs/requests.log")]
    log_file: PathBuf,

    /// Listen address
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: SocketAddr,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Tracing ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Reqtrail demo starting");

    // ── Settings ──
    let settings = if std::env::var_os("REQTRAIL_LOG_FILE").is_some() {
        info!("Loading logger settings from REQTRAIL_* environment");
        LoggerSettings::from_env()?
    } else {
        app::demo_settings(cli.log_file)
    };
    info!(path = %settings.log_file.display(), "Request log");

    // ── App ──
    let layer = RequestLoggerLayer::new(app::logger_config(settings));
    let router = app::router(layer.clone());

    let listener = tokio::net::TcpListener::bind(cli.addr).await?;
    info!(addr = %cli.addr, "Serving");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shutdown signal received, flushing request log...");
    layer.flush().await;

    info!("Reqtrail demo stopped");
    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or, on unix, SIGTERM (docker stop).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
