use anyhow::{Context, Result};
use edumood_core::Session;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod web;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edumoodd starting");

    let config = config::Config::load().context("failed to load configuration")?;
    tracing::info!(
        bind = %config.bind_addr,
        model_dir = %config.model_dir.display(),
        every = config.analyze_every_n,
        timeout_ms = config.analysis_timeout.as_millis() as u64,
        "configuration loaded"
    );

    let engine = engine::spawn_engine(&config.model_dir, config.font_path.as_deref())
        .context("failed to start inference engine")?;

    let session = Arc::new(Session::new());
    tracing::info!(session = %session.info().id, "session started");

    // Held for the lifetime of the daemon; dropping it unregisters the name.
    let _dbus = if config.dbus_enabled {
        register_dbus(Arc::clone(&session), config.analyze_every_n).await
    } else {
        tracing::info!("D-Bus interface disabled");
        None
    };

    let state = web::AppState {
        session,
        engine,
        analyze_every_n: config.analyze_every_n,
        jpeg_quality: config.jpeg_quality,
        analysis_timeout: config.analysis_timeout,
        report_refresh_ms: config.report_refresh_ms,
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "edumoodd ready, dashboard listening");

    axum::serve(listener, web::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("edumoodd shutting down");
    Ok(())
}

/// Claim the bus name and export the monitor object. Failure is not fatal.
async fn register_dbus(session: Arc<Session>, analyze_every_n: u32) -> Option<zbus::Connection> {
    let service = dbus_interface::MonitorService::new(session, analyze_every_n);
    match serve_dbus(service).await {
        Ok(conn) => {
            tracing::info!(name = dbus_interface::BUS_NAME, "D-Bus interface registered");
            Some(conn)
        }
        Err(e) => {
            tracing::warn!(error = %e, "D-Bus registration failed, continuing with web dashboard only");
            None
        }
    }
}

async fn serve_dbus(service: dbus_interface::MonitorService) -> zbus::Result<zbus::Connection> {
    zbus::connection::Builder::session()?
        .name(dbus_interface::BUS_NAME)?
        .serve_at(dbus_interface::OBJECT_PATH, service)?
        .build()
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
