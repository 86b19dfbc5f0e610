use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod codegen;
mod config;
mod console;
mod error;
mod handlers;
mod listener;
mod models;
mod normalize;
mod persistence;
mod shortener;
mod store;

use codegen::CodeGenerator;
use shortener::Shortener;

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (ignore error if file is absent; env vars may already be set)
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linkdrop=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = config::AppConfig::from_env()?;
    tracing::info!("Starting linkdrop on {}:{}", config.host, config.port);
    tracing::info!("Link table: {}", config.data_file.display());

    let shortener = Shortener::new(&config, CodeGenerator::from_entropy());

    // A damaged or unreadable table is not fatal: start empty instead.
    if let Err(e) = shortener.load() {
        tracing::error!("Failed to load link table: {}", e);
    }

    // Without a listener the console still works; links just don't resolve.
    match shortener.start().await {
        Ok(_) => tracing::info!("Short links served at {}/{{code}}", shortener.base_url()),
        Err(e) => tracing::error!("Redirect listener unavailable: {}", e),
    }

    // ── Control loop ───────────────────────────────────────────────────────
    let lines = console::spawn_stdin_reader();
    tokio::select! {
        _ = console::run(&shortener, lines) => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupt received"),
    }

    // ── Shutdown: stop serving, then persist once ──────────────────────────
    if let Err(e) = shortener.shutdown().await {
        tracing::error!("Failed to save link table: {}", e);
    }

    Ok(())
}
