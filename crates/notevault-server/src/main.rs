//! notevault-server: relay for end-to-end-encrypted collaborative notes.
//!
//! Stores one opaque encrypted blob per vault hash and pushes
//! "updated"/"users" events to whoever is watching that hash. Plaintext
//! never reaches this process.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use notevault_core::{PresenceHub, SyncCoordinator, VaultStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

use notevault_server::{app, AppState};

#[derive(Parser, Debug)]
#[command(name = "notevault-server")]
#[command(about = "Relay server for end-to-end-encrypted collaborative notes")]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:3000", env = "NOTEVAULT_LISTEN")]
    listen: String,

    /// Path to the vault database
    #[arg(short, long, default_value = "notevault.db", env = "NOTEVAULT_DB")]
    db: PathBuf,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Respects RUST_LOG, defaults to info (or debug with --verbose).
    let default_filter = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting notevault-server");
    info!("Database path: {:?}", args.db);

    let store = Arc::new(VaultStore::open(&args.db)?);
    let hub = Arc::new(PresenceHub::new());
    let state = Arc::new(AppState {
        coordinator: SyncCoordinator::new(store, hub),
    });

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    info!("Listening on {}", args.listen);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
