//! vouchd - trust-chained identity allow-list daemon.
//!
//! Serves the registration and lookup HTTP API, delegating identity
//! verification to the external single-sign-on protocol and persisting the
//! allow-list in SQLite.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use vouch_verify::state::RelyingPartyState;

use vouch_daemon::api::{create_router, AppState};
use vouch_daemon::config::Config;
use vouch_daemon::db;
use vouch_daemon::limiter::RegistrationRateLimiter;
use vouch_daemon::rp::RelyingPartyVerifier;
use vouch_daemon::service::RegistrationService;
use vouch_daemon::stash::RegistrationStash;
use vouch_daemon::store::WhitelistStore;

/// vouchd - identity allow-list service
#[derive(Parser)]
#[command(name = "vouchd", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service (default if no command given)
    Serve,

    /// Delete expired whitelist entries and stale protocol state, then exit
    Sweep,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Sweep) => cmd_sweep().await,
        Some(Commands::Serve) | None => cmd_serve().await,
    }
}

/// Run the expiry sweep once and report what was removed.
async fn cmd_sweep() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    let pool = db::open_pool(&config.db_path).await?;
    let store = WhitelistStore::new(pool).await?;

    let now = chrono::Utc::now();
    let entries = store.sweep_expired(now).await?;
    let state_rows = store.cleanup(now).await?;

    println!("Removed {entries} expired whitelist entries.");
    println!("Removed {state_rows} stale relying-party records.");
    Ok(())
}

/// Start the daemon server.
async fn cmd_serve() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let pool = db::open_pool(&config.db_path).await?;
    let store = Arc::new(WhitelistStore::new(pool).await?);

    let stash = Arc::new(RegistrationStash::new());
    let rp_state: Arc<dyn RelyingPartyState> = store.clone();
    let verifier = Arc::new(RelyingPartyVerifier::new(rp_state, config.trust_root.clone()));

    let service = Arc::new(RegistrationService::new(
        store,
        stash,
        verifier,
        RegistrationRateLimiter::default(),
        config.public_base_url.clone(),
    ));

    let app = create_router(AppState::new(service));

    let listener = TcpListener::bind(config.listen_addr).await?;
    tracing::info!(
        addr = %config.listen_addr,
        public_url = %config.public_base_url,
        "vouchd listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
