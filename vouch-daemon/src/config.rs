//! Runtime configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Daemon configuration, loaded from the environment.
///
/// Variables:
/// - `VOUCH_LISTEN_ADDR` - socket address to bind (default `127.0.0.1:8380`)
/// - `VOUCH_DB_PATH` - SQLite database path (default under the local data dir)
/// - `VOUCH_PUBLIC_URL` - absolute base URL clients reach this service at;
///   used to build the protocol `return_to` and to validate callbacks
/// - `VOUCH_TRUST_ROOT` - realm presented to the provider (default: the
///   public URL)
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub db_path: PathBuf,
    pub public_base_url: String,
    pub trust_root: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid VOUCH_LISTEN_ADDR: {0}")]
    InvalidListenAddr(String),
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults suitable for a local deployment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_raw =
            std::env::var("VOUCH_LISTEN_ADDR").unwrap_or_else(|_| "127.0.0.1:8380".to_string());
        let listen_addr: SocketAddr = listen_raw
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddr(listen_raw))?;

        let db_path = std::env::var("VOUCH_DB_PATH").map(PathBuf::from).unwrap_or_else(|_| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("vouch")
                .join("vouch.db")
        });

        let public_base_url = std::env::var("VOUCH_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{listen_addr}"))
            .trim_end_matches('/')
            .to_string();

        let trust_root =
            std::env::var("VOUCH_TRUST_ROOT").unwrap_or_else(|_| format!("{public_base_url}/"));

        Ok(Self {
            listen_addr,
            db_path,
            public_base_url,
            trust_root,
        })
    }
}
