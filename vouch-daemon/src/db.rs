//! Database pool setup.
//!
//! Wraps SQLite access via sqlx; table creation lives with the store.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Open or create a database at the given path.
pub async fn open_pool(path: impl AsRef<Path>) -> Result<SqlitePool, sqlx::Error> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            sqlx::Error::Configuration(format!("Failed to create db directory: {}", e).into())
        })?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        // WAL mode for better concurrent read performance
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        // NORMAL sync balances durability vs speed
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1) // SQLite performs best with single writer
        .connect_with(options)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::WhitelistStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_database_and_tables() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("vouch.db");

        let pool = open_pool(&db_path).await.unwrap();
        let store = WhitelistStore::new(pool).await.unwrap();

        // Verify tables exist by querying them
        let _: Vec<(i64,)> = sqlx::query_as("SELECT id FROM whitelist")
            .fetch_all(store.pool())
            .await
            .unwrap();
        let _: Vec<(String,)> = sqlx::query_as("SELECT salt FROM rp_nonces")
            .fetch_all(store.pool())
            .await
            .unwrap();
        let _: Vec<(String,)> = sqlx::query_as("SELECT handle FROM rp_associations")
            .fetch_all(store.pool())
            .await
            .unwrap();
    }
}
