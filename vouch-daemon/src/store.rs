//! Persistent allow-list storage with SQLite.
//!
//! All check-then-act sequences are expressed as single SQL statements so
//! concurrent requests cannot observe partial state; the bootstrap insert
//! in particular is first-writer-wins.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{Row, SqlitePool};
use vouch_core::{DirectoryError, IssuerDirectory, WhitelistEntry};
use vouch_verify::state::{
    nonce_horizon, AssociationRecord, RelyingPartyState, ResponseNonce, StateError,
};

/// Identifier of a persisted whitelist entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(pub i64);

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

/// Persistent storage for whitelist entries and relying-party bookkeeping.
#[derive(Clone)]
pub struct WhitelistStore {
    pool: SqlitePool,
}

impl WhitelistStore {
    /// Create a new store with the given database pool.
    ///
    /// Creates tables if they don't exist.
    pub async fn new(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS whitelist (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                issuer TEXT NOT NULL,
                target TEXT NOT NULL,
                note TEXT,
                no_further INTEGER NOT NULL DEFAULT 0,
                temporary INTEGER NOT NULL DEFAULT 0,
                expire INTEGER,
                created_at INTEGER,
                modified_at INTEGER
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_whitelist_target ON whitelist(target)")
            .execute(&pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rp_nonces (
                server_url TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                salt TEXT NOT NULL,
                PRIMARY KEY (server_url, timestamp, salt)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rp_associations (
                server_url TEXT NOT NULL,
                handle TEXT NOT NULL,
                secret BLOB NOT NULL,
                assoc_type TEXT NOT NULL,
                issued INTEGER NOT NULL,
                lifetime INTEGER NOT NULL,
                PRIMARY KEY (server_url, handle)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Append a new whitelist entry.
    pub async fn insert(&self, entry: &WhitelistEntry) -> Result<EntryId, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO whitelist
                (issuer, target, note, no_further, temporary, expire, created_at, modified_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&entry.issuer)
        .bind(&entry.target)
        .bind(&entry.note)
        .bind(entry.no_further)
        .bind(entry.temporary)
        .bind(entry.expire.map(|t| t.timestamp()))
        .bind(entry.created_at.map(|t| t.timestamp()))
        .bind(entry.modified_at.map(|t| t.timestamp()))
        .execute(&self.pool)
        .await?;

        Ok(EntryId(result.last_insert_rowid()))
    }

    /// Append the bootstrap entry, but only while the table is still empty.
    ///
    /// The emptiness check and the insert are one statement, so two racing
    /// bootstrap attempts cannot both succeed. Returns `None` for the loser
    /// of the race.
    pub async fn insert_bootstrap(
        &self,
        entry: &WhitelistEntry,
    ) -> Result<Option<EntryId>, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO whitelist
                (issuer, target, note, no_further, temporary, expire, created_at, modified_at)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8
            WHERE NOT EXISTS (SELECT 1 FROM whitelist)
            "#,
        )
        .bind(&entry.issuer)
        .bind(&entry.target)
        .bind(&entry.note)
        .bind(entry.no_further)
        .bind(entry.temporary)
        .bind(entry.expire.map(|t| t.timestamp()))
        .bind(entry.created_at.map(|t| t.timestamp()))
        .bind(entry.modified_at.map(|t| t.timestamp()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(EntryId(result.last_insert_rowid())))
    }

    /// Whether any entry with `target == identity` may vouch at `now`:
    /// active and non-terminal. Existence only.
    pub async fn find_eligible_issuer(
        &self,
        identity: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM whitelist
            WHERE target = ?1
              AND no_further = 0
              AND (temporary = 0 OR (expire IS NOT NULL AND expire > ?2))
            LIMIT 1
            "#,
        )
        .bind(identity)
        .bind(now.timestamp())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Whether any entry with `target == identity` is active at `now`.
    /// Terminal entries still count; `no_further` only restricts the
    /// issuer role.
    pub async fn find_active_target(
        &self,
        identity: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM whitelist
            WHERE target = ?1
              AND (temporary = 0 OR (expire IS NOT NULL AND expire > ?2))
            LIMIT 1
            "#,
        )
        .bind(identity)
        .bind(now.timestamp())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Whether the allow-list holds zero entries.
    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM whitelist LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_none())
    }

    /// Number of entries currently stored.
    pub async fn count(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM whitelist")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Delete all temporary entries whose expiry has passed. Returns the
    /// number of rows removed; idempotent.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM whitelist WHERE temporary = 1 AND expire IS NOT NULL AND expire <= ?1",
        )
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Load an entry by id.
    pub async fn get(&self, id: EntryId) -> Result<Option<WhitelistEntry>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT issuer, target, note, no_further, temporary, expire, created_at, modified_at
            FROM whitelist WHERE id = ?1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| parse_entry_row(&r)))
    }
}

fn timestamp_from_secs(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

fn parse_entry_row(row: &sqlx::sqlite::SqliteRow) -> WhitelistEntry {
    WhitelistEntry {
        issuer: row.get("issuer"),
        target: row.get("target"),
        note: row.get("note"),
        no_further: row.get("no_further"),
        temporary: row.get("temporary"),
        expire: row
            .get::<Option<i64>, _>("expire")
            .map(timestamp_from_secs),
        created_at: row
            .get::<Option<i64>, _>("created_at")
            .map(timestamp_from_secs),
        modified_at: row
            .get::<Option<i64>, _>("modified_at")
            .map(timestamp_from_secs),
    }
}

#[async_trait]
impl IssuerDirectory for WhitelistStore {
    async fn is_empty(&self) -> Result<bool, DirectoryError> {
        WhitelistStore::is_empty(self)
            .await
            .map_err(|e| DirectoryError(e.to_string()))
    }

    async fn eligible_issuer_exists(
        &self,
        identity: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DirectoryError> {
        self.find_eligible_issuer(identity, now)
            .await
            .map_err(|e| DirectoryError(e.to_string()))
    }
}

#[async_trait]
impl RelyingPartyState for WhitelistStore {
    async fn use_nonce(&self, nonce: &ResponseNonce) -> Result<bool, StateError> {
        if !nonce.is_fresh(Utc::now()) {
            return Ok(false);
        }

        // INSERT OR IGNORE doubles as the seen-check: zero affected rows
        // means the triple already exists.
        let result = sqlx::query(
            "INSERT OR IGNORE INTO rp_nonces (server_url, timestamp, salt) VALUES (?1, ?2, ?3)",
        )
        .bind(&nonce.server_url)
        .bind(nonce.timestamp.timestamp())
        .bind(&nonce.salt)
        .execute(&self.pool)
        .await
        .map_err(|e| StateError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn save_association(&self, assoc: &AssociationRecord) -> Result<(), StateError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO rp_associations
                (server_url, handle, secret, assoc_type, issued, lifetime)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&assoc.server_url)
        .bind(&assoc.handle)
        .bind(&assoc.secret)
        .bind(&assoc.assoc_type)
        .bind(assoc.issued.timestamp())
        .bind(assoc.lifetime_secs)
        .execute(&self.pool)
        .await
        .map_err(|e| StateError(e.to_string()))?;

        Ok(())
    }

    async fn invalidate_association(
        &self,
        server_url: &str,
        handle: &str,
    ) -> Result<(), StateError> {
        sqlx::query("DELETE FROM rp_associations WHERE server_url = ?1 AND handle = ?2")
            .bind(server_url)
            .bind(handle)
            .execute(&self.pool)
            .await
            .map_err(|e| StateError(e.to_string()))?;

        Ok(())
    }

    async fn cleanup(&self, now: DateTime<Utc>) -> Result<u64, StateError> {
        let nonces = sqlx::query("DELETE FROM rp_nonces WHERE timestamp <= ?1")
            .bind(nonce_horizon(now).timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| StateError(e.to_string()))?;

        let associations =
            sqlx::query("DELETE FROM rp_associations WHERE issued + lifetime <= ?1")
                .bind(now.timestamp())
                .execute(&self.pool)
                .await
                .map_err(|e| StateError(e.to_string()))?;

        Ok(nonces.rows_affected() + associations.rows_affected())
    }
}
