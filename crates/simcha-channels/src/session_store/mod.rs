//! SQLite persistence backend for the `whatsapp-rust` session.
//!
//! Implements the library's `Backend` trait family (DeviceStore, SignalStore,
//! ProtocolStore, AppSyncStore) over sqlx. The stock
//! `whatsapp-rust-sqlite-storage` crate pulls in diesel, whose
//! `libsqlite3-sys` pin conflicts with sqlx, so the backend is implemented
//! here directly.

mod app_sync;
mod device;
mod protocol;
mod signal;

use sqlx::{Pool, Sqlite, SqlitePool};
use wacore::store::error::db_err;

type Result<T> = wacore::store::error::Result<T>;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS identities (
        address TEXT PRIMARY KEY,
        key_data BLOB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS signal_sessions (
        address TEXT PRIMARY KEY,
        record BLOB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS prekeys (
        id INTEGER PRIMARY KEY,
        record BLOB NOT NULL,
        uploaded INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS signed_prekeys (
        id INTEGER PRIMARY KEY,
        record BLOB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sender_keys (
        address TEXT PRIMARY KEY,
        record BLOB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sync_keys (
        key_id BLOB PRIMARY KEY,
        key_data BLOB NOT NULL,
        timestamp INTEGER NOT NULL DEFAULT 0,
        fingerprint BLOB
    )",
    "CREATE TABLE IF NOT EXISTS sync_versions (
        collection TEXT PRIMARY KEY,
        data TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS mutation_macs (
        collection TEXT NOT NULL,
        index_mac BLOB NOT NULL,
        version INTEGER NOT NULL,
        value_mac BLOB NOT NULL,
        PRIMARY KEY (collection, index_mac)
    )",
    "CREATE TABLE IF NOT EXISTS skdm_recipients (
        group_jid TEXT NOT NULL,
        device_jid TEXT NOT NULL,
        PRIMARY KEY (group_jid, device_jid)
    )",
    "CREATE TABLE IF NOT EXISTS lid_mappings (
        lid TEXT PRIMARY KEY,
        phone_number TEXT NOT NULL,
        created_at INTEGER NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL DEFAULT 0,
        learning_source TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS base_keys (
        address TEXT NOT NULL,
        message_id TEXT NOT NULL,
        base_key BLOB NOT NULL,
        PRIMARY KEY (address, message_id)
    )",
    "CREATE TABLE IF NOT EXISTS device_lists (
        user TEXT PRIMARY KEY,
        data TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS forget_sender_keys (
        group_jid TEXT NOT NULL,
        participant TEXT NOT NULL,
        PRIMARY KEY (group_jid, participant)
    )",
    "CREATE TABLE IF NOT EXISTS device (
        id INTEGER PRIMARY KEY,
        data BLOB NOT NULL
    )",
];

/// sqlx-backed WhatsApp session store.
pub struct SessionStore {
    pool: Pool<Sqlite>,
}

impl SessionStore {
    /// Open (or create) the session database and ensure the schema exists.
    pub async fn new(db_path: &str) -> std::result::Result<Self, sqlx::Error> {
        let pool = SqlitePool::connect(&format!("sqlite:{db_path}?mode=rwc")).await?;
        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Fetch a single blob column by a text key.
    async fn blob_by_text(&self, sql: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as(sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(|(d,)| d))
    }

    /// Fetch a single blob column by an integer key.
    async fn blob_by_id(&self, sql: &str, id: i64) -> Result<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(|(d,)| d))
    }

    /// Run a statement bound to one text key (deletes and the like).
    async fn exec_by_text(&self, sql: &str, key: &str) -> Result<()> {
        sqlx::query(sql)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Upsert a text-keyed blob row.
    async fn put_blob_by_text(&self, sql: &str, key: &str, data: &[u8]) -> Result<()> {
        sqlx::query(sql)
            .bind(key)
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
