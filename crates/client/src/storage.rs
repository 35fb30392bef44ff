//! Persisted session keys.
//!
//! Three keys survive restarts: the session token, the principal it resolved
//! to, and the active tenant. Values are JSON. Storage failures are logged and
//! swallowed by the helpers at the bottom; the stores never fail because the
//! disk did.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistedKey {
    SessionToken,
    CachedPrincipal,
    ActiveTenant,
}

impl PersistedKey {
    pub const ALL: [PersistedKey; 3] = [
        PersistedKey::SessionToken,
        PersistedKey::CachedPrincipal,
        PersistedKey::ActiveTenant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PersistedKey::SessionToken => "session_token",
            PersistedKey::CachedPrincipal => "cached_principal",
            PersistedKey::ActiveTenant => "active_tenant",
        }
    }
}

/// Key/value storage that outlives the process.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, key: PersistedKey) -> anyhow::Result<Option<String>>;

    async fn set(&self, key: PersistedKey, value: String) -> anyhow::Result<()>;

    /// Remove every key in `keys` as one operation.
    async fn remove(&self, keys: &[PersistedKey]) -> anyhow::Result<()>;
}

#[async_trait]
impl<S> LocalStore for Arc<S>
where
    S: LocalStore + ?Sized,
{
    async fn get(&self, key: PersistedKey) -> anyhow::Result<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: PersistedKey, value: String) -> anyhow::Result<()> {
        (**self).set(key, value).await
    }

    async fn remove(&self, keys: &[PersistedKey]) -> anyhow::Result<()> {
        (**self).remove(keys).await
    }
}

/// Process-local store for tests and `WHOLESALE_STORAGE=memory`.
#[derive(Debug, Default)]
pub struct InMemoryLocalStore {
    values: RwLock<HashMap<PersistedKey, String>>,
}

impl InMemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: PersistedKey) -> bool {
        self.values
            .read()
            .map(|values| values.contains_key(&key))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().map(|v| v.is_empty()).unwrap_or(true)
    }
}

#[async_trait]
impl LocalStore for InMemoryLocalStore {
    async fn get(&self, key: PersistedKey) -> anyhow::Result<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|_| anyhow::anyhow!("local store lock poisoned"))?;
        Ok(values.get(&key).cloned())
    }

    async fn set(&self, key: PersistedKey, value: String) -> anyhow::Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| anyhow::anyhow!("local store lock poisoned"))?;
        values.insert(key, value);
        Ok(())
    }

    async fn remove(&self, keys: &[PersistedKey]) -> anyhow::Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| anyhow::anyhow!("local store lock poisoned"))?;
        for key in keys {
            values.remove(key);
        }
        Ok(())
    }
}

/// SQLite-backed store. One `kv` table; the pool is opened on first use.
#[derive(Debug, Clone)]
pub struct SqliteLocalStore {
    location: Location,
    pool: Arc<Mutex<Option<SqlitePool>>>,
}

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

impl SqliteLocalStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_location(Location::File(path.into()))
    }

    /// Store in the OS data directory (`<data_dir>/wholesale/session.db`).
    pub fn open_default() -> anyhow::Result<Self> {
        let path = default_db_path()
            .context("failed to determine data directory for the session database")?;
        Ok(Self::open(path))
    }

    /// Private in-memory database, gone when the store is dropped.
    pub fn in_memory() -> Self {
        Self::with_location(Location::Memory)
    }

    fn with_location(location: Location) -> Self {
        Self {
            location,
            pool: Arc::new(Mutex::new(None)),
        }
    }

    async fn pool(&self) -> anyhow::Result<SqlitePool> {
        let mut guard = self.pool.lock().await;
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }

        let (options, label) = match &self.location {
            Location::File(path) => {
                ensure_parent_dir(path)?;
                let options = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true);
                (options, path.display().to_string())
            }
            Location::Memory => {
                let options = SqliteConnectOptions::from_str("sqlite::memory:")
                    .context("failed to build in-memory sqlite options")?;
                (options, ":memory:".to_string())
            }
        };

        // A single long-lived connection keeps an in-memory database alive
        // and serializes writers for the file case.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open session database at {label}"))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key        TEXT PRIMARY KEY NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create kv table")?;

        tracing::debug!(db = %label, "session database opened");
        *guard = Some(pool.clone());
        Ok(pool)
    }
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn get(&self, key: PersistedKey) -> anyhow::Result<Option<String>> {
        let pool = self.pool().await?;
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?1")
            .bind(key.as_str())
            .fetch_optional(&pool)
            .await
            .with_context(|| format!("failed to read {}", key.as_str()))?;
        match row {
            Some(row) => Ok(Some(row.try_get::<String, _>("value")?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: PersistedKey, value: String) -> anyhow::Result<()> {
        let pool = self.pool().await?;
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key.as_str())
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .with_context(|| format!("failed to write {}", key.as_str()))?;
        Ok(())
    }

    async fn remove(&self, keys: &[PersistedKey]) -> anyhow::Result<()> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await.context("failed to begin transaction")?;
        for key in keys {
            sqlx::query("DELETE FROM kv WHERE key = ?1")
                .bind(key.as_str())
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to remove {}", key.as_str()))?;
        }
        tx.commit().await.context("failed to commit key removal")?;
        Ok(())
    }
}

/// `<data_dir>/wholesale/session.db`, if the platform has a data directory.
pub fn default_db_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("wholesale").join("session.db"))
}

fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    store: &dyn LocalStore,
    key: PersistedKey,
) -> Option<T> {
    let raw = match store.get(key).await {
        Ok(raw) => raw?,
        Err(err) => {
            tracing::error!(key = key.as_str(), "failed to read persisted key: {err:?}");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(key = key.as_str(), error = %err, "ignoring unreadable persisted value");
            None
        }
    }
}

pub(crate) async fn write_json<T: Serialize>(store: &dyn LocalStore, key: PersistedKey, value: &T) {
    let raw = match serde_json::to_string(value) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::error!(key = key.as_str(), "failed to encode persisted value: {err:?}");
            return;
        }
    };
    if let Err(err) = store.set(key, raw).await {
        tracing::error!(key = key.as_str(), "failed to persist key: {err:?}");
    }
}

pub(crate) async fn remove_keys(store: &dyn LocalStore, keys: &[PersistedKey]) {
    if let Err(err) = store.remove(keys).await {
        tracing::error!(?keys, "failed to remove persisted keys: {err:?}");
    }
}
