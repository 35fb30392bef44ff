//! Client configuration from the environment.
//!
//! Backend variables are documented on `BackendConfig`. Storage:
//! - `WHOLESALE_STORAGE`: `sqlite` (default) or `memory`.
//! - `WHOLESALE_DB_PATH`: SQLite file; defaults to `<data_dir>/wholesale/session.db`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use wholesale_infra::{BackendConfig, ConfigError};

use crate::storage::{InMemoryLocalStore, LocalStore, SqliteLocalStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Memory,
    /// `None` means the OS data directory.
    Sqlite(Option<PathBuf>),
}

impl StorageConfig {
    pub fn open(&self) -> anyhow::Result<Arc<dyn LocalStore>> {
        let store: Arc<dyn LocalStore> = match self {
            StorageConfig::Memory => Arc::new(InMemoryLocalStore::new()),
            StorageConfig::Sqlite(Some(path)) => Arc::new(SqliteLocalStore::open(path)),
            StorageConfig::Sqlite(None) => Arc::new(
                SqliteLocalStore::open_default().context("failed to locate session database")?,
            ),
        };
        Ok(store)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub backend: BackendConfig,
    pub storage: StorageConfig,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend = BackendConfig::from_lookup(&lookup)?;
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let storage = match var("WHOLESALE_STORAGE").as_deref() {
            None | Some("sqlite") => StorageConfig::Sqlite(var("WHOLESALE_DB_PATH").map(PathBuf::from)),
            Some("memory") => StorageConfig::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "WHOLESALE_STORAGE",
                    reason: format!("'{other}' is not one of sqlite, memory"),
                });
            }
        };

        Ok(Self { backend, storage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        ClientConfig::from_lookup(|key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
    }

    #[test]
    fn defaults_to_dev_backend_and_sqlite_in_data_dir() {
        let config = config(&[]).unwrap();
        assert_eq!(config.backend, BackendConfig::InMemory);
        assert_eq!(config.storage, StorageConfig::Sqlite(None));
    }

    #[test]
    fn storage_can_be_chosen() {
        assert_eq!(
            config(&[("WHOLESALE_STORAGE", "memory")]).unwrap().storage,
            StorageConfig::Memory
        );
        assert_eq!(
            config(&[("WHOLESALE_DB_PATH", "/tmp/s.db")]).unwrap().storage,
            StorageConfig::Sqlite(Some(PathBuf::from("/tmp/s.db")))
        );
        assert!(matches!(
            config(&[("WHOLESALE_STORAGE", "redis")]),
            Err(ConfigError::Invalid { var: "WHOLESALE_STORAGE", .. })
        ));
    }

    #[test]
    fn backend_errors_propagate() {
        let err = config(&[("WHOLESALE_API_URL", "http://a.test"), ("WHOLESALE_BACKEND", "soap")]);
        assert!(matches!(err, Err(ConfigError::UnknownBackend(_))));
    }
}
