use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::Config;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let store_path = &config.store.path;

    // Ensure parent directory exists
    if let Some(parent) = store_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", store_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(store_error)?;

    Ok(pool)
}

/// Wrap a store-layer error, attaching a diagnostic hint when SQLite reports
/// an incompatible on-disk format. Still fatal either way.
pub fn store_error(err: sqlx::Error) -> anyhow::Error {
    let msg = err.to_string();
    if msg.contains("file is not a database") || msg.contains("database disk image is malformed") {
        return anyhow::Error::new(err).context(
            "store file is not a staffdir SQLite store; \
             check store.path or remove the file and run `staffdir init`",
        );
    }
    anyhow::Error::new(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DirectoryConfig, ServerConfig, StoreConfig, SyncConfig};

    fn config_with_store(path: std::path::PathBuf) -> Config {
        Config {
            store: StoreConfig { path },
            directory: DirectoryConfig {
                base_dn: "DC=corp,DC=example".to_string(),
                snapshot: std::path::PathBuf::from("./export.json"),
                page_size: 500,
                bind_timeout_secs: 10,
                operation_timeout_secs: 300,
            },
            sync: SyncConfig::default(),
            server: ServerConfig {
                bind: "127.0.0.1:0".to_string(),
                auth_token: "t".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_connect_rejects_non_database_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("garbage.db");
        std::fs::write(&path, "definitely not a sqlite database file").unwrap();

        let err = connect(&config_with_store(path)).await.unwrap_err();
        assert!(
            format!("{err:#}").contains("staffdir SQLite store"),
            "expected the format-mismatch hint, got: {err:#}"
        );
    }

    #[tokio::test]
    async fn test_connect_creates_missing_database() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("data").join("fresh.db");

        let pool = connect(&config_with_store(path.clone())).await.unwrap();
        pool.close().await;
        assert!(path.exists());
    }
}
