//! Storage abstraction for staffdir.
//!
//! The [`KvStore`] trait defines the named-collection key-value operations
//! the sync engine and lookup paths need, enabling pluggable backends
//! (SQLite, in-memory for tests).
//!
//! Collections are independent ordered key spaces. Operations on a single
//! key are individually atomic; there is no cross-key snapshot isolation.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::db;
use crate::models::{DirectoryRecord, SyncRunMeta};

/// Named collections in the store.
pub mod collections {
    /// Primary store: dn → record JSON.
    pub const RECORDS: &str = "records";
    /// Secondary key: guid → dn.
    pub const GUIDS: &str = "guids";
    /// Per-dn token sets: dn → sorted JSON array of tokens.
    pub const TOKENS: &str = "tokens";
    /// Inverted index: token → sorted JSON array of dns.
    pub const INDEX: &str = "index";
    /// Known-identifier tracking set: dn → "1". Only synced records appear
    /// here, which keeps manual records invisible to the deletion phase.
    pub const KNOWN: &str = "known";
    /// Run metadata, single key.
    pub const META: &str = "meta";
}

/// Key under [`collections::META`] holding the last completed run.
pub const META_KEY: &str = "last_sync";

/// Abstract ordered key-value backend with named collections.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<String>>;
    async fn put(&self, collection: &str, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, collection: &str, key: &str) -> Result<()>;
    /// All keys in a collection, in sorted order.
    async fn keys(&self, collection: &str) -> Result<Vec<String>>;
}

/// SQLite implementation of [`KvStore`] over the single `kv` table.
pub struct SqliteKv {
    pool: SqlitePool,
}

impl SqliteKv {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv WHERE collection = ? AND key = ?")
            .bind(collection)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db::store_error)?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    async fn put(&self, collection: &str, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv (collection, key, value) VALUES (?, ?, ?)
            ON CONFLICT(collection, key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(db::store_error)?;
        Ok(())
    }

    async fn remove(&self, collection: &str, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv WHERE collection = ? AND key = ?")
            .bind(collection)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(db::store_error)?;
        Ok(())
    }

    async fn keys(&self, collection: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM kv WHERE collection = ? ORDER BY key")
            .bind(collection)
            .fetch_all(&self.pool)
            .await
            .map_err(db::store_error)?;
        Ok(rows.iter().map(|r| r.get::<String, _>(0)).collect())
    }
}

/// In-memory [`KvStore`] for unit tests.
///
/// `BTreeMap` keeps keys sorted like the SQLite backend.
pub struct MemoryKv {
    collections: RwLock<BTreeMap<String, BTreeMap<String, String>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<String>> {
        let guard = self.collections.read().unwrap();
        Ok(guard.get(collection).and_then(|c| c.get(key)).cloned())
    }

    async fn put(&self, collection: &str, key: &str, value: &str) -> Result<()> {
        let mut guard = self.collections.write().unwrap();
        guard
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, collection: &str, key: &str) -> Result<()> {
        let mut guard = self.collections.write().unwrap();
        if let Some(c) = guard.get_mut(collection) {
            c.remove(key);
        }
        Ok(())
    }

    async fn keys(&self, collection: &str) -> Result<Vec<String>> {
        let guard = self.collections.read().unwrap();
        Ok(guard
            .get(collection)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default())
    }
}

// ============ Typed accessors ============

pub async fn get_record(store: &dyn KvStore, dn: &str) -> Result<Option<DirectoryRecord>> {
    match store.get(collections::RECORDS, dn).await? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

pub async fn put_record(store: &dyn KvStore, record: &DirectoryRecord) -> Result<()> {
    let json = serde_json::to_string(record)?;
    store.put(collections::RECORDS, &record.dn, &json).await
}

/// Resolve a guid through the secondary-key collection to its record.
pub async fn get_record_by_guid(
    store: &dyn KvStore,
    guid: &str,
) -> Result<Option<DirectoryRecord>> {
    match store.get(collections::GUIDS, guid).await? {
        Some(dn) => get_record(store, &dn).await,
        None => Ok(None),
    }
}

pub async fn get_run_meta(store: &dyn KvStore) -> Result<Option<SyncRunMeta>> {
    match store.get(collections::META, META_KEY).await? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

pub async fn put_run_meta(store: &dyn KvStore, meta: &SyncRunMeta) -> Result<()> {
    let json = serde_json::to_string(meta)?;
    store.put(collections::META, META_KEY, &json).await
}
