use anyhow::Result;

use crate::config::Config;
use crate::db;

/// Create the key-value schema. Idempotent.
///
/// All named collections share one table: `(collection, key)` is the primary
/// key, so keys iterate in sorted order within a collection.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS kv (
            collection TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (collection, key)
        )
        "#,
    )
    .execute(&pool)
    .await
    .map_err(db::store_error)?;

    pool.close().await;
    Ok(())
}
