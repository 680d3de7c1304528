//! Record lookup by primary or secondary key, and sync status.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::store::{self, KvStore, SqliteKv};

/// Resolve a record by primary or secondary key.
///
/// When both keys are supplied, dn takes precedence and the guid is not
/// consulted. With neither, this is a usage error.
pub async fn lookup(
    store: &dyn KvStore,
    dn: Option<&str>,
    guid: Option<&str>,
) -> Result<Option<crate::models::DirectoryRecord>> {
    match (dn, guid) {
        (Some(dn), _) => store::get_record(store, dn).await,
        (None, Some(guid)) => store::get_record_by_guid(store, guid).await,
        (None, None) => bail!("either --dn or --guid is required"),
    }
}

/// CLI entry point: print one record as JSON.
pub async fn run_get(config: &Config, dn: Option<String>, guid: Option<String>) -> Result<()> {
    let kv = SqliteKv::new(db::connect(config).await?);
    let record = lookup(&kv, dn.as_deref(), guid.as_deref()).await?;
    kv.close().await;

    match record {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        None => bail!("record not found"),
    }
}

/// CLI entry point: print the last completed sync, if any.
pub async fn run_status(config: &Config) -> Result<()> {
    let kv = SqliteKv::new(db::connect(config).await?);
    let meta = store::get_run_meta(&kv).await?;
    kv.close().await;

    match meta {
        Some(meta) => {
            println!("last sync: {}", meta.at);
            println!("  base DN: {}", meta.base_dn);
            println!("  upserts: {}", meta.upserts);
            println!("  deletes: {}", meta.deletes);
            println!("  fetched: {}", meta.ldap_count);
        }
        None => println!("no completed sync"),
    }
    Ok(())
}
