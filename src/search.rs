//! Token search over the inverted index.
//!
//! The query is tokenized with the same tokenizer used at index time and the
//! per-token index entries are intersected (AND semantics), so a record
//! matches only when it contains every query token.

use std::collections::BTreeSet;

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::index;
use crate::models::DirectoryRecord;
use crate::store::{self, KvStore, SqliteKv};
use crate::tokenize;

pub const DEFAULT_LIMIT: usize = 25;

/// Search records matching every token of the query, ordered by dn.
pub async fn search_records(
    store: &dyn KvStore,
    query: &str,
    limit: usize,
) -> Result<Vec<DirectoryRecord>> {
    let tokens = tokenize::tokenize([Some(query)]);
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let mut matching: Option<BTreeSet<String>> = None;
    for token in &tokens {
        let ids: BTreeSet<String> = index::ids_for_token(store, token).await?.into_iter().collect();
        matching = Some(match matching {
            None => ids,
            Some(current) => current.intersection(&ids).cloned().collect(),
        });
        if matching.as_ref().is_some_and(|m| m.is_empty()) {
            return Ok(Vec::new());
        }
    }

    let mut results = Vec::new();
    for dn in matching.unwrap_or_default() {
        if results.len() >= limit {
            break;
        }
        if let Some(record) = store::get_record(store, &dn).await? {
            results.push(record);
        }
    }
    Ok(results)
}

/// CLI entry point: print matching records.
pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let kv = SqliteKv::new(db::connect(config).await?);
    let results = search_records(&kv, query, limit.unwrap_or(DEFAULT_LIMIT)).await?;

    if results.is_empty() {
        println!("No results.");
    } else {
        for record in &results {
            println!(
                "{}  {}  {}  {}",
                record.display_name.as_deref().unwrap_or("-"),
                record.title.as_deref().unwrap_or("-"),
                record.mail.as_deref().unwrap_or("-"),
                record.dn
            );
        }
        println!("{} result(s)", results.len());
    }

    kv.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKv;
    use std::collections::BTreeSet;

    async fn seed(store: &MemoryKv, dn: &str, display_name: &str, department: &str) {
        let tokens: BTreeSet<String> =
            tokenize::tokenize([Some(display_name), Some(department)]);
        index::update_record(store, dn, &tokens).await.unwrap();
        let record = serde_json::json!({
            "dn": dn,
            "guid": null, "samAccountName": null, "userPrincipalName": null,
            "mail": null, "givenName": null, "surname": null,
            "displayName": display_name, "title": null, "department": department,
            "company": null, "office": null, "telephoneNumber": null,
            "mobile": null, "ipPhone": null, "city": null, "state": null,
            "country": null, "streetAddress": null, "postalCode": null,
            "memberOf": null, "memberOfNames": null, "manager": null,
            "lastLogon": null, "lastLogonTimestamp": null, "pwdLastSet": null,
            "whenChanged": null, "whenCreated": null,
            "userAccountControl": null, "userAccountControlLabel": null,
            "isManual": false, "syncedAt": "t"
        });
        store
            .put(crate::store::collections::RECORDS, dn, &record.to_string())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_single_token_match() {
        let store = MemoryKv::new();
        seed(&store, "d1", "Jane Doe", "Sales").await;
        seed(&store, "d2", "John Roe", "Support").await;

        let results = search_records(&store, "jane", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].dn, "d1");
    }

    #[tokio::test]
    async fn test_multi_token_intersection() {
        let store = MemoryKv::new();
        seed(&store, "d1", "Jane Doe", "Sales").await;
        seed(&store, "d2", "Jane Roe", "Support").await;

        let results = search_records(&store, "Jane Sales", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].dn, "d1");
    }

    #[tokio::test]
    async fn test_no_match_and_empty_query() {
        let store = MemoryKv::new();
        seed(&store, "d1", "Jane Doe", "Sales").await;

        assert!(search_records(&store, "nonexistent", 10).await.unwrap().is_empty());
        assert!(search_records(&store, "  ", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_limit_applied() {
        let store = MemoryKv::new();
        for i in 0..5 {
            seed(&store, &format!("d{i}"), "Common Name", "Shared").await;
        }
        let results = search_records(&store, "common", 3).await.unwrap();
        assert_eq!(results.len(), 3);
    }
}
