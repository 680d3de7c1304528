//! Inverted index maintenance.
//!
//! Reconciles the token → dns index for one record at a time against that
//! record's previously stored token set. Only the symmetric difference of
//! the old and new token sets is touched, never a full index rebuild.
//!
//! The read-modify-write on a shared token's entry is not atomic, so records
//! must be processed sequentially within a pass (the sync engine owns that
//! discipline).
//!
//! Invariants maintained here:
//! - a (token, dn) pair is in the index iff dn's stored token set contains
//!   the token;
//! - an index entry that becomes empty is deleted, not stored empty;
//! - the per-dn token set is overwritten with the new set even when
//!   unchanged, keeping it authoritative.

use std::collections::BTreeSet;

use anyhow::Result;

use crate::store::{collections, KvStore};

/// Load the stored token set for a dn; empty set if absent.
pub async fn load_token_set(store: &dyn KvStore, dn: &str) -> Result<BTreeSet<String>> {
    match store.get(collections::TOKENS, dn).await? {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(BTreeSet::new()),
    }
}

/// Load the dns indexed under a token; empty if the entry is absent.
pub async fn ids_for_token(store: &dyn KvStore, token: &str) -> Result<Vec<String>> {
    match store.get(collections::INDEX, token).await? {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Vec::new()),
    }
}

/// Reconcile the index for one dn against its new token set.
///
/// Cost is proportional to the symmetric difference of the previous and new
/// sets, not to index size.
pub async fn update_record(
    store: &dyn KvStore,
    dn: &str,
    new_tokens: &BTreeSet<String>,
) -> Result<()> {
    let previous = load_token_set(store, dn).await?;

    for token in new_tokens.difference(&previous) {
        let mut ids = ids_for_token(store, token).await?;
        if !ids.iter().any(|id| id == dn) {
            ids.push(dn.to_string());
            ids.sort();
        }
        store
            .put(collections::INDEX, token, &serde_json::to_string(&ids)?)
            .await?;
    }

    for token in previous.difference(new_tokens) {
        remove_from_entry(store, token, dn).await?;
    }

    // Overwrite even when unchanged so the stored set stays authoritative.
    store
        .put(collections::TOKENS, dn, &serde_json::to_string(new_tokens)?)
        .await?;

    Ok(())
}

/// Remove every index contribution of a dn and its per-dn token set.
/// Used by the deletion phase and the admin removal path.
pub async fn remove_record(store: &dyn KvStore, dn: &str) -> Result<()> {
    let previous = load_token_set(store, dn).await?;
    for token in &previous {
        remove_from_entry(store, token, dn).await?;
    }
    store.remove(collections::TOKENS, dn).await?;
    Ok(())
}

async fn remove_from_entry(store: &dyn KvStore, token: &str, dn: &str) -> Result<()> {
    let mut ids = ids_for_token(store, token).await?;
    ids.retain(|id| id != dn);
    if ids.is_empty() {
        store.remove(collections::INDEX, token).await?;
    } else {
        store
            .put(collections::INDEX, token, &serde_json::to_string(&ids)?)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKv;

    fn set(tokens: &[&str]) -> BTreeSet<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn test_add_new_record() {
        let store = MemoryKv::new();
        update_record(&store, "d1", &set(&["jane", "doe"])).await.unwrap();

        assert_eq!(ids_for_token(&store, "jane").await.unwrap(), vec!["d1"]);
        assert_eq!(ids_for_token(&store, "doe").await.unwrap(), vec!["d1"]);
        assert_eq!(load_token_set(&store, "d1").await.unwrap(), set(&["jane", "doe"]));
    }

    #[tokio::test]
    async fn test_update_applies_only_the_diff() {
        let store = MemoryKv::new();
        update_record(&store, "d1", &set(&["jane", "sales"])).await.unwrap();
        update_record(&store, "d2", &set(&["john", "sales"])).await.unwrap();

        // d1's title changes: "sales" dropped, "support" added
        update_record(&store, "d1", &set(&["jane", "support"])).await.unwrap();

        assert_eq!(ids_for_token(&store, "support").await.unwrap(), vec!["d1"]);
        // Shared token keeps the other contributor
        assert_eq!(ids_for_token(&store, "sales").await.unwrap(), vec!["d2"]);
        assert_eq!(load_token_set(&store, "d1").await.unwrap(), set(&["jane", "support"]));
    }

    #[tokio::test]
    async fn test_empty_entry_deleted_not_stored() {
        let store = MemoryKv::new();
        update_record(&store, "d1", &set(&["unique"])).await.unwrap();
        update_record(&store, "d1", &set(&["other"])).await.unwrap();

        assert_eq!(
            store.get(crate::store::collections::INDEX, "unique").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_no_duplicate_ids_for_same_token() {
        let store = MemoryKv::new();
        update_record(&store, "d1", &set(&["jane"])).await.unwrap();
        // Simulate a stale per-dn set: entry already contains d1 but the
        // stored token set was cleared
        store.remove(crate::store::collections::TOKENS, "d1").await.unwrap();
        update_record(&store, "d1", &set(&["jane"])).await.unwrap();

        assert_eq!(ids_for_token(&store, "jane").await.unwrap(), vec!["d1"]);
    }

    #[tokio::test]
    async fn test_unchanged_update_is_idempotent() {
        let store = MemoryKv::new();
        update_record(&store, "d1", &set(&["jane", "doe"])).await.unwrap();
        let before = store.get(crate::store::collections::TOKENS, "d1").await.unwrap();

        update_record(&store, "d1", &set(&["jane", "doe"])).await.unwrap();
        let after = store.get(crate::store::collections::TOKENS, "d1").await.unwrap();

        assert_eq!(before, after);
        assert_eq!(ids_for_token(&store, "jane").await.unwrap(), vec!["d1"]);
    }

    #[tokio::test]
    async fn test_remove_record_clears_all_contributions() {
        let store = MemoryKv::new();
        update_record(&store, "d1", &set(&["jane", "sales"])).await.unwrap();
        update_record(&store, "d2", &set(&["sales"])).await.unwrap();

        remove_record(&store, "d1").await.unwrap();

        assert!(ids_for_token(&store, "jane").await.unwrap().is_empty());
        assert_eq!(ids_for_token(&store, "sales").await.unwrap(), vec!["d2"]);
        assert_eq!(
            store.get(crate::store::collections::TOKENS, "d1").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_index_consistency_after_mixed_updates() {
        let store = MemoryKv::new();
        update_record(&store, "d1", &set(&["aa", "bb"])).await.unwrap();
        update_record(&store, "d2", &set(&["bb", "cc"])).await.unwrap();
        update_record(&store, "d1", &set(&["bb", "cc"])).await.unwrap();
        remove_record(&store, "d2").await.unwrap();

        // For all tokens t and ids d: d in index[t] iff t in tokens[d]
        let index_tokens = store.keys(crate::store::collections::INDEX).await.unwrap();
        for token in &index_tokens {
            let ids = ids_for_token(&store, token).await.unwrap();
            assert!(!ids.is_empty(), "empty entry stored for {token}");
            for id in ids {
                let toks = load_token_set(&store, &id).await.unwrap();
                assert!(toks.contains(token));
            }
        }
        let d1 = load_token_set(&store, "d1").await.unwrap();
        for token in &d1 {
            assert!(ids_for_token(&store, token).await.unwrap().contains(&"d1".to_string()));
        }
    }
}
