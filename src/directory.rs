//! Directory source abstraction.
//!
//! The sync engine consumes the directory as a black box: a bind operation
//! and a full-snapshot search with a fixed filter and attribute list.
//! Pagination is a transport detail inside the source, not an incremental
//! concept at this layer.
//!
//! The shipping implementation, [`SnapshotFile`], reads a JSON export of raw
//! entries so a pass can run without a live LDAP connection; the wire
//! protocol client lives outside this repo. Tests use an in-memory fake.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;

use crate::models::{RawEntry, RawValue};

/// Fixed search filter: person objects only, disabled accounts and computer
/// objects excluded.
pub const PERSON_FILTER: &str =
    "(&(objectCategory=person)(objectClass=user)(!(userAccountControl:1.2.840.113556.1.4.803:=2)))";

/// Fixed attribute list requested for every entry.
pub const SYNC_ATTRIBUTES: &[&str] = &[
    "distinguishedName",
    "objectGUID",
    "sAMAccountName",
    "userPrincipalName",
    "mail",
    "givenName",
    "sn",
    "displayName",
    "title",
    "department",
    "company",
    "physicalDeliveryOfficeName",
    "telephoneNumber",
    "mobile",
    "ipPhone",
    "l",
    "st",
    "co",
    "streetAddress",
    "postalCode",
    "memberOf",
    "manager",
    "lastLogon",
    "lastLogonTimestamp",
    "pwdLastSet",
    "whenChanged",
    "whenCreated",
    "userAccountControl",
];

/// A source of directory entries.
#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// Establish a connection/session. Fails with an authentication or
    /// connection error; nothing has been mutated when this fails.
    async fn bind(&mut self) -> Result<()>;

    /// Fetch the full set of matching entries in one logical snapshot.
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[&str],
        page_size: usize,
    ) -> Result<Vec<RawEntry>>;
}

/// Enforces per-operation deadlines on an inner source.
///
/// A hung bind or fetch (network mount, stalled server) fails the pass with
/// a timeout error instead of blocking it forever. Deadlines come from
/// `[directory].bind_timeout_secs` and `[directory].operation_timeout_secs`.
pub struct TimeoutSource<S> {
    inner: S,
    bind_timeout: Duration,
    operation_timeout: Duration,
}

impl<S: DirectorySource> TimeoutSource<S> {
    pub fn new(inner: S, bind_timeout: Duration, operation_timeout: Duration) -> Self {
        Self {
            inner,
            bind_timeout,
            operation_timeout,
        }
    }
}

#[async_trait]
impl<S: DirectorySource> DirectorySource for TimeoutSource<S> {
    async fn bind(&mut self) -> Result<()> {
        let deadline = self.bind_timeout;
        match tokio::time::timeout(deadline, self.inner.bind()).await {
            Ok(result) => result,
            Err(_) => bail!("directory bind timed out after {}s", deadline.as_secs()),
        }
    }

    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[&str],
        page_size: usize,
    ) -> Result<Vec<RawEntry>> {
        let deadline = self.operation_timeout;
        match tokio::time::timeout(
            deadline,
            self.inner.search(base_dn, filter, attributes, page_size),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => bail!("directory search timed out after {}s", deadline.as_secs()),
        }
    }
}

/// Directory source backed by a JSON export file.
///
/// The export is an array of objects, one per entry; attribute values are a
/// string, an array of strings, or `{"b64": "..."}` for binary values
/// (objectGUID). Exports are produced by the extraction tooling with the
/// person filter already applied.
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl DirectorySource for SnapshotFile {
    async fn bind(&mut self) -> Result<()> {
        tokio::fs::metadata(&self.path)
            .await
            .with_context(|| format!("cannot open directory snapshot: {}", self.path.display()))?;
        Ok(())
    }

    async fn search(
        &mut self,
        _base_dn: &str,
        _filter: &str,
        _attributes: &[&str],
        _page_size: usize,
    ) -> Result<Vec<RawEntry>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read snapshot: {}", self.path.display()))?;
        parse_snapshot(&content)
    }
}

/// Parse a snapshot export into raw entries.
pub fn parse_snapshot(content: &str) -> Result<Vec<RawEntry>> {
    let value: serde_json::Value =
        serde_json::from_str(content).context("snapshot is not valid JSON")?;
    let Some(items) = value.as_array() else {
        bail!("snapshot must be a JSON array of entries");
    };

    let mut entries = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(map) = item.as_object() else {
            bail!("snapshot entry {i} is not an object");
        };
        let mut entry = RawEntry::new();
        for (name, raw) in map {
            let value = parse_value(raw)
                .with_context(|| format!("snapshot entry {i}, attribute {name}"))?;
            entry.set(name, value);
        }
        entries.push(entry);
    }
    Ok(entries)
}

fn parse_value(raw: &serde_json::Value) -> Result<RawValue> {
    match raw {
        serde_json::Value::String(s) => Ok(RawValue::Text(s.clone())),
        serde_json::Value::Number(n) => Ok(RawValue::Text(n.to_string())),
        serde_json::Value::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                match item.as_str() {
                    Some(s) => values.push(s.to_string()),
                    None => bail!("multi-valued attribute contains a non-string value"),
                }
            }
            Ok(RawValue::TextList(values))
        }
        serde_json::Value::Object(map) => {
            let Some(encoded) = map.get("b64").and_then(|v| v.as_str()) else {
                bail!("object attribute value must be {{\"b64\": ...}}");
            };
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .context("invalid base64 in binary attribute")?;
            Ok(RawValue::Binary(bytes))
        }
        other => bail!("unsupported attribute value: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_snapshot_values() {
        let content = r#"[
            {
                "distinguishedName": "CN=A,OU=X",
                "memberOf": ["CN=Sales,DC=corp", "CN=VPN,DC=corp"],
                "objectGUID": {"b64": "AQL/AA=="},
                "userAccountControl": 512
            }
        ]"#;
        let entries = parse_snapshot(content).unwrap();
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.text("distinguishedName"), Some("CN=A,OU=X"));
        assert_eq!(e.texts("memberOf").unwrap().len(), 2);
        assert_eq!(e.bytes("objectGUID"), Some(&[0x01u8, 0x02, 0xff, 0x00][..]));
        assert_eq!(e.text("userAccountControl"), Some("512"));
    }

    #[test]
    fn test_parse_snapshot_rejects_non_array() {
        assert!(parse_snapshot("{}").is_err());
        assert!(parse_snapshot("not json").is_err());
    }

    #[tokio::test]
    async fn test_bind_fails_for_missing_file() {
        let mut source = SnapshotFile::new(PathBuf::from("/nonexistent/export.json"));
        assert!(source.bind().await.is_err());
    }

    struct StallingSource {
        delay: Duration,
    }

    #[async_trait]
    impl DirectorySource for StallingSource {
        async fn bind(&mut self) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }

        async fn search(
            &mut self,
            _base_dn: &str,
            _filter: &str,
            _attributes: &[&str],
            _page_size: usize,
        ) -> Result<Vec<RawEntry>> {
            tokio::time::sleep(self.delay).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_timeout_source_aborts_hung_operations() {
        let inner = StallingSource {
            delay: Duration::from_secs(5),
        };
        let mut source =
            TimeoutSource::new(inner, Duration::from_millis(10), Duration::from_millis(10));

        let err = source.bind().await.unwrap_err();
        assert!(err.to_string().contains("timed out"));

        let err = source
            .search("DC=corp", PERSON_FILTER, SYNC_ATTRIBUTES, 500)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_timeout_source_passes_through_fast_operations() {
        let inner = StallingSource {
            delay: Duration::from_millis(0),
        };
        let mut source =
            TimeoutSource::new(inner, Duration::from_secs(5), Duration::from_secs(5));

        assert!(source.bind().await.is_ok());
        assert!(source
            .search("DC=corp", PERSON_FILTER, SYNC_ATTRIBUTES, 500)
            .await
            .unwrap()
            .is_empty());
    }
}
