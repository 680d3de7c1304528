//! Core data models used throughout staffdir.
//!
//! These types represent the raw directory entries, normalized contact
//! records, and run metadata that flow through the sync and lookup pipeline.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One raw value as returned by the source directory.
///
/// Directory attributes may be absent, scalar, multi-valued, or binary
/// (e.g. `objectGUID`); normalization decides how each is coerced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    Text(String),
    TextList(Vec<String>),
    Binary(Vec<u8>),
}

/// A raw directory entry before normalization: attribute name → raw value.
#[derive(Debug, Clone, Default)]
pub struct RawEntry {
    pub attrs: HashMap<String, RawValue>,
}

impl RawEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// First scalar string for an attribute, if present.
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.attrs.get(name)? {
            RawValue::Text(s) => Some(s.as_str()),
            RawValue::TextList(v) => v.first().map(|s| s.as_str()),
            RawValue::Binary(_) => None,
        }
    }

    /// All string values for an attribute, in directory order.
    /// A scalar value yields a one-element sequence.
    pub fn texts(&self, name: &str) -> Option<Vec<String>> {
        match self.attrs.get(name)? {
            RawValue::Text(s) => Some(vec![s.clone()]),
            RawValue::TextList(v) => Some(v.clone()),
            RawValue::Binary(_) => None,
        }
    }

    /// Raw bytes for an attribute: binary values as-is, text values as UTF-8.
    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        match self.attrs.get(name)? {
            RawValue::Text(s) => Some(s.as_bytes()),
            RawValue::TextList(v) => v.first().map(|s| s.as_bytes()),
            RawValue::Binary(b) => Some(b.as_slice()),
        }
    }

    /// Insert helper used by directory sources and tests.
    pub fn set(&mut self, name: &str, value: RawValue) {
        self.attrs.insert(name.to_string(), value);
    }
}

/// Normalized contact record stored per directory principal.
///
/// Serialized as camelCase JSON with every declared field present (absent
/// attributes become `null`, never omitted) so downstream consumers can
/// rely on field presence. `dn` is the primary key; `guid`, when present,
/// is a secondary unique key maintained in a parallel collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryRecord {
    pub dn: String,
    pub guid: Option<String>,
    pub sam_account_name: Option<String>,
    pub user_principal_name: Option<String>,
    pub mail: Option<String>,
    pub given_name: Option<String>,
    pub surname: Option<String>,
    pub display_name: Option<String>,
    pub title: Option<String>,
    pub department: Option<String>,
    pub company: Option<String>,
    pub office: Option<String>,
    pub telephone_number: Option<String>,
    pub mobile: Option<String>,
    pub ip_phone: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub street_address: Option<String>,
    pub postal_code: Option<String>,
    /// Raw group membership DNs, in directory order.
    pub member_of: Option<Vec<String>>,
    /// Leading path component (CN) of each `member_of` entry, parallel order.
    pub member_of_names: Option<Vec<String>>,
    pub manager: Option<String>,
    /// FILETIME attributes converted to ISO-8601; zero/unparseable → null.
    pub last_logon: Option<String>,
    pub last_logon_timestamp: Option<String>,
    pub pwd_last_set: Option<String>,
    /// Audit timestamps kept in their original directory format.
    pub when_changed: Option<String>,
    pub when_created: Option<String>,
    pub user_account_control: Option<i64>,
    /// Human-readable label for `user_account_control`; unknown values → null.
    pub user_account_control_label: Option<String>,
    /// Records created through the admin path. Never overwritten or deleted
    /// by the sync engine, regardless of directory state.
    pub is_manual: bool,
    pub synced_at: String,
}

/// Metadata for the last completed sync pass, overwritten each run.
///
/// Observability only: its absence after a crash means "unknown last-sync
/// state", not "no sync ever ran".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRunMeta {
    /// ISO timestamp of pass completion.
    pub at: String,
    #[serde(rename = "baseDN")]
    pub base_dn: String,
    pub upserts: u64,
    pub deletes: u64,
    #[serde(rename = "ldapCount")]
    pub ldap_count: u64,
}
