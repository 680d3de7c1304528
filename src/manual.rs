//! Administrative path for manually-entered records.
//!
//! Manual records carry `isManual = true` and are permanently exempt from
//! sync upserts and deletes. They are indexed like synced records but never
//! written to the known-identifier tracking collection, so the deletion
//! phase cannot see them.

use anyhow::{bail, Result};
use uuid::Uuid;

use crate::index;
use crate::models::DirectoryRecord;
use crate::store::{self, collections, KvStore};
use crate::tokenize;

/// Attributes accepted for a manual contact.
#[derive(Debug, Clone, Default)]
pub struct ManualContact {
    pub display_name: String,
    pub mail: Option<String>,
    pub title: Option<String>,
    pub department: Option<String>,
    pub company: Option<String>,
    pub office: Option<String>,
    pub telephone_number: Option<String>,
    pub mobile: Option<String>,
}

/// Create and index a manual record. Returns the stored record.
pub async fn add_manual(store: &dyn KvStore, contact: ManualContact) -> Result<DirectoryRecord> {
    if contact.display_name.trim().is_empty() {
        bail!("display name must not be empty");
    }

    let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let record = DirectoryRecord {
        dn: format!("cn={},ou=manual", Uuid::new_v4()),
        guid: None,
        sam_account_name: None,
        user_principal_name: None,
        mail: contact.mail,
        given_name: None,
        surname: None,
        display_name: Some(contact.display_name),
        title: contact.title,
        department: contact.department,
        company: contact.company,
        office: contact.office,
        telephone_number: contact.telephone_number,
        mobile: contact.mobile,
        ip_phone: None,
        city: None,
        state: None,
        country: None,
        street_address: None,
        postal_code: None,
        member_of: None,
        member_of_names: None,
        manager: None,
        last_logon: None,
        last_logon_timestamp: None,
        pwd_last_set: None,
        when_changed: None,
        when_created: None,
        user_account_control: None,
        user_account_control_label: None,
        is_manual: true,
        synced_at: now,
    };

    store::put_record(store, &record).await?;
    let tokens = tokenize::record_tokens(&record);
    index::update_record(store, &record.dn, &tokens).await?;
    Ok(record)
}

/// Delete any record (manual or synced) and all its index contributions.
/// Returns false when no record exists at the dn.
pub async fn remove(store: &dyn KvStore, dn: &str) -> Result<bool> {
    let Some(record) = store::get_record(store, dn).await? else {
        return Ok(false);
    };

    if let Some(guid) = &record.guid {
        store.remove(collections::GUIDS, guid).await?;
    }
    store.remove(collections::RECORDS, dn).await?;
    index::remove_record(store, dn).await?;
    store.remove(collections::KNOWN, dn).await?;
    Ok(true)
}
