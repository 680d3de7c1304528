//! Identity and normalization.
//!
//! Derives a stable opaque identifier and a normalized [`DirectoryRecord`]
//! from a raw directory entry: attribute coercion, guid canonicalization,
//! FILETIME conversion, group display-name extraction, and the fixed
//! userAccountControl label table.
//!
//! Data-shape anomalies never propagate past this module: an unparseable or
//! zero timestamp, an unknown account-control value, or a missing optional
//! attribute all become `null` fields.

use sha2::{Digest, Sha256};

use crate::models::{DirectoryRecord, RawEntry};

/// Seconds between the FILETIME epoch (1601-01-01) and the Unix epoch.
const FILETIME_UNIX_OFFSET_SECS: i64 = 11_644_473_600;

/// 100-nanosecond ticks per second.
const FILETIME_TICKS_PER_SEC: i64 = 10_000_000;

/// Fixed userAccountControl → label table. Unknown values map to null.
const UAC_LABELS: &[(i64, &str)] = &[
    (512, "Normal account"),
    (514, "Disabled account"),
    (544, "Normal account, password not required"),
    (546, "Disabled account, password not required"),
    (66048, "Normal account, password never expires"),
    (66050, "Disabled account, password never expires"),
    (66082, "Disabled account, password not required, password never expires"),
    (262656, "Normal account, smartcard required"),
    (262658, "Disabled account, smartcard required"),
    (532480, "Domain controller"),
];

/// Normalize one raw directory entry into a record.
///
/// Returns `None` when the entry has no resolvable distinguished name;
/// the orchestrator counts and skips those rather than failing the pass.
pub fn normalize(entry: &RawEntry, synced_at: &str) -> Option<DirectoryRecord> {
    let dn = entry.text("distinguishedName")?.to_string();
    if dn.trim().is_empty() {
        return None;
    }

    let member_of = entry.texts("memberOf");
    let member_of_names = member_of
        .as_ref()
        .map(|groups| groups.iter().map(|g| leading_component(g)).collect());

    let uac = entry
        .text("userAccountControl")
        .and_then(|v| v.trim().parse::<i64>().ok());

    Some(DirectoryRecord {
        guid: entry.bytes("objectGUID").map(canonical_guid),
        sam_account_name: opt(entry, "sAMAccountName"),
        user_principal_name: opt(entry, "userPrincipalName"),
        mail: opt(entry, "mail"),
        given_name: opt(entry, "givenName"),
        surname: opt(entry, "sn"),
        display_name: opt(entry, "displayName"),
        title: opt(entry, "title"),
        department: opt(entry, "department"),
        company: opt(entry, "company"),
        office: opt(entry, "physicalDeliveryOfficeName"),
        telephone_number: opt(entry, "telephoneNumber"),
        mobile: opt(entry, "mobile"),
        ip_phone: opt(entry, "ipPhone"),
        city: opt(entry, "l"),
        state: opt(entry, "st"),
        country: opt(entry, "co"),
        street_address: opt(entry, "streetAddress"),
        postal_code: opt(entry, "postalCode"),
        member_of,
        member_of_names,
        manager: opt(entry, "manager"),
        last_logon: filetime_to_iso(entry.text("lastLogon")),
        last_logon_timestamp: filetime_to_iso(entry.text("lastLogonTimestamp")),
        pwd_last_set: filetime_to_iso(entry.text("pwdLastSet")),
        when_changed: opt(entry, "whenChanged"),
        when_created: opt(entry, "whenCreated"),
        user_account_control: uac,
        user_account_control_label: uac.and_then(uac_label).map(str::to_string),
        is_manual: false,
        synced_at: synced_at.to_string(),
        dn,
    })
}

fn opt(entry: &RawEntry, name: &str) -> Option<String> {
    entry.text(name).map(str::to_string)
}

/// Canonicalize a raw unique identifier into a lowercase hex-shaped string.
///
/// A value that already looks like a canonical string-form GUID is
/// lowercased and kept; anything else (binary GUIDs in particular) is
/// hashed to a fixed-length hex digest so the secondary key has a stable
/// shape regardless of the directory's native encoding.
pub fn canonical_guid(raw: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(raw) {
        if looks_like_guid(s) {
            return s.to_lowercase();
        }
    }
    let digest = Sha256::digest(raw);
    hex::encode(digest)
}

/// Canonical string-form GUID: 8-4-4-4-12 hex groups.
fn looks_like_guid(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    for (i, b) in bytes.iter().enumerate() {
        match i {
            8 | 13 | 18 | 23 => {
                if *b != b'-' {
                    return false;
                }
            }
            _ => {
                if !b.is_ascii_hexdigit() {
                    return false;
                }
            }
        }
    }
    true
}

/// Convert a FILETIME string (100-ns ticks since 1601-01-01) to ISO-8601.
///
/// Zero, missing, or non-numeric values convert to `None`, never to an
/// epoch-zero date.
pub fn filetime_to_iso(raw: Option<&str>) -> Option<String> {
    let ticks: i64 = raw?.trim().parse().ok()?;
    if ticks <= 0 {
        return None;
    }
    let unix_secs = ticks / FILETIME_TICKS_PER_SEC - FILETIME_UNIX_OFFSET_SECS;
    let dt = chrono::DateTime::from_timestamp(unix_secs, 0)?;
    Some(dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

/// Extract the leading path component of a group DN as its display name:
/// `CN=Sales,OU=Groups,...` → `Sales`.
pub fn leading_component(dn: &str) -> String {
    let first = dn.split(',').next().unwrap_or(dn);
    match first.split_once('=') {
        Some((_, value)) => value.trim().to_string(),
        None => first.trim().to_string(),
    }
}

fn uac_label(value: i64) -> Option<&'static str> {
    UAC_LABELS
        .iter()
        .find(|(v, _)| *v == value)
        .map(|(_, label)| *label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawValue;

    fn entry_with_dn(dn: &str) -> RawEntry {
        let mut e = RawEntry::new();
        e.set("distinguishedName", RawValue::Text(dn.to_string()));
        e
    }

    #[test]
    fn test_missing_dn_yields_none() {
        assert!(normalize(&RawEntry::new(), "t").is_none());
        let mut e = RawEntry::new();
        e.set("distinguishedName", RawValue::Text("  ".to_string()));
        assert!(normalize(&e, "t").is_none());
    }

    #[test]
    fn test_absent_attributes_become_null_fields() {
        let record = normalize(&entry_with_dn("CN=A,OU=X"), "t").unwrap();
        assert_eq!(record.dn, "CN=A,OU=X");
        assert_eq!(record.title, None);
        assert_eq!(record.member_of, None);
        assert_eq!(record.member_of_names, None);
        assert!(!record.is_manual);

        // Every declared field must appear in the JSON, even if null.
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&record).unwrap()).unwrap();
        assert!(json.get("title").is_some());
        assert!(json["title"].is_null());
        assert!(json.get("memberOf").is_some());
    }

    #[test]
    fn test_string_guid_lowercased() {
        let raw = b"6FA0B1C2-3D4E-5F60-7182-93A4B5C6D7E8";
        assert_eq!(canonical_guid(raw), "6fa0b1c2-3d4e-5f60-7182-93a4b5c6d7e8");
    }

    #[test]
    fn test_binary_guid_hashed_to_fixed_length_hex() {
        let digest = canonical_guid(&[0x01, 0x02, 0xff, 0x00]);
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        // Deterministic
        assert_eq!(digest, canonical_guid(&[0x01, 0x02, 0xff, 0x00]));
    }

    #[test]
    fn test_non_guid_string_hashed() {
        let digest = canonical_guid(b"not-a-guid");
        assert_eq!(digest.len(), 64);
    }

    #[test]
    fn test_filetime_conversion() {
        // 1970-01-02T00:00:00Z = (11644473600 + 86400) * 10^7 ticks
        let ticks = (FILETIME_UNIX_OFFSET_SECS + 86_400) * FILETIME_TICKS_PER_SEC;
        assert_eq!(
            filetime_to_iso(Some(&ticks.to_string())).as_deref(),
            Some("1970-01-02T00:00:00Z")
        );
    }

    #[test]
    fn test_filetime_zero_missing_garbage_are_null() {
        assert_eq!(filetime_to_iso(Some("0")), None);
        assert_eq!(filetime_to_iso(Some("-5")), None);
        assert_eq!(filetime_to_iso(Some("never")), None);
        assert_eq!(filetime_to_iso(None), None);
    }

    #[test]
    fn test_group_display_names_parallel_to_member_of() {
        let mut e = entry_with_dn("CN=A,OU=X");
        e.set(
            "memberOf",
            RawValue::TextList(vec![
                "CN=Sales,OU=Groups,DC=corp".to_string(),
                "CN=VPN Users,OU=Groups,DC=corp".to_string(),
            ]),
        );
        let record = normalize(&e, "t").unwrap();
        assert_eq!(
            record.member_of_names,
            Some(vec!["Sales".to_string(), "VPN Users".to_string()])
        );
        assert_eq!(record.member_of.unwrap().len(), 2);
    }

    #[test]
    fn test_uac_labels() {
        let mut e = entry_with_dn("CN=A,OU=X");
        e.set("userAccountControl", RawValue::Text("512".to_string()));
        let record = normalize(&e, "t").unwrap();
        assert_eq!(record.user_account_control, Some(512));
        assert_eq!(
            record.user_account_control_label.as_deref(),
            Some("Normal account")
        );
    }

    #[test]
    fn test_unknown_uac_value_has_null_label() {
        let mut e = entry_with_dn("CN=A,OU=X");
        e.set("userAccountControl", RawValue::Text("99999".to_string()));
        let record = normalize(&e, "t").unwrap();
        assert_eq!(record.user_account_control, Some(99999));
        assert_eq!(record.user_account_control_label, None);
    }

    #[test]
    fn test_when_changed_kept_in_directory_format() {
        let mut e = entry_with_dn("CN=A,OU=X");
        e.set("whenChanged", RawValue::Text("20240115083000.0Z".to_string()));
        let record = normalize(&e, "t").unwrap();
        assert_eq!(record.when_changed.as_deref(), Some("20240115083000.0Z"));
    }
}
