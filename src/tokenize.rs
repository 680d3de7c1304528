//! Search tokenizer.
//!
//! Turns a record's searchable attribute values into a deterministic set of
//! lowercase tokens. Values are lowercased and split on every run of
//! characters that are not letters, digits, `@`, `.`, `+`, or `-`; fragments
//! shorter than two characters are discarded.
//!
//! Pure and side-effect-free: the same attributes always yield the same set.

use std::collections::BTreeSet;

use crate::models::DirectoryRecord;

/// Minimum token length; shorter fragments carry no search value.
const MIN_TOKEN_LEN: usize = 2;

fn keep(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-')
}

/// Tokenize an ordered list of attribute values (missing values as `None`).
///
/// Returned as a `BTreeSet` so persisted token sets are byte-stable across
/// runs; callers must still treat it as an unordered collection.
pub fn tokenize<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();
    for value in values.into_iter().flatten() {
        let lowered = value.to_lowercase();
        for fragment in lowered.split(|c: char| !keep(c)) {
            if fragment.chars().count() >= MIN_TOKEN_LEN {
                tokens.insert(fragment.to_string());
            }
        }
    }
    tokens
}

/// Token set for a record's searchable attributes: account name, principal
/// name, email, names, title, department, company, office, city, country,
/// phones, and all group display names.
pub fn record_tokens(record: &DirectoryRecord) -> BTreeSet<String> {
    let mut values: Vec<Option<&str>> = vec![
        record.sam_account_name.as_deref(),
        record.user_principal_name.as_deref(),
        record.mail.as_deref(),
        record.display_name.as_deref(),
        record.given_name.as_deref(),
        record.surname.as_deref(),
        record.title.as_deref(),
        record.department.as_deref(),
        record.company.as_deref(),
        record.office.as_deref(),
        record.city.as_deref(),
        record.country.as_deref(),
        record.telephone_number.as_deref(),
        record.mobile.as_deref(),
        record.ip_phone.as_deref(),
    ];
    if let Some(names) = &record.member_of_names {
        values.extend(names.iter().map(|n| Some(n.as_str())));
    }
    tokenize(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(values: &[&str]) -> BTreeSet<String> {
        tokenize(values.iter().map(|v| Some(*v)))
    }

    #[test]
    fn test_lowercase_and_split() {
        let t = toks(&["Jane Doe", "jane.doe@x.com"]);
        assert!(t.contains("jane"));
        assert!(t.contains("doe"));
        assert!(t.contains("jane.doe@x.com"));
        assert!(!t.contains("Jane"));
    }

    #[test]
    fn test_splits_only_on_disallowed_chars() {
        let t = toks(&["a+b-c (ext. 42)"]);
        // '@', '.', '+', '-' do not split; parens and spaces do
        assert!(t.contains("a+b-c"));
        assert!(t.contains("ext."));
        assert!(t.contains("42"));
    }

    #[test]
    fn test_short_fragments_discarded() {
        let t = toks(&["a b cd"]);
        assert_eq!(t.len(), 1);
        assert!(t.contains("cd"));
    }

    #[test]
    fn test_none_values_and_empty() {
        assert!(tokenize([None, Some("")]).is_empty());
    }

    #[test]
    fn test_duplicates_collapse() {
        let t = toks(&["Sales Sales", "sales"]);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_deterministic() {
        let a = toks(&["Jane Doe", "Engineering", "+1 555 0100"]);
        let b = toks(&["Jane Doe", "Engineering", "+1 555 0100"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_phone_tokens() {
        let t = toks(&["+1 (555) 010-0199"]);
        assert!(t.contains("+1"));
        assert!(t.contains("555"));
        assert!(t.contains("010-0199"));
    }
}
