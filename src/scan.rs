//! Cache entry analysis: signature matching, hash grouping, reporting.
//!
//! Operates on the raw entries dumped by the remote side. Matching is
//! best-effort by design: empty values, malformed JSON, and forms without
//! the reference signature are skipped silently and never affect the exit
//! code.

use crate::remote::CacheEntry;
use crate::resolver::Environment;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// First two page paths a form must carry, in order, exact match.
pub const REFERENCE_SIGNATURE: [&str; 2] = [
    "/proposal",
    "/are-you-applying-for-pillar-1---foundations-funding",
];

/// Forms sharing byte-identical cached content, keyed by digest.
#[derive(Debug, Clone)]
pub struct MatchGroup {
    /// Full SHA-256 hex digest of the raw cached value
    pub digest: String,
    /// Byte length of the raw cached value
    pub byte_size: usize,
    /// Total page count of the form configuration
    pub page_count: usize,
    /// Form IDs in first-seen order
    pub form_ids: Vec<String>,
}

/// Pulls the page list out of a parsed form.
///
/// Some cache entries nest the form under a `configuration` object, others
/// store it at the top level.
fn form_pages(form: &Value) -> Option<&Vec<Value>> {
    form.get("configuration")
        .and_then(|config| config.get("pages"))
        .or_else(|| form.get("pages"))
        .and_then(Value::as_array)
}

/// Whether the form's first two pages equal the reference signature.
fn matches_signature(pages: &[Value]) -> bool {
    if pages.len() < REFERENCE_SIGNATURE.len() {
        return false;
    }
    REFERENCE_SIGNATURE
        .iter()
        .enumerate()
        .all(|(i, path)| pages[i].get("path").and_then(Value::as_str) == Some(*path))
}

/// Groups matching entries by SHA-256 digest of their raw value.
///
/// Group order and member order both follow first appearance in the dump.
/// Entries that are empty, unparseable, or non-matching are skipped.
pub fn group_entries(entries: &[CacheEntry], key_prefix: &str) -> Vec<MatchGroup> {
    let mut groups: Vec<MatchGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        if entry.value.is_empty() {
            continue;
        }
        let Ok(form) = serde_json::from_str::<Value>(&entry.value) else {
            continue;
        };
        let Some(pages) = form_pages(&form) else {
            continue;
        };
        if !matches_signature(pages) {
            continue;
        }

        // Hash the raw text, not the parsed value: formatting differences
        // must split groups.
        let digest = format!("{:x}", Sha256::digest(entry.value.as_bytes()));
        let form_id = entry
            .key
            .strip_prefix(key_prefix)
            .unwrap_or(&entry.key)
            .to_string();

        match index.get(&digest) {
            Some(&i) => groups[i].form_ids.push(form_id),
            None => {
                index.insert(digest.clone(), groups.len());
                groups.push(MatchGroup {
                    digest,
                    byte_size: entry.value.len(),
                    page_count: pages.len(),
                    form_ids: vec![form_id],
                });
            }
        }
    }

    groups
}

/// Form designer edit URL for a form in the given environment.
pub fn edit_url(environment: Environment, form_id: &str) -> String {
    format!(
        "https://form-designer.{environment}.access-funding.communities.gov.uk/forms/{form_id}/edit"
    )
}

/// Renders the grouped report. Zero groups is a valid, empty report.
pub fn render_report(groups: &[MatchGroup], environment: Environment) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} group(s) of forms match the reference page signature\n",
        groups.len()
    ));

    for group in groups {
        let short_digest = group.digest.get(..12).unwrap_or(&group.digest);
        out.push('\n');
        out.push_str(&format!(
            "[{short_digest}] {} form(s), {} pages, {} bytes\n",
            group.form_ids.len(),
            group.page_count,
            group.byte_size
        ));
        for form_id in &group.form_ids {
            out.push_str(&format!("  {}\n", edit_url(environment, form_id)));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, value: &str) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    /// A minimal matching form body with the given trailing page.
    fn matching_form(extra_page: &str) -> String {
        format!(
            r#"{{"configuration":{{"pages":[{{"path":"/proposal"}},{{"path":"/are-you-applying-for-pillar-1---foundations-funding"}},{{"path":"{extra_page}"}}]}}}}"#
        )
    }

    #[test]
    fn test_matching_form_with_nested_configuration() {
        let entries = vec![entry("forms:cache:alpha", &matching_form("/summary"))];
        let groups = group_entries(&entries, "forms:cache:");

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].form_ids, vec!["alpha"]);
        assert_eq!(groups[0].page_count, 3);
    }

    #[test]
    fn test_matching_form_with_top_level_pages() {
        let value = r#"{"pages":[{"path":"/proposal"},{"path":"/are-you-applying-for-pillar-1---foundations-funding"}]}"#;
        let groups = group_entries(&[entry("forms:cache:beta", value)], "forms:cache:");

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].form_ids, vec!["beta"]);
        assert_eq!(groups[0].page_count, 2);
        assert_eq!(groups[0].byte_size, value.len());
    }

    #[test]
    fn test_swapped_pages_are_excluded() {
        let value = r#"{"pages":[{"path":"/are-you-applying-for-pillar-1---foundations-funding"},{"path":"/proposal"}]}"#;
        assert!(group_entries(&[entry("forms:cache:x", value)], "forms:cache:").is_empty());
    }

    #[test]
    fn test_wrong_first_page_is_excluded() {
        let value = r#"{"pages":[{"path":"/intro"},{"path":"/are-you-applying-for-pillar-1---foundations-funding"}]}"#;
        assert!(group_entries(&[entry("forms:cache:x", value)], "forms:cache:").is_empty());
    }

    #[test]
    fn test_single_page_form_is_excluded() {
        let value = r#"{"pages":[{"path":"/proposal"}]}"#;
        assert!(group_entries(&[entry("forms:cache:x", value)], "forms:cache:").is_empty());
    }

    #[test]
    fn test_malformed_and_empty_values_are_skipped() {
        let entries = vec![
            entry("forms:cache:bad", "{not json"),
            entry("forms:cache:empty", ""),
            entry("forms:cache:no-pages", "{}"),
            entry("forms:cache:good", &matching_form("/end")),
        ];

        let groups = group_entries(&entries, "forms:cache:");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].form_ids, vec!["good"]);
    }

    #[test]
    fn test_identical_raw_values_share_a_group() {
        let value = matching_form("/end");
        let entries = vec![
            entry("forms:cache:a", &value),
            entry("forms:cache:b", &value),
        ];

        let groups = group_entries(&entries, "forms:cache:");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].form_ids, vec!["a", "b"]);
    }

    #[test]
    fn test_one_byte_difference_splits_groups() {
        let entries = vec![
            entry("forms:cache:a", &matching_form("/end")),
            entry("forms:cache:b", &matching_form("/end2")),
        ];

        let groups = group_entries(&entries, "forms:cache:");
        assert_eq!(groups.len(), 2);
        assert_ne!(groups[0].digest, groups[1].digest);
    }

    #[test]
    fn test_digest_is_of_raw_text() {
        let value = matching_form("/end");
        let groups = group_entries(&[entry("forms:cache:a", &value)], "forms:cache:");

        let expected = format!("{:x}", Sha256::digest(value.as_bytes()));
        assert_eq!(groups[0].digest, expected);
        assert_eq!(groups[0].digest.len(), 64);
    }

    #[test]
    fn test_unprefixed_key_is_kept_verbatim() {
        let groups = group_entries(
            &[entry("other:namespace:a", &matching_form("/end"))],
            "forms:cache:",
        );
        assert_eq!(groups[0].form_ids, vec!["other:namespace:a"]);
    }

    #[test]
    fn test_report_scenario_two_duplicates_one_nonmatching() {
        let duplicate = matching_form("/summary");
        let nonmatching = r#"{"pages":[{"path":"/intro"},{"path":"/are-you-applying-for-pillar-1---foundations-funding"}]}"#;
        let entries = vec![
            entry("forms:cache:A", &duplicate),
            entry("forms:cache:B", &duplicate),
            entry("forms:cache:C", nonmatching),
        ];

        let groups = group_entries(&entries, "forms:cache:");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].form_ids, vec!["A", "B"]);

        let report = render_report(&groups, Environment::Uat);
        assert!(report.contains("1 group(s)"));
        assert!(report.contains("2 form(s)"));
        assert!(report.contains("/forms/A/edit"));
        assert!(report.contains("/forms/B/edit"));
        assert!(!report.contains("C"));
    }

    #[test]
    fn test_empty_report() {
        let report = render_report(&[], Environment::Dev);
        assert!(report.contains("0 group(s)"));
        assert_eq!(report.lines().count(), 1);
    }

    #[test]
    fn test_report_truncates_digest() {
        let groups = group_entries(
            &[entry("forms:cache:a", &matching_form("/end"))],
            "forms:cache:",
        );
        let report = render_report(&groups, Environment::Test);

        let short = &groups[0].digest[..12];
        assert!(report.contains(&format!("[{short}]")));
        assert!(!report.contains(&groups[0].digest));
    }

    #[test]
    fn test_edit_url_per_environment() {
        assert_eq!(
            edit_url(Environment::Prod, "my-form"),
            "https://form-designer.prod.access-funding.communities.gov.uk/forms/my-form/edit"
        );
    }
}
