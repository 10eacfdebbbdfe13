//! Duplicate detection
//!
//! Two independent hashes: a whole-file content hash catching byte-identical
//! resubmissions, and per-row keys derived from the dataset's id strategy
//! catching repeated rows within a file and against stored events.

mod analyzer;

use sha2::{Digest, Sha256};

use crate::models::{IdStrategyKind, Row};
use crate::transform::get_path;

pub use analyzer::{DuplicateAnalyzer, DuplicateSummary};

/// SHA-256 of raw file bytes, hex encoded
///
/// Depends on content only; names and timestamps never enter the hash.
pub fn file_content_hash(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

/// SHA-256 of a row's canonical JSON
///
/// `serde_json::Map` keeps keys sorted, so key order in the source does not
/// change the fingerprint.
pub fn row_fingerprint(row: &Row) -> String {
    let canonical = serde_json::Value::Object(row.clone()).to_string();
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

/// Dedup key of a row under an id strategy
///
/// An external id that is missing or null falls back to the row fingerprint.
pub fn dedup_key(row: &Row, strategy: &IdStrategyKind) -> String {
    match strategy {
        IdStrategyKind::Auto => row_fingerprint(row),
        IdStrategyKind::External { path } => match get_path(row, path) {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                format!("ext:{}", s.trim())
            }
            Some(serde_json::Value::Null) | Some(serde_json::Value::String(_)) | None => {
                row_fingerprint(row)
            }
            Some(other) => format!("ext:{}", other),
        },
        IdStrategyKind::Computed { fields } => {
            let selected: Vec<serde_json::Value> = fields
                .iter()
                .map(|f| get_path(row, f).cloned().unwrap_or(serde_json::Value::Null))
                .collect();
            let canonical = serde_json::Value::Array(selected).to_string();
            format!("cmp:{:x}", Sha256::digest(canonical.as_bytes()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_file_hash_is_content_only() {
        let a = file_content_hash(b"title,date\nA,2024-01-01\n");
        let b = file_content_hash(b"title,date\nA,2024-01-01\n");
        let c = file_content_hash(b"title,date\nB,2024-01-01\n");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_row_fingerprint_ignores_key_order() {
        let a = row(json!({"a": 1, "b": "x"}));
        let b = row(json!({"b": "x", "a": 1}));
        assert_eq!(row_fingerprint(&a), row_fingerprint(&b));
    }

    #[test]
    fn test_external_key() {
        let strategy = IdStrategyKind::External {
            path: "meta.id".to_string(),
        };
        let with_id = row(json!({"meta": {"id": "E-1"}, "title": "a"}));
        let other_title = row(json!({"meta": {"id": "E-1"}, "title": "b"}));
        assert_eq!(dedup_key(&with_id, &strategy), "ext:E-1");
        assert_eq!(
            dedup_key(&with_id, &strategy),
            dedup_key(&other_title, &strategy)
        );

        let numeric = row(json!({"meta": {"id": 7}}));
        assert_eq!(dedup_key(&numeric, &strategy), "ext:7");

        let missing = row(json!({"title": "a"}));
        assert_eq!(dedup_key(&missing, &strategy), row_fingerprint(&missing));
    }

    #[test]
    fn test_computed_key_uses_selected_fields() {
        let strategy = IdStrategyKind::Computed {
            fields: vec!["title".to_string(), "date".to_string()],
        };
        let a = row(json!({"title": "A", "date": "2024-01-01", "note": "x"}));
        let b = row(json!({"title": "A", "date": "2024-01-01", "note": "y"}));
        let c = row(json!({"title": "A", "date": "2024-01-02"}));
        assert_eq!(dedup_key(&a, &strategy), dedup_key(&b, &strategy));
        assert_ne!(dedup_key(&a, &strategy), dedup_key(&c, &strategy));
    }
}
