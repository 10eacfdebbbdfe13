//! Vocabulary-based role detection

use std::cmp::Ordering;

use tracing::debug;

use super::types::{FieldMappings, FieldRole};
use super::vocabulary::{normalize_field_name, normalize_language, terms_for};

const EXACT_SCORE: f64 = 1.0;
const TOKEN_SCORE: f64 = 0.7;

#[derive(Debug)]
struct Candidate {
    role: FieldRole,
    field_index: usize,
    score: f64,
    /// Position of the matching term in the vocabulary; earlier terms are stronger
    term_rank: usize,
}

/// Detects semantic field roles from field names
#[derive(Debug, Clone, Default)]
pub struct FieldMappingDetector;

impl FieldMappingDetector {
    pub fn new() -> Self {
        Self
    }

    /// Assign roles to `fields` (post-transform names, in row order)
    ///
    /// Each field fills at most one role and each role takes at most one
    /// field. Stronger matches are assigned first.
    pub fn detect(&self, fields: &[String], language: &str) -> FieldMappings {
        let language = normalize_language(language);
        let normalized: Vec<(String, String)> = fields
            .iter()
            .map(|f| {
                let leaf = f.rsplit('.').next().unwrap_or(f.as_str());
                (normalize_field_name(f), normalize_field_name(leaf))
            })
            .collect();

        let mut candidates = Vec::new();
        for role in FieldRole::all() {
            let terms = terms_for(language, role);
            for (field_index, (full, leaf)) in normalized.iter().enumerate() {
                if let Some((score, term_rank)) = best_match(full, leaf, &terms) {
                    candidates.push(Candidate {
                        role,
                        field_index,
                        score,
                        term_rank,
                    });
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.term_rank.cmp(&b.term_rank))
                .then(a.field_index.cmp(&b.field_index))
                .then(a.role.cmp(&b.role))
        });

        let mut mappings = FieldMappings::default();
        let mut used_fields = vec![false; fields.len()];
        for candidate in candidates {
            if used_fields[candidate.field_index] || mappings.get(candidate.role).is_some() {
                continue;
            }
            used_fields[candidate.field_index] = true;
            mappings.set(
                candidate.role,
                fields[candidate.field_index].clone(),
                candidate.score,
            );
        }

        debug!(
            language,
            fields = fields.len(),
            assigned = mappings.assigned().len(),
            "Detected field mappings"
        );
        mappings
    }
}

fn best_match(full: &str, leaf: &str, terms: &[&str]) -> Option<(f64, usize)> {
    // Phase 1: exact normalized name
    if let Some(rank) = terms.iter().position(|t| *t == full || *t == leaf) {
        return Some((EXACT_SCORE, rank));
    }

    // Phase 2: term appears as a whole token sequence
    let padded = format!("_{}_", leaf);
    terms
        .iter()
        .position(|t| padded.contains(&format!("_{}_", t)))
        .map(|rank| (TOKEN_SCORE, rank))
}
