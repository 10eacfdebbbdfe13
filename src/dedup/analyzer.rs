//! Row-level duplicate analysis

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::DuplicateStrategy;

/// Result of duplicate analysis for one job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateSummary {
    pub strategy: DuplicateStrategy,
    pub total_rows: usize,
    pub unique_rows: usize,
    /// Repeats within the file
    pub internal_duplicates: usize,
    /// Rows matching events already in the dataset
    pub external_duplicates: usize,
    /// Row indices excluded from event creation, ascending
    pub skipped_rows: Vec<usize>,
}

impl DuplicateSummary {
    pub fn is_skipped(&self, row_index: usize) -> bool {
        self.skipped_rows.binary_search(&row_index).is_ok()
    }
}

/// Applies a duplicate strategy to per-row keys
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateAnalyzer {
    strategy: DuplicateStrategy,
}

impl DuplicateAnalyzer {
    pub fn new(strategy: DuplicateStrategy) -> Self {
        Self { strategy }
    }

    /// Analyze `keys` (one per row, in row order)
    ///
    /// `existing` holds keys already used by events of the dataset; only the
    /// skip strategy consults it.
    pub fn analyze(&self, keys: &[String], existing: &HashSet<String>) -> DuplicateSummary {
        let mut skipped = vec![false; keys.len()];
        let mut internal = 0;
        let mut external = 0;

        match self.strategy {
            DuplicateStrategy::Skip | DuplicateStrategy::KeepFirst => {
                let mut seen: HashSet<&str> = HashSet::new();
                for (index, key) in keys.iter().enumerate() {
                    if self.strategy.checks_existing_events() && existing.contains(key) {
                        skipped[index] = true;
                        external += 1;
                    } else if !seen.insert(key.as_str()) {
                        skipped[index] = true;
                        internal += 1;
                    }
                }
            }
            DuplicateStrategy::KeepLast => {
                let mut last: HashMap<&str, usize> = HashMap::new();
                for (index, key) in keys.iter().enumerate() {
                    last.insert(key.as_str(), index);
                }
                for (index, key) in keys.iter().enumerate() {
                    if last.get(key.as_str()) != Some(&index) {
                        skipped[index] = true;
                        internal += 1;
                    }
                }
            }
        }

        let skipped_rows: Vec<usize> = skipped
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.then_some(i))
            .collect();

        DuplicateSummary {
            strategy: self.strategy,
            total_rows: keys.len(),
            unique_rows: keys.len() - skipped_rows.len(),
            internal_duplicates: internal,
            external_duplicates: external,
            skipped_rows,
        }
    }
}
