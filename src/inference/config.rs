//! Sampling knobs for schema inference

use serde::{Deserialize, Serialize};

/// How many rows the inferrer reads and whether it keeps example values
///
/// Import detection samples a bounded prefix of the sheet and records
/// examples for the approval screen. Regeneration from stored events only
/// bounds the sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    /// Maximum number of rows to analyze (0 = all)
    pub sample_size: usize,

    /// Keep distinct example values per field
    pub collect_examples: bool,

    /// Examples kept per field when collecting
    pub max_examples: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            sample_size: 0,
            collect_examples: false,
            max_examples: 3,
        }
    }
}

impl InferenceConfig {
    pub fn builder() -> InferenceConfigBuilder {
        InferenceConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct InferenceConfigBuilder {
    config: InferenceConfig,
}

impl InferenceConfigBuilder {
    /// Set the sample size (0 = all rows)
    pub fn sample_size(mut self, size: usize) -> Self {
        self.config.sample_size = size;
        self
    }

    pub fn collect_examples(mut self, collect: bool) -> Self {
        self.config.collect_examples = collect;
        self
    }

    pub fn max_examples(mut self, max: usize) -> Self {
        self.config.max_examples = max;
        self
    }

    pub fn build(self) -> InferenceConfig {
        self.config
    }
}
