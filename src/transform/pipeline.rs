//! Ordered transform fold over a row

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cast::cast_value;
use super::error::{TransformError, TransformResult};
use super::path::{get_path, remove_path, set_path};
use super::types::{CastFailurePolicy, CastStrategy, FieldType, ImportTransform};
use crate::models::{Dataset, Row};

/// One executable step, built from the active configured transforms
#[derive(Debug, Clone, PartialEq)]
pub enum TransformStep {
    Rename {
        from: String,
        to: String,
    },
    Cast {
        field: String,
        from_type: FieldType,
        to_type: FieldType,
        strategy: CastStrategy,
        on_failure: CastFailurePolicy,
    },
}

impl TransformStep {
    /// Field the step reads
    pub fn source_field(&self) -> &str {
        match self {
            TransformStep::Rename { from, .. } => from,
            TransformStep::Cast { field, .. } => field,
        }
    }

    fn apply(&self, mut acc: TransformedRow) -> TransformedRow {
        match self {
            TransformStep::Rename { from, to } => {
                if let Some(value) = remove_path(&mut acc.row, from) {
                    set_path(&mut acc.row, to, value);
                }
            }
            TransformStep::Cast {
                field,
                from_type,
                to_type,
                strategy,
                on_failure,
            } => {
                let Some(value) = get_path(&acc.row, field) else {
                    return acc;
                };
                match cast_value(field, value, *from_type, *to_type, *strategy) {
                    Ok(converted) => set_path(&mut acc.row, field, converted),
                    Err(e) => {
                        match on_failure {
                            CastFailurePolicy::KeepOriginal => {}
                            CastFailurePolicy::SetNull => {
                                set_path(&mut acc.row, field, serde_json::Value::Null)
                            }
                            CastFailurePolicy::RejectRow => acc.rejected = true,
                        }
                        acc.warnings.push(TransformWarning {
                            field: field.clone(),
                            message: e.to_string(),
                            policy: *on_failure,
                        });
                    }
                }
            }
        }
        acc
    }
}

/// A per-row cast failure; never aborts the batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformWarning {
    pub field: String,
    pub message: String,
    pub policy: CastFailurePolicy,
}

/// Output of running the pipeline over one row
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedRow {
    pub row: Row,
    pub warnings: Vec<TransformWarning>,
    /// A cast with the reject-row policy failed
    pub rejected: bool,
}

impl TransformedRow {
    fn new(row: Row) -> Self {
        Self {
            row,
            warnings: Vec::new(),
            rejected: false,
        }
    }
}

/// Import transforms followed by dataset type transformations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformPipeline {
    steps: Vec<TransformStep>,
}

impl TransformPipeline {
    /// Build from configured transforms, dropping inactive ones
    pub fn new(transforms: &[ImportTransform]) -> Self {
        let steps = transforms
            .iter()
            .filter(|t| t.is_active())
            .map(|t| match t {
                ImportTransform::Rename { from, to, .. } => TransformStep::Rename {
                    from: from.clone(),
                    to: to.clone(),
                },
                ImportTransform::TypeCast {
                    from,
                    from_type,
                    to_type,
                    strategy,
                    on_failure,
                    ..
                } => TransformStep::Cast {
                    field: from.clone(),
                    from_type: *from_type,
                    to_type: *to_type,
                    strategy: *strategy,
                    on_failure: *on_failure,
                },
            })
            .collect();
        Self { steps }
    }

    /// Full pipeline for a dataset
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let mut pipeline = Self::new(&dataset.import_transforms);
        pipeline.steps.extend(
            dataset
                .type_transformations
                .iter()
                .filter(|t| t.enabled)
                .map(|t| TransformStep::Cast {
                    field: t.field_path.clone(),
                    from_type: t.from_type,
                    to_type: t.to_type,
                    strategy: t.strategy,
                    on_failure: t.on_failure,
                }),
        );
        pipeline
    }

    pub fn steps(&self) -> &[TransformStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Reject configurations whose steps cannot see the fields they name
    pub fn validate(&self) -> TransformResult<()> {
        let mut moved: HashMap<&str, &str> = HashMap::new();
        for (index, step) in self.steps.iter().enumerate() {
            let source = step.source_field();
            if source.trim().is_empty() {
                return Err(TransformError::Invalid {
                    index,
                    reason: "source field is empty".to_string(),
                });
            }
            if let Some(renamed_to) = moved.get(source) {
                return Err(TransformError::RenamedAway {
                    index,
                    field: source.to_string(),
                    renamed_to: renamed_to.to_string(),
                });
            }
            if let TransformStep::Rename { from, to } = step {
                if to.trim().is_empty() || from == to {
                    return Err(TransformError::Invalid {
                        index,
                        reason: format!("cannot rename '{}' to '{}'", from, to),
                    });
                }
                moved.remove(to.as_str());
                moved.insert(from.as_str(), to.as_str());
            }
        }
        Ok(())
    }

    /// Fold every step over `row`, left to right
    pub fn apply(&self, row: Row) -> TransformedRow {
        let result = self
            .steps
            .iter()
            .fold(TransformedRow::new(row), |acc, step| {
                if acc.rejected { acc } else { step.apply(acc) }
            });
        if !result.warnings.is_empty() {
            debug!(
                warnings = result.warnings.len(),
                rejected = result.rejected,
                "Row transformed with warnings"
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::TypeTransformation;
    use serde_json::{Value, json};

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn cast(field: &str, to: FieldType, on_failure: CastFailurePolicy) -> ImportTransform {
        ImportTransform::TypeCast {
            from: field.to_string(),
            from_type: FieldType::String,
            to_type: to,
            strategy: CastStrategy::Parse,
            on_failure,
            active: true,
        }
    }

    #[test]
    fn test_rename_then_cast() {
        let pipeline = TransformPipeline::new(&[
            ImportTransform::rename("A", "B"),
            cast("B", FieldType::Number, CastFailurePolicy::KeepOriginal),
        ]);
        assert!(pipeline.validate().is_ok());

        let out = pipeline.apply(row(json!({"A": "12.5", "C": "x"})));
        assert_eq!(out.row.get("B"), Some(&json!(12.5)));
        assert!(!out.row.contains_key("A"));
        assert_eq!(out.row.get("C"), Some(&json!("x")));
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_cast_of_renamed_away_field_is_invalid() {
        let pipeline = TransformPipeline::new(&[
            ImportTransform::rename("A", "B"),
            cast("A", FieldType::Number, CastFailurePolicy::KeepOriginal),
        ]);
        let err = pipeline.validate().unwrap_err();
        assert!(matches!(err, TransformError::RenamedAway { index: 1, .. }));
    }

    #[test]
    fn test_rename_back_is_valid() {
        let pipeline = TransformPipeline::new(&[
            ImportTransform::rename("A", "B"),
            ImportTransform::rename("B", "A"),
            cast("A", FieldType::Number, CastFailurePolicy::KeepOriginal),
        ]);
        assert!(pipeline.validate().is_ok());
    }

    #[test]
    fn test_failure_policies() {
        let input = row(json!({"n": "abc"}));

        let run = |policy| {
            TransformPipeline::new(&[cast("n", FieldType::Number, policy)]).apply(input.clone())
        };

        let keep = run(CastFailurePolicy::KeepOriginal);
        assert_eq!(keep.row.get("n"), Some(&json!("abc")));
        assert_eq!(keep.warnings.len(), 1);
        assert!(!keep.rejected);

        let null = run(CastFailurePolicy::SetNull);
        assert_eq!(null.row.get("n"), Some(&Value::Null));

        let reject = run(CastFailurePolicy::RejectRow);
        assert!(reject.rejected);
    }

    #[test]
    fn test_inactive_transforms_are_skipped() {
        let pipeline = TransformPipeline::new(&[ImportTransform::Rename {
            from: "a".to_string(),
            to: "b".to_string(),
            active: false,
        }]);
        assert!(pipeline.is_empty());
        let out = pipeline.apply(row(json!({"a": 1})));
        assert!(out.row.contains_key("a"));
    }

    #[test]
    fn test_dataset_type_transformations_run_last() {
        let dataset = Dataset::new("events")
            .with_import_transforms(vec![ImportTransform::rename("cnt", "count")])
            .with_type_transformations(vec![TypeTransformation {
                field_path: "count".to_string(),
                from_type: FieldType::String,
                to_type: FieldType::Integer,
                strategy: CastStrategy::Parse,
                on_failure: CastFailurePolicy::KeepOriginal,
                enabled: true,
            }]);
        let out = TransformPipeline::from_dataset(&dataset).apply(row(json!({"cnt": "3"})));
        assert_eq!(out.row.get("count"), Some(&json!(3)));
    }
}
