//! validate-schema: compare the detected schema with the dataset's latest version

use tracing::{info, warn};

use super::{StageContext, StageStatus};
use crate::inference::diff_schemas;
use crate::models::{ImportJob, SchemaConfig, SchemaSummary, SchemaValidation};
use crate::pipeline::{ImportStage, PipelineError, PipelineResult};

pub(super) async fn run(ctx: &StageContext<'_>, job: &mut ImportJob) -> PipelineResult<StageStatus> {
    let detected = job.detected_schema.as_ref().ok_or_else(|| {
        PipelineError::stage(ImportStage::ValidateSchema, "No detected schema on job")
    })?;

    let latest = ctx.store.latest_schema(job.dataset_id).await?;
    let summary = diff_schemas(latest.as_ref().map(|s| &s.schema), detected)?;
    let breaking_changes: Vec<_> = summary.breaking_changes().into_iter().cloned().collect();
    let auto_approved = auto_approves(&summary, ctx.dataset.schema_config, latest.is_none());
    let now = ctx.clock.now();

    // An approval survives re-validation only if the diff is unchanged
    let prior = std::mem::take(&mut job.schema_validation);
    let keep_prior = prior.approved && prior.summary == summary;

    if !breaking_changes.is_empty() {
        warn!(
            job_id = %job.id,
            breaking = breaking_changes.len(),
            "Detected schema has incompatible type changes"
        );
    }
    info!(
        job_id = %job.id,
        new_fields = summary.new_fields.len(),
        removed_fields = summary.removed_fields.len(),
        type_changes = summary.type_changes.len(),
        auto_approved,
        "Validated detected schema"
    );

    job.schema_validation = SchemaValidation {
        validated: true,
        is_compatible: breaking_changes.is_empty(),
        requires_approval: !auto_approved,
        approved: auto_approved || keep_prior,
        approved_by: if keep_prior { prior.approved_by } else { None },
        approved_at: if auto_approved {
            Some(now)
        } else if keep_prior {
            prior.approved_at
        } else {
            None
        },
        auto_approved,
        summary,
        breaking_changes,
    };
    Ok(StageStatus::Done)
}

/// Whether a diff can be accepted without an administrator
///
/// Unchanged schemas always pass. A locked dataset approves nothing else.
/// Otherwise additive changes (including a first schema) pass when the
/// dataset grows automatically.
fn auto_approves(summary: &SchemaSummary, config: SchemaConfig, first_schema: bool) -> bool {
    if !summary.has_changes() {
        return true;
    }
    if config.locked || !config.auto_grow {
        return false;
    }
    first_schema || summary.is_additive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TypeChange;

    fn additive() -> SchemaSummary {
        SchemaSummary {
            total_fields: 2,
            new_fields: vec!["venue".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_unchanged_schema_is_always_approved() {
        let locked = SchemaConfig {
            locked: true,
            auto_grow: false,
        };
        assert!(auto_approves(&SchemaSummary::default(), locked, false));
    }

    #[test]
    fn test_additive_changes_follow_auto_grow() {
        assert!(auto_approves(&additive(), SchemaConfig::default(), false));
        assert!(auto_approves(&additive(), SchemaConfig::default(), true));

        let no_grow = SchemaConfig {
            locked: false,
            auto_grow: false,
        };
        assert!(!auto_approves(&additive(), no_grow, true));

        let locked = SchemaConfig {
            locked: true,
            auto_grow: true,
        };
        assert!(!auto_approves(&additive(), locked, false));
    }

    #[test]
    fn test_type_changes_need_approval() {
        let mut summary = additive();
        summary.type_changes.push(TypeChange {
            path: "capacity".to_string(),
            from: "integer".to_string(),
            to: "number".to_string(),
            compatible: true,
        });
        assert!(!auto_approves(&summary, SchemaConfig::default(), false));
    }
}
