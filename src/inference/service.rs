//! Event-based schema regeneration

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::config::InferenceConfig;
use super::diff::diff_schemas;
use super::freshness::{SchemaFreshness, get_schema_freshness};
use super::inferrer::SchemaInferrer;
use crate::models::{DatasetSchema, NewDatasetSchema, SchemaApproval, SchemaSource};
use crate::pipeline::{Clock, PipelineConfig, PipelineError, PipelineResult};
use crate::store::ImportStore;

/// Options for [`SchemaService::infer_schema_from_events`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferOptions {
    /// Events to sample; bounded by configuration
    pub sample_size: Option<usize>,
    /// Regenerate even when the latest schema is fresh
    pub force_regenerate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaInferenceOutcome {
    pub generated: bool,
    /// New version when generated, otherwise the current latest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<DatasetSchema>,
    pub events_sampled: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Generates and reads dataset schema versions
pub struct SchemaService {
    store: Arc<dyn ImportStore>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
}

impl SchemaService {
    pub fn new(store: Arc<dyn ImportStore>, clock: Arc<dyn Clock>, config: PipelineConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Infer a schema from stored events and append it as a new version
    ///
    /// Skipped when the dataset has no events, or when the latest version is
    /// still fresh and `force_regenerate` is off. Concurrent forced calls may
    /// each append a version.
    pub async fn infer_schema_from_events(
        &self,
        dataset_id: Uuid,
        options: InferOptions,
    ) -> PipelineResult<SchemaInferenceOutcome> {
        if self.store.get_dataset(dataset_id).await?.is_none() {
            return Err(PipelineError::not_found("Dataset", dataset_id));
        }

        let event_count = self.store.count_events(dataset_id).await?;
        if event_count == 0 {
            return Ok(SchemaInferenceOutcome {
                generated: false,
                schema: None,
                events_sampled: 0,
                message: Some("No events in dataset to analyze".to_string()),
            });
        }

        let latest = self.store.latest_schema(dataset_id).await?;
        let freshness = SchemaFreshness::evaluate(event_count, latest.as_ref());
        if !options.force_regenerate && !freshness.stale {
            debug!(%dataset_id, "Schema is fresh, skipping regeneration");
            return Ok(SchemaInferenceOutcome {
                generated: false,
                schema: latest,
                events_sampled: 0,
                message: Some("Schema is up-to-date".to_string()),
            });
        }

        let sample_size = self.config.bounded_schema_sample(options.sample_size);
        let events = self.store.sample_events(dataset_id, sample_size).await?;

        let config = InferenceConfig::builder().sample_size(sample_size).build();
        let mut inferrer = SchemaInferrer::with_config(config);
        for event in &events {
            inferrer.add_row(&event.data)?;
        }
        let events_sampled = inferrer.record_count();
        let inferred = inferrer.finalize()?;
        let json_schema = inferred.to_json_schema();
        let summary = diff_schemas(latest.as_ref().map(|s| &s.schema), &json_schema)?;

        let now = self.clock.now();
        let stored = self
            .store
            .append_schema(
                NewDatasetSchema {
                    dataset_id,
                    schema: json_schema,
                    field_metadata: inferred.field_metadata,
                    schema_summary: summary,
                    event_count_at_creation: event_count,
                    approval: SchemaApproval {
                        approved: true,
                        approved_by: None,
                        approved_at: Some(now),
                        auto_approved: true,
                    },
                    source: SchemaSource::Inferred { events_sampled },
                },
                now,
            )
            .await?;

        info!(
            %dataset_id,
            version = stored.version_number,
            events_sampled,
            reason = ?freshness.reason,
            "Generated dataset schema from events"
        );

        Ok(SchemaInferenceOutcome {
            generated: true,
            schema: Some(stored),
            events_sampled,
            message: None,
        })
    }

    /// Highest-version schema, if any
    pub async fn get_latest_schema(
        &self,
        dataset_id: Uuid,
    ) -> PipelineResult<Option<DatasetSchema>> {
        Ok(self.store.latest_schema(dataset_id).await?)
    }

    pub async fn get_schema_freshness(
        &self,
        dataset_id: Uuid,
        schema: Option<&DatasetSchema>,
    ) -> PipelineResult<SchemaFreshness> {
        get_schema_freshness(self.store.as_ref(), dataset_id, schema).await
    }

    pub async fn is_schema_stale(
        &self,
        dataset_id: Uuid,
        schema: Option<&DatasetSchema>,
    ) -> PipelineResult<bool> {
        Ok(self.get_schema_freshness(dataset_id, schema).await?.stale)
    }
}
