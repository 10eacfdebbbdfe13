//! Schema freshness
//!
//! A schema snapshot is stale when the dataset's event count moved away from
//! the count recorded when the snapshot was taken.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::DatasetSchema;
use crate::pipeline::PipelineResult;
use crate::store::ImportStore;

/// Why a schema no longer reflects its dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    /// Events exist but no schema was ever generated
    NoSchema,
    /// Events were added since the snapshot
    Added,
    /// Events were deleted since the snapshot
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaFreshness {
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<StaleReason>,
    pub current_event_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_event_count: Option<u64>,
}

impl SchemaFreshness {
    /// Compare a snapshot with the current event count
    pub fn evaluate(current_event_count: u64, schema: Option<&DatasetSchema>) -> Self {
        let Some(schema) = schema else {
            let stale = current_event_count > 0;
            return Self {
                stale,
                reason: stale.then_some(StaleReason::NoSchema),
                current_event_count,
                schema_event_count: None,
            };
        };

        let schema_count = schema.event_count_at_creation;
        let reason = match current_event_count.cmp(&schema_count) {
            std::cmp::Ordering::Greater => Some(StaleReason::Added),
            std::cmp::Ordering::Less => Some(StaleReason::Deleted),
            std::cmp::Ordering::Equal => None,
        };
        Self {
            stale: reason.is_some(),
            reason,
            current_event_count,
            schema_event_count: Some(schema_count),
        }
    }
}

/// Freshness of `schema` against the dataset's stored events
pub async fn get_schema_freshness(
    store: &dyn ImportStore,
    dataset_id: Uuid,
    schema: Option<&DatasetSchema>,
) -> PipelineResult<SchemaFreshness> {
    let count = store.count_events(dataset_id).await?;
    Ok(SchemaFreshness::evaluate(count, schema))
}

pub async fn is_schema_stale(
    store: &dyn ImportStore,
    dataset_id: Uuid,
    schema: Option<&DatasetSchema>,
) -> PipelineResult<bool> {
    Ok(get_schema_freshness(store, dataset_id, schema).await?.stale)
}
