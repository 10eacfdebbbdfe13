//! The import stage state machine

use serde::{Deserialize, Serialize};

/// Position of an import job in the fixed processing sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportStage {
    /// Parse the sheet, infer its schema, detect field roles
    DetectSchema,
    /// Compare the detected schema with the dataset's schema
    ValidateSchema,
    /// Suspended until the schema is approved externally
    AwaitApproval,
    /// Resolve duplicate rows
    AnalyzeDuplicates,
    /// Geocode address fields in batches
    GeocodeBatch,
    /// Write events in batches
    CreateEvents,
    /// Terminal success
    Completed,
    /// Terminal failure, left only through recovery or reset
    Failed,
}

/// Every legal forward step. Failure, retry re-entry and administrative
/// reset bypass this table.
const TRANSITIONS: &[(ImportStage, ImportStage)] = &[
    (ImportStage::DetectSchema, ImportStage::ValidateSchema),
    (ImportStage::ValidateSchema, ImportStage::AwaitApproval),
    (ImportStage::AwaitApproval, ImportStage::AnalyzeDuplicates),
    (ImportStage::AnalyzeDuplicates, ImportStage::GeocodeBatch),
    (ImportStage::GeocodeBatch, ImportStage::CreateEvents),
    (ImportStage::CreateEvents, ImportStage::Completed),
];

impl ImportStage {
    /// All stages in processing order, terminal states last
    pub fn all() -> [Self; 8] {
        [
            Self::DetectSchema,
            Self::ValidateSchema,
            Self::AwaitApproval,
            Self::AnalyzeDuplicates,
            Self::GeocodeBatch,
            Self::CreateEvents,
            Self::Completed,
            Self::Failed,
        ]
    }

    /// Get stage name
    pub fn name(&self) -> &'static str {
        match self {
            Self::DetectSchema => "detect-schema",
            Self::ValidateSchema => "validate-schema",
            Self::AwaitApproval => "await-approval",
            Self::AnalyzeDuplicates => "analyze-duplicates",
            Self::GeocodeBatch => "geocode-batch",
            Self::CreateEvents => "create-events",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Get stage description
    pub fn description(&self) -> &'static str {
        match self {
            Self::DetectSchema => "Detect schema and field mappings",
            Self::ValidateSchema => "Validate schema against dataset",
            Self::AwaitApproval => "Wait for schema approval",
            Self::AnalyzeDuplicates => "Analyze duplicate rows",
            Self::GeocodeBatch => "Geocode addresses",
            Self::CreateEvents => "Create events",
            Self::Completed => "Import completed",
            Self::Failed => "Import failed",
        }
    }

    /// The stage a successful handler moves to
    pub fn next(&self) -> Option<Self> {
        TRANSITIONS
            .iter()
            .find(|(from, _)| from == self)
            .map(|(_, to)| *to)
    }

    /// Whether `target` is the legal forward step from this stage
    pub fn can_advance_to(&self, target: Self) -> bool {
        TRANSITIONS.contains(&(*self, target))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Stages that need an external write before they can proceed
    pub fn is_suspension_point(&self) -> bool {
        matches!(self, Self::AwaitApproval)
    }
}

impl std::fmt::Display for ImportStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ImportStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::all()
            .into_iter()
            .find(|stage| stage.name() == normalized)
            .ok_or_else(|| format!("Unknown stage: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_order() {
        let mut stage = ImportStage::DetectSchema;
        let mut visited = vec![stage];
        while let Some(next) = stage.next() {
            visited.push(next);
            stage = next;
        }
        assert_eq!(
            visited,
            vec![
                ImportStage::DetectSchema,
                ImportStage::ValidateSchema,
                ImportStage::AwaitApproval,
                ImportStage::AnalyzeDuplicates,
                ImportStage::GeocodeBatch,
                ImportStage::CreateEvents,
                ImportStage::Completed,
            ]
        );
    }

    #[test]
    fn test_terminal_stages_have_no_successor() {
        assert_eq!(ImportStage::Completed.next(), None);
        assert_eq!(ImportStage::Failed.next(), None);
        assert!(!ImportStage::Failed.can_advance_to(ImportStage::DetectSchema));
    }

    #[test]
    fn test_no_skipping() {
        assert!(ImportStage::DetectSchema.can_advance_to(ImportStage::ValidateSchema));
        assert!(!ImportStage::DetectSchema.can_advance_to(ImportStage::CreateEvents));
        assert!(!ImportStage::CreateEvents.can_advance_to(ImportStage::DetectSchema));
    }

    #[test]
    fn test_stage_parse_and_serde() {
        for stage in ImportStage::all() {
            assert_eq!(stage.name().parse::<ImportStage>().unwrap(), stage);
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{}\"", stage.name()));
        }
        assert_eq!(
            "geocode_batch".parse::<ImportStage>().unwrap(),
            ImportStage::GeocodeBatch
        );
        assert!("parsing".parse::<ImportStage>().is_err());
    }
}
