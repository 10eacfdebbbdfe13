//! Field mapping result types

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::FieldMappingOverrides;

/// Semantic role a field can fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldRole {
    Title,
    Description,
    Timestamp,
    Location,
    Latitude,
    Longitude,
}

impl FieldRole {
    pub fn all() -> [Self; 6] {
        [
            FieldRole::Title,
            FieldRole::Description,
            FieldRole::Timestamp,
            FieldRole::Location,
            FieldRole::Latitude,
            FieldRole::Longitude,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldRole::Title => "title",
            FieldRole::Description => "description",
            FieldRole::Timestamp => "timestamp",
            FieldRole::Location => "location",
            FieldRole::Latitude => "latitude",
            FieldRole::Longitude => "longitude",
        }
    }
}

impl fmt::Display for FieldRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Detected field roles; absent roles are a valid outcome
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMappings {
    pub title_path: Option<String>,
    pub description_path: Option<String>,
    pub timestamp_path: Option<String>,
    pub location_path: Option<String>,
    pub latitude_path: Option<String>,
    pub longitude_path: Option<String>,
    /// Role name -> match confidence
    #[serde(default)]
    pub confidence: BTreeMap<String, f64>,
}

impl FieldMappings {
    pub fn get(&self, role: FieldRole) -> Option<&str> {
        self.slot(role).as_deref()
    }

    pub fn set(&mut self, role: FieldRole, path: impl Into<String>, confidence: f64) {
        *self.slot_mut(role) = Some(path.into());
        self.confidence.insert(role.name().to_string(), confidence);
    }

    /// Roles that were assigned
    pub fn assigned(&self) -> Vec<(FieldRole, &str)> {
        FieldRole::all()
            .into_iter()
            .filter_map(|role| self.get(role).map(|path| (role, path)))
            .collect()
    }

    /// Pinned roles replace detected ones
    pub fn apply_overrides(&mut self, overrides: &FieldMappingOverrides) {
        let pinned = [
            (FieldRole::Title, &overrides.title_path),
            (FieldRole::Description, &overrides.description_path),
            (FieldRole::Timestamp, &overrides.timestamp_path),
            (FieldRole::Location, &overrides.location_path),
            (FieldRole::Latitude, &overrides.latitude_path),
            (FieldRole::Longitude, &overrides.longitude_path),
        ];
        for (role, path) in pinned {
            if let Some(path) = path {
                self.set(role, path.clone(), 1.0);
            }
        }
    }

    fn slot(&self, role: FieldRole) -> &Option<String> {
        match role {
            FieldRole::Title => &self.title_path,
            FieldRole::Description => &self.description_path,
            FieldRole::Timestamp => &self.timestamp_path,
            FieldRole::Location => &self.location_path,
            FieldRole::Latitude => &self.latitude_path,
            FieldRole::Longitude => &self.longitude_path,
        }
    }

    fn slot_mut(&mut self, role: FieldRole) -> &mut Option<String> {
        match role {
            FieldRole::Title => &mut self.title_path,
            FieldRole::Description => &mut self.description_path,
            FieldRole::Timestamp => &mut self.timestamp_path,
            FieldRole::Location => &mut self.location_path,
            FieldRole::Latitude => &mut self.latitude_path,
            FieldRole::Longitude => &mut self.longitude_path,
        }
    }
}
