use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::package::Package;

/// Immutable snapshot of a package as it was at `version`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PackageVersionRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub package_id: ObjectId,
    pub version: u32,
    pub snapshot: Package,
    pub modified_by: String,
    pub modified_at: DateTime<Utc>,
    pub change_description: Option<String>,
    pub changed_fields: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FieldDiff {
    pub field: String,
    pub old_value: serde_json::Value,
    pub new_value: serde_json::Value,
}

/// Version record without the snapshot body, for list views
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct VersionSummary {
    pub version: u32,
    pub modified_by: String,
    pub modified_at: DateTime<Utc>,
    pub change_description: Option<String>,
    pub changed_fields: Vec<String>,
}

impl From<&PackageVersionRecord> for VersionSummary {
    fn from(record: &PackageVersionRecord) -> Self {
        Self {
            version: record.version,
            modified_by: record.modified_by.clone(),
            modified_at: record.modified_at,
            change_description: record.change_description.clone(),
            changed_fields: record.changed_fields.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AuditTrail {
    pub package_id: ObjectId,
    pub total_versions: usize,
    pub unique_contributors: Vec<String>,
    pub first_created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub recent_changes: Vec<VersionSummary>,
}
