use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::Utc;
use log::{error, info};
use mongodb::bson::oid::ObjectId;
use serde_json::{Map, Value};

use crate::db::repository::{PackageHistoryRepository, PackageRepository};
use crate::errors::{HistoryError, RepositoryError};
use crate::models::{
    package::Package,
    package_history::{AuditTrail, FieldDiff, PackageVersionRecord, VersionSummary},
};

/// Fields that change on every write and say nothing about the content.
const BOOKKEEPING_FIELDS: [&str; 4] = ["_id", "version", "updated_at", "last_modified_by"];
const RECENT_CHANGES: usize = 5;

fn top_level_fields(package: &Package) -> Result<Map<String, Value>, HistoryError> {
    match serde_json::to_value(package) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(HistoryError::Snapshot(format!(
            "package serialized to {} instead of an object",
            other
        ))),
        Err(e) => Err(HistoryError::Snapshot(e.to_string())),
    }
}

/// One-level diff: every top-level field present in either package whose
/// value differs (deep equality), in field-name order.
pub fn diff_packages(old: &Package, new: &Package) -> Result<Vec<FieldDiff>, HistoryError> {
    let old = top_level_fields(old)?;
    let new = top_level_fields(new)?;

    let fields: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    Ok(fields
        .into_iter()
        .filter(|field| !BOOKKEEPING_FIELDS.contains(&field.as_str()))
        .filter_map(|field| {
            let old_value = old.get(field).cloned().unwrap_or(Value::Null);
            let new_value = new.get(field).cloned().unwrap_or(Value::Null);
            (old_value != new_value).then(|| FieldDiff {
                field: field.clone(),
                old_value,
                new_value,
            })
        })
        .collect())
}

fn history_db_error(package_id: &ObjectId, e: RepositoryError) -> HistoryError {
    error!("Version history query failed for package {}: {}", package_id, e);
    HistoryError::Database(e.to_string())
}

pub struct PackageHistoryService {
    history: Arc<dyn PackageHistoryRepository>,
    packages: Arc<dyn PackageRepository>,
}

impl PackageHistoryService {
    pub fn new(
        history: Arc<dyn PackageHistoryRepository>,
        packages: Arc<dyn PackageRepository>,
    ) -> Self {
        Self { history, packages }
    }

    /// Records `previous` as an immutable snapshot of its version. Must be
    /// called before `next` is written; an error here aborts the update.
    pub async fn save_version(
        &self,
        package_id: &ObjectId,
        previous: &Package,
        next: &Package,
        modified_by: &str,
        change_description: Option<String>,
    ) -> Result<PackageVersionRecord, HistoryError> {
        let changed_fields = diff_packages(previous, next)?
            .into_iter()
            .map(|diff| diff.field)
            .collect();

        let record = PackageVersionRecord {
            id: None,
            package_id: *package_id,
            version: previous.version,
            snapshot: previous.clone(),
            modified_by: modified_by.to_string(),
            modified_at: Utc::now(),
            change_description,
            changed_fields,
        };

        match self.history.insert(&record).await {
            Ok(()) => {
                info!(
                    "Saved version {} of package {} (changed: {:?})",
                    record.version, package_id, record.changed_fields
                );
                Ok(record)
            }
            Err(RepositoryError::Duplicate) => Err(HistoryError::DuplicateVersion {
                package_id: *package_id,
                version: previous.version,
            }),
            Err(e) => Err(history_db_error(package_id, e)),
        }
    }

    /// Newest first
    pub async fn get_version_history(
        &self,
        package_id: &ObjectId,
        limit: Option<u32>,
    ) -> Result<Vec<PackageVersionRecord>, HistoryError> {
        self.history
            .find_by_package(package_id, limit)
            .await
            .map_err(|e| history_db_error(package_id, e))
    }

    pub async fn get_version(
        &self,
        package_id: &ObjectId,
        version: u32,
    ) -> Result<Option<PackageVersionRecord>, HistoryError> {
        self.history
            .find_version(package_id, version)
            .await
            .map_err(|e| history_db_error(package_id, e))
    }

    /// Archived snapshot, or the live package when `version` is the current one.
    async fn snapshot_at(&self, package_id: &ObjectId, version: u32) -> Result<Package, HistoryError> {
        if let Some(record) = self.get_version(package_id, version).await? {
            return Ok(record.snapshot);
        }

        self.packages
            .find_by_id(package_id)
            .await
            .map_err(|e| history_db_error(package_id, e))?
            .filter(|package| package.version == version)
            .ok_or(HistoryError::VersionNotFound {
                package_id: *package_id,
                version,
            })
    }

    pub async fn compare_versions(
        &self,
        package_id: &ObjectId,
        v1: u32,
        v2: u32,
    ) -> Result<Vec<FieldDiff>, HistoryError> {
        let old = self.snapshot_at(package_id, v1).await?;
        let new = self.snapshot_at(package_id, v2).await?;
        diff_packages(&old, &new)
    }

    pub async fn get_audit_trail(&self, package_id: &ObjectId) -> Result<AuditTrail, HistoryError> {
        let records = self.get_version_history(package_id, None).await?;
        let (Some(newest), Some(oldest)) = (records.first(), records.last()) else {
            return Err(HistoryError::NoHistory {
                package_id: *package_id,
            });
        };

        let mut seen = HashSet::new();
        let mut unique_contributors = Vec::new();
        let authors = std::iter::once(&oldest.snapshot.created_by)
            .chain(records.iter().rev().map(|record| &record.modified_by));
        for author in authors {
            if seen.insert(author.as_str()) {
                unique_contributors.push(author.clone());
            }
        }

        Ok(AuditTrail {
            package_id: *package_id,
            total_versions: records.len(),
            unique_contributors,
            first_created: oldest.snapshot.created_at,
            last_modified: newest.modified_at,
            recent_changes: records
                .iter()
                .take(RECENT_CHANGES)
                .map(VersionSummary::from)
                .collect(),
        })
    }
}
