use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;

use super::repository::{
    PackageHistoryRepository, PackageRepository, QuoteRepository, RepositoryResult,
};
use crate::errors::RepositoryError;
use crate::models::{
    package::{Package, PackageStatus},
    package_history::PackageVersionRecord,
    quote::Quote,
};

/// Process-local store with the same semantics as the Mongo collections.
/// Used by the test suite and for running without a database.
#[derive(Default)]
pub struct InMemoryStore {
    packages: Mutex<HashMap<ObjectId, Package>>,
    history: Mutex<Vec<PackageVersionRecord>>,
    quotes: Mutex<HashMap<ObjectId, Quote>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> RepositoryResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Database("in-memory store lock poisoned".to_string()))
}

#[async_trait]
impl PackageRepository for InMemoryStore {
    async fn find_by_id(&self, id: &ObjectId) -> RepositoryResult<Option<Package>> {
        Ok(lock(&self.packages)?.get(id).cloned())
    }

    async fn list(&self, include_deleted: bool) -> RepositoryResult<Vec<Package>> {
        let mut packages: Vec<Package> = lock(&self.packages)?
            .values()
            .filter(|p| include_deleted || p.status != PackageStatus::Deleted)
            .cloned()
            .collect();
        packages.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(packages)
    }

    async fn insert(&self, package: &Package) -> RepositoryResult<ObjectId> {
        let id = package.id.unwrap_or_else(ObjectId::new);
        let mut packages = lock(&self.packages)?;
        if packages.contains_key(&id) {
            return Err(RepositoryError::Duplicate);
        }
        let mut stored = package.clone();
        stored.id = Some(id);
        packages.insert(id, stored);
        Ok(id)
    }

    async fn replace(&self, package: &Package, expected_version: u32) -> RepositoryResult<()> {
        let id = package
            .id
            .ok_or_else(|| RepositoryError::Database("package has no id".to_string()))?;
        let mut packages = lock(&self.packages)?;
        match packages.get(&id) {
            Some(stored) if stored.version == expected_version => {
                packages.insert(id, package.clone());
                Ok(())
            }
            Some(stored) => Err(RepositoryError::VersionMismatch {
                expected: expected_version,
                actual: Some(stored.version),
            }),
            None => Err(RepositoryError::VersionMismatch {
                expected: expected_version,
                actual: None,
            }),
        }
    }

    async fn delete(&self, id: &ObjectId) -> RepositoryResult<bool> {
        Ok(lock(&self.packages)?.remove(id).is_some())
    }

    async fn count_referencing_quotes(&self, id: &ObjectId) -> RepositoryResult<u64> {
        let count = lock(&self.quotes)?
            .values()
            .filter(|quote| {
                quote
                    .linked_package
                    .as_ref()
                    .is_some_and(|linked| linked.package_id == *id)
            })
            .count();
        Ok(count as u64)
    }
}

#[async_trait]
impl PackageHistoryRepository for InMemoryStore {
    async fn insert(&self, record: &PackageVersionRecord) -> RepositoryResult<()> {
        let mut history = lock(&self.history)?;
        if history
            .iter()
            .any(|r| r.package_id == record.package_id && r.version == record.version)
        {
            return Err(RepositoryError::Duplicate);
        }
        let mut stored = record.clone();
        stored.id.get_or_insert_with(ObjectId::new);
        history.push(stored);
        Ok(())
    }

    async fn find_by_package(
        &self,
        package_id: &ObjectId,
        limit: Option<u32>,
    ) -> RepositoryResult<Vec<PackageVersionRecord>> {
        let mut records: Vec<PackageVersionRecord> = lock(&self.history)?
            .iter()
            .filter(|r| r.package_id == *package_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.version.cmp(&a.version));
        if let Some(limit) = limit {
            records.truncate(limit as usize);
        }
        Ok(records)
    }

    async fn find_version(
        &self,
        package_id: &ObjectId,
        version: u32,
    ) -> RepositoryResult<Option<PackageVersionRecord>> {
        Ok(lock(&self.history)?
            .iter()
            .find(|r| r.package_id == *package_id && r.version == version)
            .cloned())
    }
}

#[async_trait]
impl QuoteRepository for InMemoryStore {
    async fn find_by_id(&self, id: &ObjectId) -> RepositoryResult<Option<Quote>> {
        Ok(lock(&self.quotes)?.get(id).cloned())
    }

    async fn insert(&self, quote: &Quote) -> RepositoryResult<ObjectId> {
        let id = quote.id.unwrap_or_else(ObjectId::new);
        let mut stored = quote.clone();
        stored.id = Some(id);
        lock(&self.quotes)?.insert(id, stored);
        Ok(id)
    }

    async fn replace(&self, quote: &Quote, expected_revision: u32) -> RepositoryResult<()> {
        let id = quote
            .id
            .ok_or_else(|| RepositoryError::Database("quote has no id".to_string()))?;
        let mut quotes = lock(&self.quotes)?;
        match quotes.get(&id) {
            Some(stored) if stored.revision == expected_revision => {
                quotes.insert(id, quote.clone());
                Ok(())
            }
            Some(stored) => Err(RepositoryError::VersionMismatch {
                expected: expected_revision,
                actual: Some(stored.revision),
            }),
            None => Err(RepositoryError::Database(format!("quote {} not found", id))),
        }
    }
}
