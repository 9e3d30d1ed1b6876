use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;

use crate::errors::RepositoryError;
use crate::models::{package::Package, package_history::PackageVersionRecord, quote::Quote};

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait PackageRepository: Send + Sync {
    async fn find_by_id(&self, id: &ObjectId) -> RepositoryResult<Option<Package>>;

    async fn list(&self, include_deleted: bool) -> RepositoryResult<Vec<Package>>;

    /// Stores a new package and returns its id
    async fn insert(&self, package: &Package) -> RepositoryResult<ObjectId>;

    /// Replaces the stored package only if its version still equals
    /// `expected_version`; otherwise `RepositoryError::VersionMismatch`.
    async fn replace(&self, package: &Package, expected_version: u32) -> RepositoryResult<()>;

    /// Removes the row; returns false when nothing was there
    async fn delete(&self, id: &ObjectId) -> RepositoryResult<bool>;

    async fn count_referencing_quotes(&self, id: &ObjectId) -> RepositoryResult<u64>;
}

#[async_trait]
pub trait PackageHistoryRepository: Send + Sync {
    /// Appends a record; a second record for the same (package, version) is
    /// rejected with `RepositoryError::Duplicate`.
    async fn insert(&self, record: &PackageVersionRecord) -> RepositoryResult<()>;

    /// Newest version first
    async fn find_by_package(
        &self,
        package_id: &ObjectId,
        limit: Option<u32>,
    ) -> RepositoryResult<Vec<PackageVersionRecord>>;

    async fn find_version(
        &self,
        package_id: &ObjectId,
        version: u32,
    ) -> RepositoryResult<Option<PackageVersionRecord>>;
}

#[async_trait]
pub trait QuoteRepository: Send + Sync {
    async fn find_by_id(&self, id: &ObjectId) -> RepositoryResult<Option<Quote>>;

    async fn insert(&self, quote: &Quote) -> RepositoryResult<ObjectId>;

    /// Stores `quote` only if the stored row is still at `expected_revision`;
    /// otherwise `RepositoryError::VersionMismatch`.
    async fn replace(&self, quote: &Quote, expected_revision: u32) -> RepositoryResult<()>;
}
