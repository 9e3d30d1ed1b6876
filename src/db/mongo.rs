use async_trait::async_trait;
use futures::TryStreamExt;
use log::{info, warn};
use mongodb::{
    bson::{doc, oid::ObjectId},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, IndexOptions, ServerApi, ServerApiVersion},
    Client, Collection, IndexModel,
};
use std::sync::Arc;
use std::time::Duration;

use super::repository::{
    PackageHistoryRepository, PackageRepository, QuoteRepository, RepositoryResult,
};
use crate::errors::RepositoryError;
use crate::models::{
    package::{Package, PackageStatus},
    package_history::PackageVersionRecord,
    quote::Quote,
};

const PACKAGES: &str = "Packages";
const PACKAGE_HISTORY: &str = "PackageVersionHistory";
const QUOTES: &str = "Quotes";
const DUPLICATE_KEY: i32 = 11000;

pub async fn create_mongo_client(uri: &str) -> Result<Arc<Client>, MongoError> {
    info!("Connecting to MongoDB");

    let mut client_options = ClientOptions::parse(uri).await?;

    client_options.connect_timeout = Some(Duration::from_secs(10));
    client_options.server_selection_timeout = Some(Duration::from_secs(10));
    client_options.max_pool_size = Some(10);
    client_options.min_pool_size = Some(1);

    // MongoDB 5.0+
    let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
    client_options.server_api = Some(server_api);

    let client = Client::with_options(client_options)?;

    match client
        .database("admin")
        .run_command(doc! {"ping": 1})
        .await
    {
        Ok(_) => info!("Connected to MongoDB and verified with ping"),
        Err(e) => warn!(
            "Connected to MongoDB but ping failed, some operations may be impaired: {}",
            e
        ),
    }

    Ok(Arc::new(client))
}

impl From<MongoError> for RepositoryError {
    fn from(err: MongoError) -> Self {
        match *err.kind {
            ErrorKind::Write(WriteFailure::WriteError(ref write_error))
                if write_error.code == DUPLICATE_KEY =>
            {
                RepositoryError::Duplicate
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

fn encoding_error(err: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Database(format!("document encoding failed: {}", err))
}

/// Package, history and quote collections of one database.
#[derive(Clone)]
pub struct MongoStore {
    client: Arc<Client>,
    database: String,
}

impl MongoStore {
    pub fn new(client: Arc<Client>, database: &str) -> Self {
        Self {
            client,
            database: database.to_string(),
        }
    }

    fn packages(&self) -> Collection<Package> {
        self.client.database(&self.database).collection(PACKAGES)
    }

    fn history(&self) -> Collection<PackageVersionRecord> {
        self.client
            .database(&self.database)
            .collection(PACKAGE_HISTORY)
    }

    fn quotes(&self) -> Collection<Quote> {
        self.client.database(&self.database).collection(QUOTES)
    }

    /// History needs one record per (package, version); the unique index is
    /// what turns a racing second writer into a duplicate-key error.
    pub async fn ensure_indexes(&self) -> RepositoryResult<()> {
        let unique_version = IndexModel::builder()
            .keys(doc! { "package_id": 1, "version": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.history().create_index(unique_version).await?;

        let linked_package = IndexModel::builder()
            .keys(doc! { "linked_package.package_id": 1 })
            .build();
        self.quotes().create_index(linked_package).await?;

        Ok(())
    }

    pub async fn ping(&self) -> RepositoryResult<()> {
        self.client
            .database(&self.database)
            .run_command(doc! {"ping": 1})
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PackageRepository for MongoStore {
    async fn find_by_id(&self, id: &ObjectId) -> RepositoryResult<Option<Package>> {
        Ok(self.packages().find_one(doc! { "_id": *id }).await?)
    }

    async fn list(&self, include_deleted: bool) -> RepositoryResult<Vec<Package>> {
        let status_filter = bson::to_bson(&PackageStatus::Deleted).map_err(encoding_error)?;
        let filter = if include_deleted {
            doc! {}
        } else {
            doc! { "status": { "$ne": status_filter } }
        };
        let cursor = self
            .packages()
            .find(filter)
            .sort(doc! { "name": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert(&self, package: &Package) -> RepositoryResult<ObjectId> {
        let result = self.packages().insert_one(package).await?;
        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| RepositoryError::Database("insert returned no ObjectId".to_string()))
    }

    async fn replace(&self, package: &Package, expected_version: u32) -> RepositoryResult<()> {
        let id = package
            .id
            .ok_or_else(|| RepositoryError::Database("package has no id".to_string()))?;

        let result = self
            .packages()
            .replace_one(
                doc! { "_id": id, "version": expected_version as i64 },
                package,
            )
            .await?;

        if result.matched_count == 1 {
            return Ok(());
        }

        let actual = self
            .packages()
            .find_one(doc! { "_id": id })
            .await?
            .map(|stored| stored.version);
        Err(RepositoryError::VersionMismatch {
            expected: expected_version,
            actual,
        })
    }

    async fn delete(&self, id: &ObjectId) -> RepositoryResult<bool> {
        let result = self.packages().delete_one(doc! { "_id": *id }).await?;
        Ok(result.deleted_count > 0)
    }

    async fn count_referencing_quotes(&self, id: &ObjectId) -> RepositoryResult<u64> {
        Ok(self
            .quotes()
            .count_documents(doc! { "linked_package.package_id": *id })
            .await?)
    }
}

#[async_trait]
impl PackageHistoryRepository for MongoStore {
    async fn insert(&self, record: &PackageVersionRecord) -> RepositoryResult<()> {
        self.history().insert_one(record).await?;
        Ok(())
    }

    async fn find_by_package(
        &self,
        package_id: &ObjectId,
        limit: Option<u32>,
    ) -> RepositoryResult<Vec<PackageVersionRecord>> {
        let history = self.history();
        let mut find = history
            .find(doc! { "package_id": *package_id })
            .sort(doc! { "version": -1 });
        if let Some(limit) = limit {
            find = find.limit(limit as i64);
        }
        let cursor = find.await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_version(
        &self,
        package_id: &ObjectId,
        version: u32,
    ) -> RepositoryResult<Option<PackageVersionRecord>> {
        Ok(self
            .history()
            .find_one(doc! { "package_id": *package_id, "version": version as i64 })
            .await?)
    }
}

#[async_trait]
impl QuoteRepository for MongoStore {
    async fn find_by_id(&self, id: &ObjectId) -> RepositoryResult<Option<Quote>> {
        Ok(self.quotes().find_one(doc! { "_id": *id }).await?)
    }

    async fn insert(&self, quote: &Quote) -> RepositoryResult<ObjectId> {
        let result = self.quotes().insert_one(quote).await?;
        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| RepositoryError::Database("insert returned no ObjectId".to_string()))
    }

    async fn replace(&self, quote: &Quote, expected_revision: u32) -> RepositoryResult<()> {
        let id = quote
            .id
            .ok_or_else(|| RepositoryError::Database("quote has no id".to_string()))?;

        // Quotes written before revisions existed have no field at all
        let filter = if expected_revision == 0 {
            doc! {
                "_id": id,
                "$or": [{ "revision": 0 }, { "revision": { "$exists": false } }],
            }
        } else {
            doc! { "_id": id, "revision": expected_revision as i64 }
        };
        let result = self.quotes().replace_one(filter, quote).await?;
        if result.matched_count == 0 {
            let stored = self.quotes().find_one(doc! { "_id": id }).await?;
            return match stored {
                Some(stored) => Err(RepositoryError::VersionMismatch {
                    expected: expected_revision,
                    actual: Some(stored.revision),
                }),
                None => Err(RepositoryError::Database(format!("quote {} not found", id))),
            };
        }
        Ok(())
    }
}
