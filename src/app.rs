use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::{
    mongo::MongoStore,
    repository::{PackageHistoryRepository, PackageRepository, QuoteRepository},
};
use crate::services::{
    package_history_service::PackageHistoryService, package_service::PackageService,
    quote_sync_service::QuoteSyncService,
};

/// Everything the handlers need, built once and shared through `web::Data`.
pub struct AppState {
    pub config: AppConfig,
    pub packages: Arc<dyn PackageRepository>,
    pub package_service: PackageService,
    pub history_service: Arc<PackageHistoryService>,
    pub quote_sync: QuoteSyncService,
    /// Present when backed by MongoDB; used by the health check
    pub mongo: Option<MongoStore>,
}

impl AppState {
    pub fn new<S>(store: Arc<S>, config: AppConfig) -> Self
    where
        S: PackageRepository + PackageHistoryRepository + QuoteRepository + 'static,
    {
        let packages: Arc<dyn PackageRepository> = store.clone();
        let history: Arc<dyn PackageHistoryRepository> = store.clone();
        let quotes: Arc<dyn QuoteRepository> = store;

        let history_service = Arc::new(PackageHistoryService::new(history, packages.clone()));

        Self {
            config,
            package_service: PackageService::new(packages.clone(), history_service.clone()),
            quote_sync: QuoteSyncService::new(packages.clone(), quotes),
            history_service,
            packages,
            mongo: None,
        }
    }

    pub fn with_mongo(store: MongoStore, config: AppConfig) -> Self {
        let mut state = Self::new(Arc::new(store.clone()), config);
        state.mongo = Some(store);
        state
    }
}
