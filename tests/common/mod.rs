#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use actix_web::{middleware::Logger, web, App};
use actix_cors::Cors;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use mongodb::bson::oid::ObjectId;
use rust_decimal::Decimal;

use super_offer_api::app::AppState;
use super_offer_api::config::AppConfig;
use super_offer_api::db::memory::InMemoryStore;
use super_offer_api::db::repository::{
    PackageHistoryRepository, PackageRepository, QuoteRepository, RepositoryResult,
};
use super_offer_api::errors::RepositoryError;
use super_offer_api::middleware::auth_context::{AuthenticatedUser, UserRole};
use super_offer_api::models::package::{Package, PackageDraft};
use super_offer_api::models::package_history::PackageVersionRecord;
use super_offer_api::models::price::Currency;
use super_offer_api::models::quote::{LinkedPackage, PriceChangeReason, Quote};
use super_offer_api::routes;
use super_offer_api::services::package_csv_service::parse_package_csv;
use super_offer_api::services::pricing_service::PricingService;

pub const ADMIN_ID: &str = "admin-1";
pub const AGENT_ID: &str = "agent-7";
pub const BOUNDARY: &str = "----super-offer-test-boundary";

pub const ALPINE_CSV: &str = "\
Package:,Alpine Escape
Destination:,Austria
Resort:,Ischgl
Currency:,EUR

Period,1-5 People 2 Nights,1-5 People 3 Nights,6-11 People 2 Nights,6-11 People 3 Nights
January,ON REQUEST,ON REQUEST,ON REQUEST,ON REQUEST
June,90,120,80,100
July,95,125,85,105
Midsummer (2025-06-20 to 2025-06-24),150,200,140,180

Inclusions:
- Return flights
- Airport transfers
Accommodation:
- Hotel Madlein
Sales Notes:
Best value in early June.
";

pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub state: web::Data<AppState>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let state = web::Data::new(AppState::new(store.clone(), AppConfig::default()));
        Self { store, state }
    }

    pub fn with_config(config: AppConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let state = web::Data::new(AppState::new(store.clone(), config));
        Self { store, state }
    }

    pub fn create_app(
        &self,
    ) -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        App::new()
            .app_data(self.state.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .configure(routes::configure)
    }

    /// Stores the Alpine package directly and returns it with its id
    pub async fn seed_package(&self) -> Package {
        let package = self
            .state
            .package_service
            .create_package(alpine_draft(), &admin())
            .await
            .unwrap();
        package
    }

    pub async fn seed_quote(&self, quote: &Quote) -> ObjectId {
        QuoteRepository::insert(&*self.store, quote).await.unwrap()
    }
}

pub fn admin() -> AuthenticatedUser {
    AuthenticatedUser::new(ADMIN_ID, UserRole::Admin)
}

pub fn agent() -> AuthenticatedUser {
    AuthenticatedUser::new(AGENT_ID, UserRole::Agent)
}

pub fn alpine_draft() -> PackageDraft {
    parse_package_csv(ALPINE_CSV).unwrap().draft
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A quote priced from `package` exactly as the calculator would price it
pub fn priced_quote(package: &Package, people: u32, nights: u32, arrival_date: NaiveDate) -> Quote {
    let result = PricingService::calculate_price(package, people, nights, arrival_date).unwrap();
    let mut quote = Quote {
        id: None,
        number_of_people: people,
        number_of_nights: nights,
        arrival_date,
        destination: package.destination.clone(),
        currency: Currency::Eur,
        linked_package: Some(LinkedPackage::from_result(
            package,
            package.id.unwrap(),
            &result,
        )),
        selected_events: Vec::new(),
        total_price: Decimal::ZERO,
        price_history: Vec::new(),
        created_at: Some(Utc::now()),
        updated_at: None,
        revision: 0,
    };
    quote.record_price(
        result.total_price.fixed().unwrap(),
        PriceChangeReason::Initial,
        Some("Priced from package".to_string()),
        Some(AGENT_ID),
        Utc::now(),
    );
    quote
}

/// `(content type, body)` of a multipart upload with a single `file` part
pub fn multipart_csv(filename: &str, content: &str) -> (String, String) {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: text/csv\r\n\r\n{c}\r\n--{b}--\r\n",
        b = BOUNDARY,
        f = filename,
        c = content
    );
    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}

pub fn oid(value: &serde_json::Value) -> String {
    value["_id"]["$oid"].as_str().unwrap_or_default().to_string()
}

pub fn decimal(value: &serde_json::Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

/// History store whose writes always fail
pub struct FailingHistoryRepository;

#[async_trait]
impl PackageHistoryRepository for FailingHistoryRepository {
    async fn insert(&self, _record: &PackageVersionRecord) -> RepositoryResult<()> {
        Err(RepositoryError::Database("history collection unavailable".to_string()))
    }

    async fn find_by_package(
        &self,
        _package_id: &ObjectId,
        _limit: Option<u32>,
    ) -> RepositoryResult<Vec<PackageVersionRecord>> {
        Ok(Vec::new())
    }

    async fn find_version(
        &self,
        _package_id: &ObjectId,
        _version: u32,
    ) -> RepositoryResult<Option<PackageVersionRecord>> {
        Ok(None)
    }
}

pub async fn stored_package(store: &InMemoryStore, id: &ObjectId) -> Option<Package> {
    PackageRepository::find_by_id(store, id).await.unwrap()
}

/// Package store whose next `replace` fails once with a database error
pub struct FlakyPackageRepository {
    pub inner: Arc<InMemoryStore>,
    fail_next_replace: AtomicBool,
}

impl FlakyPackageRepository {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            fail_next_replace: AtomicBool::new(false),
        }
    }

    pub fn fail_next_replace(&self) {
        self.fail_next_replace.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PackageRepository for FlakyPackageRepository {
    async fn find_by_id(&self, id: &ObjectId) -> RepositoryResult<Option<Package>> {
        PackageRepository::find_by_id(&*self.inner, id).await
    }

    async fn list(&self, include_deleted: bool) -> RepositoryResult<Vec<Package>> {
        self.inner.list(include_deleted).await
    }

    async fn insert(&self, package: &Package) -> RepositoryResult<ObjectId> {
        PackageRepository::insert(&*self.inner, package).await
    }

    async fn replace(&self, package: &Package, expected_version: u32) -> RepositoryResult<()> {
        if self.fail_next_replace.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::Database("connection reset".to_string()));
        }
        PackageRepository::replace(&*self.inner, package, expected_version).await
    }

    async fn delete(&self, id: &ObjectId) -> RepositoryResult<bool> {
        self.inner.delete(id).await
    }

    async fn count_referencing_quotes(&self, id: &ObjectId) -> RepositoryResult<u64> {
        self.inner.count_referencing_quotes(id).await
    }
}

/// Quote store that gives the executor a turn before every call, so two
/// requests on one quote interleave the way they would against a real
/// database.
pub struct YieldingQuoteStore {
    pub inner: Arc<InMemoryStore>,
}

impl YieldingQuoteStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl QuoteRepository for YieldingQuoteStore {
    async fn find_by_id(&self, id: &ObjectId) -> RepositoryResult<Option<Quote>> {
        tokio::task::yield_now().await;
        QuoteRepository::find_by_id(&*self.inner, id).await
    }

    async fn insert(&self, quote: &Quote) -> RepositoryResult<ObjectId> {
        tokio::task::yield_now().await;
        QuoteRepository::insert(&*self.inner, quote).await
    }

    async fn replace(&self, quote: &Quote, expected_revision: u32) -> RepositoryResult<()> {
        tokio::task::yield_now().await;
        QuoteRepository::replace(&*self.inner, quote, expected_revision).await
    }
}
