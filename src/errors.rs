use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use chrono::NaiveDate;
use mongodb::bson::oid::ObjectId;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::models::price::Currency;
use crate::models::quote::SyncStatus;
use crate::services::package_csv_service::ParseFailure;

const GENERIC_DATABASE_MESSAGE: &str =
    "Something went wrong while talking to the database. Please try again.";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("expected stored version {expected}, found {actual:?}")]
    VersionMismatch { expected: u32, actual: Option<u32> },

    #[error("record already exists")]
    Duplicate,

    #[error("database error: {0}")]
    Database(String),
}

#[derive(Debug, Error, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalculationError {
    #[error("no tier covers this group size ({number_of_people} people)")]
    NoTierForGroupSize { number_of_people: u32 },

    #[error("{nights} nights is not offered by this package (offered: {offered:?})")]
    DurationNotOffered { nights: u32, offered: Vec<u32> },

    #[error("no pricing defined for this date ({arrival_date})")]
    NoPricingForDate { arrival_date: NaiveDate },

    #[error("no price defined for {tier_label}, {nights} nights, {period}")]
    PriceNotDefined {
        tier_label: String,
        nights: u32,
        period: String,
    },

    #[error("price is on request and has to be entered manually")]
    PriceOnRequest,
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("package {package_id} has no version history yet")]
    NoHistory { package_id: ObjectId },

    #[error("version {version} of package {package_id} not found")]
    VersionNotFound { package_id: ObjectId, version: u32 },

    #[error("version {version} of package {package_id} was already recorded")]
    DuplicateVersion { package_id: ObjectId, version: u32 },

    #[error("could not snapshot package: {0}")]
    Snapshot(String),

    #[error("history database error: {0}")]
    Database(String),
}

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("package {id} not found")]
    NotFound { id: String },

    #[error("package {package_id} is referenced by {quote_count} quote(s)")]
    InUse { package_id: ObjectId, quote_count: u64 },

    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("not allowed to {action}")]
    Unauthorized { action: String },

    #[error("package was modified concurrently (expected version {expected}, found {actual:?})")]
    VersionConflict { expected: u32, actual: Option<u32> },

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("package database error: {0}")]
    Database(String),
}

impl PackageError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        PackageError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PriceRequestError {
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error(transparent)]
    Calculation(#[from] CalculationError),

    #[error(transparent)]
    Package(#[from] PackageError),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("quote {id} not found")]
    QuoteNotFound { id: String },

    #[error("quote has no linked package")]
    NoLinkedPackage,

    #[error("linked package {package_id} is no longer available ({reason})")]
    PackageUnavailable { package_id: ObjectId, reason: String },

    #[error("a recalculation is already in progress for this quote")]
    RecalculationInProgress,

    #[error("cannot {action} while the quote price is {status}")]
    InvalidTransition {
        status: SyncStatus,
        action: &'static str,
    },

    #[error("quote {id} was changed by another request; reload and try again")]
    ConcurrentUpdate { id: String },

    #[error("linked package is priced in {package_currency} but the quote is in {quote_currency}")]
    CurrencyMismatch {
        package_currency: Currency,
        quote_currency: Currency,
    },

    #[error("no calculated price to restore")]
    NothingToRestore,

    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error(transparent)]
    Calculation(#[from] CalculationError),

    #[error("quote database error: {0}")]
    Database(String),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no 'file' part in the upload")]
    MissingFile,

    #[error("'{filename}' is not a .csv file")]
    NotCsv { filename: String },

    #[error("file is larger than {limit} bytes")]
    TooLarge { limit: usize },

    #[error("file is not valid UTF-8 text")]
    NotUtf8,

    #[error("could not read upload: {0}")]
    Multipart(String),
}

fn error_body(kind: &str, message: String) -> serde_json::Value {
    json!({ "error": kind, "message": message })
}

impl ResponseError for CalculationError {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNPROCESSABLE_ENTITY
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": "calculation_error",
            "message": self.to_string(),
            "reason": self,
        }))
    }
}

impl ResponseError for HistoryError {
    fn status_code(&self) -> StatusCode {
        match self {
            HistoryError::NoHistory { .. } | HistoryError::VersionNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            HistoryError::DuplicateVersion { .. } => StatusCode::CONFLICT,
            HistoryError::Snapshot(_) | HistoryError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            HistoryError::Snapshot(_) | HistoryError::Database(_) => {
                error_body("database_error", GENERIC_DATABASE_MESSAGE.to_string())
            }
            _ => error_body("history_error", self.to_string()),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

impl ResponseError for PackageError {
    fn status_code(&self) -> StatusCode {
        match self {
            PackageError::NotFound { .. } => StatusCode::NOT_FOUND,
            PackageError::InUse { .. } | PackageError::VersionConflict { .. } => {
                StatusCode::CONFLICT
            }
            PackageError::Validation { .. } => StatusCode::BAD_REQUEST,
            PackageError::Unauthorized { .. } => StatusCode::FORBIDDEN,
            PackageError::History(err) => err.status_code(),
            PackageError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            PackageError::NotFound { id } => json!({
                "error": "package_not_found",
                "message": self.to_string(),
                "package_id": id,
            }),
            PackageError::InUse {
                package_id,
                quote_count,
            } => json!({
                "error": "package_in_use",
                "message": self.to_string(),
                "package_id": package_id.to_hex(),
                "quote_count": quote_count,
            }),
            PackageError::Validation { field, message } => json!({
                "error": "package_validation",
                "message": message,
                "field": field,
            }),
            PackageError::Unauthorized { action } => json!({
                "error": "package_unauthorized",
                "message": self.to_string(),
                "action": action,
            }),
            PackageError::VersionConflict { expected, actual } => json!({
                "error": "version_conflict",
                "message": self.to_string(),
                "expected_version": expected,
                "actual_version": actual,
            }),
            PackageError::History(err) => return err.error_response(),
            PackageError::Database(_) => {
                error_body("database_error", GENERIC_DATABASE_MESSAGE.to_string())
            }
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

impl ResponseError for PriceRequestError {
    fn status_code(&self) -> StatusCode {
        match self {
            PriceRequestError::Validation { .. } => StatusCode::BAD_REQUEST,
            PriceRequestError::Calculation(err) => err.status_code(),
            PriceRequestError::Package(err) => err.status_code(),
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            PriceRequestError::Validation { field, message } => {
                HttpResponse::BadRequest().json(json!({
                    "error": "validation_error",
                    "message": message,
                    "field": field,
                }))
            }
            PriceRequestError::Calculation(err) => err.error_response(),
            PriceRequestError::Package(err) => err.error_response(),
        }
    }
}

impl ResponseError for SyncError {
    fn status_code(&self) -> StatusCode {
        match self {
            SyncError::QuoteNotFound { .. } => StatusCode::NOT_FOUND,
            SyncError::NoLinkedPackage
            | SyncError::PackageUnavailable { .. }
            | SyncError::CurrencyMismatch { .. }
            | SyncError::NothingToRestore => StatusCode::UNPROCESSABLE_ENTITY,
            SyncError::RecalculationInProgress
            | SyncError::InvalidTransition { .. }
            | SyncError::ConcurrentUpdate { .. } => StatusCode::CONFLICT,
            SyncError::Validation { .. } => StatusCode::BAD_REQUEST,
            SyncError::Calculation(err) => err.status_code(),
            SyncError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            SyncError::Calculation(err) => json!({
                "error": "calculation_error",
                "status": SyncStatus::Error,
                "message": err.to_string(),
                "reason": err,
            }),
            SyncError::Database(_) => {
                error_body("database_error", GENERIC_DATABASE_MESSAGE.to_string())
            }
            _ => error_body("sync_error", self.to_string()),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

impl ResponseError for UploadError {
    fn status_code(&self) -> StatusCode {
        match self {
            UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(error_body("upload_error", self.to_string()))
    }
}

impl ResponseError for ParseFailure {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNPROCESSABLE_ENTITY
    }

    fn error_response(&self) -> HttpResponse {
        let errors: Vec<String> = self.errors().map(ToString::to_string).collect();
        HttpResponse::build(self.status_code()).json(json!({
            "error": "csv_parse_error",
            "message": self.to_string(),
            "errors": errors,
            "diagnostics": self.diagnostics,
        }))
    }
}
