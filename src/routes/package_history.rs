use actix_web::{web, Error, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::app::AppState;
use crate::errors::{HistoryError, PackageError};
use crate::models::package_history::VersionSummary;
use crate::routes::parse_object_id;

#[derive(Debug, Deserialize)]
pub struct VersionsQuery {
    pub version: Option<u32>,
    pub limit: Option<u32>,
    /// Summaries only, without snapshots
    #[serde(default)]
    pub summary: bool,
}

#[derive(Debug, Deserialize)]
pub struct CompareQuery {
    pub v1: u32,
    pub v2: u32,
}

fn package_id(raw: &str) -> Result<mongodb::bson::oid::ObjectId, PackageError> {
    parse_object_id(raw).ok_or_else(|| PackageError::validation("id", "invalid package id"))
}

/*
    /api/packages/{id}/versions?version=&limit=
*/
pub async fn get_versions(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<VersionsQuery>,
) -> Result<HttpResponse, Error> {
    let id = package_id(&path)?;

    if let Some(version) = query.version {
        let record = state
            .history_service
            .get_version(&id, version)
            .await?
            .ok_or(HistoryError::VersionNotFound {
                package_id: id,
                version,
            })?;
        return Ok(HttpResponse::Ok().json(record));
    }

    let records = state
        .history_service
        .get_version_history(&id, query.limit)
        .await?;
    if query.summary {
        let summaries: Vec<VersionSummary> = records.iter().map(VersionSummary::from).collect();
        return Ok(HttpResponse::Ok().json(summaries));
    }
    Ok(HttpResponse::Ok().json(records))
}

/*
    /api/packages/{id}/versions/compare?v1=&v2=
*/
pub async fn compare_versions(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<CompareQuery>,
) -> Result<HttpResponse, Error> {
    let id = package_id(&path)?;
    let differences = state
        .history_service
        .compare_versions(&id, query.v1, query.v2)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "package_id": id.to_hex(),
        "v1": query.v1,
        "v2": query.v2,
        "differences": differences,
    })))
}

/*
    /api/packages/{id}/audit-trail
*/
pub async fn get_audit_trail(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let id = package_id(&path)?;
    let trail = state.history_service.get_audit_trail(&id).await?;
    Ok(HttpResponse::Ok().json(trail))
}
