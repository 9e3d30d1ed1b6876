use actix_multipart::Multipart;
use actix_web::{error::ErrorInternalServerError, web, Error, HttpResponse};
use futures::StreamExt;
use log::{error, info, warn};
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;
use serde_json::json;

use crate::app::AppState;
use crate::errors::{PackageError, UploadError};
use crate::middleware::auth_context::AuthenticatedUser;
use crate::models::package::PackageDraft;
use crate::routes::parse_object_id;
use crate::services::package_csv_service::{export_package_csv, parse_package_csv, ParsedPackage};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePackageRequest {
    pub expected_version: u32,
    #[serde(default)]
    pub change_description: Option<String>,
    #[serde(flatten)]
    pub package: PackageDraft,
}

fn package_id(raw: &str) -> Result<ObjectId, PackageError> {
    parse_object_id(raw).ok_or_else(|| PackageError::validation("id", "invalid package id"))
}

/// Reads the multipart `file` part, enforcing the `.csv` name and size limit.
async fn read_csv_upload(mut payload: Multipart, limit: usize) -> Result<String, UploadError> {
    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| UploadError::Multipart(e.to_string()))?;
        let disposition = field.content_disposition().cloned();
        if disposition.as_ref().and_then(|cd| cd.get_name()) != Some("file") {
            continue;
        }

        let filename = disposition
            .as_ref()
            .and_then(|cd| cd.get_filename())
            .unwrap_or_default()
            .to_string();
        if !filename.to_lowercase().ends_with(".csv") {
            return Err(UploadError::NotCsv { filename });
        }

        let mut bytes = web::BytesMut::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| UploadError::Multipart(e.to_string()))?;
            if bytes.len() + chunk.len() > limit {
                return Err(UploadError::TooLarge { limit });
            }
            bytes.extend_from_slice(&chunk);
        }

        return String::from_utf8(bytes.to_vec()).map_err(|_| UploadError::NotUtf8);
    }

    Err(UploadError::MissingFile)
}

async fn parse_upload(payload: Multipart, state: &AppState) -> Result<ParsedPackage, Error> {
    let text = read_csv_upload(payload, state.config.max_csv_bytes).await?;
    match parse_package_csv(&text) {
        Ok(parsed) => Ok(parsed),
        Err(failure) => {
            warn!(
                "Refused package CSV: {}",
                failure
                    .errors()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ")
            );
            Err(failure.into())
        }
    }
}

/*
    /api/packages
*/
pub async fn list_packages(
    state: web::Data<AppState>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, Error> {
    let packages = state
        .package_service
        .list_packages(query.include_deleted)
        .await?;
    Ok(HttpResponse::Ok().json(packages))
}

pub async fn create_package(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    draft: web::Json<PackageDraft>,
) -> Result<HttpResponse, Error> {
    let package = state
        .package_service
        .create_package(draft.into_inner(), &user)
        .await?;
    Ok(HttpResponse::Created().json(package))
}

/*
    /api/packages/import
*/
pub async fn import_package(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    payload: Multipart,
) -> Result<HttpResponse, Error> {
    let parsed = parse_upload(payload, &state).await?;
    let package = state
        .package_service
        .create_package(parsed.draft, &user)
        .await?;

    info!(
        "Imported package '{}' from CSV with {} warning(s)",
        package.name,
        parsed.warnings.len()
    );
    Ok(HttpResponse::Created().json(json!({
        "package": package,
        "warnings": parsed.warnings,
    })))
}

/*
    /api/packages/import/preview
*/
pub async fn preview_import(
    state: web::Data<AppState>,
    _user: AuthenticatedUser,
    payload: Multipart,
) -> Result<HttpResponse, Error> {
    let parsed = parse_upload(payload, &state).await?;
    Ok(HttpResponse::Ok().json(parsed))
}

/*
    /api/packages/{id}
*/
pub async fn get_package(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let id = package_id(&path)?;
    let package = state.package_service.get_package(&id).await?;
    Ok(HttpResponse::Ok().json(package))
}

pub async fn update_package(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    body: web::Json<UpdatePackageRequest>,
) -> Result<HttpResponse, Error> {
    let id = package_id(&path)?;
    let request = body.into_inner();
    let package = state
        .package_service
        .update_package(
            &id,
            request.expected_version,
            request.package,
            &user,
            request.change_description,
        )
        .await?;
    Ok(HttpResponse::Ok().json(package))
}

pub async fn delete_package(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let id = package_id(&path)?;
    let outcome = state.package_service.delete_package(&id, &user).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/*
    /api/packages/{id}/export
*/
pub async fn export_package(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let id = package_id(&path)?;
    let package = state.package_service.get_package(&id).await?;

    let csv = export_package_csv(&package.to_draft()).map_err(|e| {
        error!("Failed to export package {}: {}", id, e);
        ErrorInternalServerError("Failed to export package")
    })?;

    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"package-{}-v{}.csv\"", id, package.version),
        ))
        .body(csv))
}
