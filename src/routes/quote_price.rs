use actix_web::{web, HttpResponse};
use mongodb::bson::oid::ObjectId;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::app::AppState;
use crate::errors::SyncError;
use crate::middleware::auth_context::AuthenticatedUser;
use crate::routes::parse_object_id;
use crate::services::quote_sync_service::NewEvent;

#[derive(Debug, Deserialize)]
pub struct ManualPriceRequest {
    pub price: Decimal,
    #[serde(default)]
    pub change_description: Option<String>,
}

fn quote_id(raw: &str) -> Result<ObjectId, SyncError> {
    parse_object_id(raw).ok_or_else(|| SyncError::QuoteNotFound {
        id: raw.to_string(),
    })
}

/*
    /api/quotes/{id}/price
*/
pub async fn get_sync_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, SyncError> {
    let id = quote_id(&path)?;
    let report = state.quote_sync.sync_status(&id).await?;
    Ok(HttpResponse::Ok().json(report))
}

/*
    /api/quotes/{id}/price/recalculate
*/
pub async fn recalculate(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, SyncError> {
    let id = quote_id(&path)?;
    let report = state
        .quote_sync
        .recalculate_price(&id, Some(&user.user_id))
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

/*
    /api/quotes/{id}/price/reset
*/
pub async fn reset_to_calculated(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, SyncError> {
    let id = quote_id(&path)?;
    let report = state
        .quote_sync
        .reset_to_calculated(&id, Some(&user.user_id))
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

/*
    /api/quotes/{id}/price/manual
*/
pub async fn set_manual_price(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    body: web::Json<ManualPriceRequest>,
) -> Result<HttpResponse, SyncError> {
    let id = quote_id(&path)?;
    let request = body.into_inner();
    let report = state
        .quote_sync
        .set_manual_price(
            &id,
            request.price,
            request.change_description,
            Some(&user.user_id),
        )
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

/*
    /api/quotes/{id}/price/events
*/
pub async fn add_event(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    body: web::Json<NewEvent>,
) -> Result<HttpResponse, SyncError> {
    let id = quote_id(&path)?;
    let report = state
        .quote_sync
        .add_event(&id, body.into_inner(), Some(&user.user_id))
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

/*
    /api/quotes/{id}/price/events/{event_id}
*/
pub async fn remove_event(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, SyncError> {
    let (raw_id, event_id) = path.into_inner();
    let id = quote_id(&raw_id)?;
    let report = state
        .quote_sync
        .remove_event(&id, &event_id, Some(&user.user_id))
        .await?;
    Ok(HttpResponse::Ok().json(report))
}
