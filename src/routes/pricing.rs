use actix_web::{web, HttpResponse};

use crate::app::AppState;
use crate::errors::PriceRequestError;
use crate::routes::parse_object_id;
use crate::services::pricing_service::{PriceCalculationRequest, PricingService};

/*
    /api/packages/{id}/calculate-price
*/
pub async fn calculate_price(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<PriceCalculationRequest>,
) -> Result<HttpResponse, PriceRequestError> {
    let id = parse_object_id(&path).ok_or_else(|| PriceRequestError::Validation {
        field: "package_id".to_string(),
        message: "invalid package id".to_string(),
    })?;

    let result = PricingService::calculate_for_request(state.packages.as_ref(), &id, &body).await?;
    Ok(HttpResponse::Ok().json(result))
}
