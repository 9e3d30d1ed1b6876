use actix_web::{web, HttpResponse, Responder};
use log::warn;
use serde::Serialize;
use std::collections::HashMap;

use crate::app::AppState;

#[derive(Serialize)]
struct HealthStatus {
    status: String,
    services: HashMap<String, ServiceStatus>,
    version: String,
}

#[derive(Serialize, Clone)]
struct ServiceStatus {
    status: String,
    details: Option<String>,
}

pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let mut health = HealthStatus {
        status: "ok".to_string(),
        services: HashMap::new(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let storage = check_storage(&state).await;
    if storage.status != "ok" {
        health.status = "degraded".to_string();
    }
    health.services.insert("storage".to_string(), storage);

    HttpResponse::Ok().json(health)
}

async fn check_storage(state: &AppState) -> ServiceStatus {
    let Some(mongo) = &state.mongo else {
        return ServiceStatus {
            status: "ok".to_string(),
            details: Some("In-memory store".to_string()),
        };
    };

    match mongo.ping().await {
        Ok(()) => ServiceStatus {
            status: "ok".to_string(),
            details: Some(format!(
                "Connected to MongoDB database '{}'",
                state.config.mongodb_database
            )),
        },
        Err(e) => {
            warn!("MongoDB health check failed: {}", e);
            ServiceStatus {
                status: "error".to_string(),
                details: Some("Failed to reach MongoDB".to_string()),
            }
        }
    }
}
