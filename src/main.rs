use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use log::{error, info, warn};

use super_offer_api::{
    app::AppState,
    config::AppConfig,
    db::{memory::InMemoryStore, mongo},
    routes,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if cfg!(debug_assertions) {
        dotenv::dotenv().ok();
    }

    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = AppConfig::from_env();
    let bind = (config.host.clone(), config.port);

    let state = match config.mongodb_uri.clone() {
        Some(uri) => {
            let client = mongo::create_mongo_client(&uri).await.map_err(|e| {
                error!("Failed to create MongoDB client: {}", e);
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
            })?;
            let store = mongo::MongoStore::new(client, &config.mongodb_database);
            if let Err(e) = store.ensure_indexes().await {
                warn!("Could not ensure MongoDB indexes: {}", e);
            }
            AppState::with_mongo(store, config)
        }
        None if cfg!(debug_assertions) => {
            warn!("MONGODB_URI not set; using the in-memory store");
            AppState::new(Arc::new(InMemoryStore::new()), config)
        }
        None => {
            error!("MONGODB_URI must be set");
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "MONGODB_URI must be set",
            ));
        }
    };
    let state = web::Data::new(state);

    info!("Starting HTTP server on {}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .bind(bind)?
    .run()
    .await
}
