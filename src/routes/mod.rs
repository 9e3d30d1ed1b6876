use actix_web::web;
use mongodb::bson::oid::ObjectId;

pub mod health;
pub mod package;
pub mod package_history;
pub mod pricing;
pub mod quote_price;

pub(crate) fn parse_object_id(raw: &str) -> Option<ObjectId> {
    ObjectId::parse_str(raw.trim()).ok()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::health_check))
        .service(
            web::scope("/api")
                .service(
                    web::scope("/packages")
                        .route("", web::get().to(package::list_packages))
                        .route("", web::post().to(package::create_package))
                        .route("/import", web::post().to(package::import_package))
                        .route("/import/preview", web::post().to(package::preview_import))
                        .route("/{id}", web::get().to(package::get_package))
                        .route("/{id}", web::put().to(package::update_package))
                        .route("/{id}", web::delete().to(package::delete_package))
                        .route("/{id}/export", web::get().to(package::export_package))
                        .route(
                            "/{id}/calculate-price",
                            web::post().to(pricing::calculate_price),
                        )
                        .route(
                            "/{id}/versions",
                            web::get().to(package_history::get_versions),
                        )
                        .route(
                            "/{id}/versions/compare",
                            web::get().to(package_history::compare_versions),
                        )
                        .route(
                            "/{id}/audit-trail",
                            web::get().to(package_history::get_audit_trail),
                        ),
                )
                .service(
                    web::scope("/quotes/{id}/price")
                        .route("", web::get().to(quote_price::get_sync_status))
                        .route("/recalculate", web::post().to(quote_price::recalculate))
                        .route("/reset", web::post().to(quote_price::reset_to_calculated))
                        .route("/manual", web::put().to(quote_price::set_manual_price))
                        .route("/events", web::post().to(quote_price::add_event))
                        .route(
                            "/events/{event_id}",
                            web::delete().to(quote_price::remove_event),
                        ),
                ),
        );
}
