mod common;

use actix_web::{http::StatusCode, test};
use serde_json::{json, Value};

use common::{
    multipart_csv, oid, priced_quote, date, TestApp, ADMIN_ID, AGENT_ID, ALPINE_CSV,
};
use super_offer_api::config::AppConfig;
use super_offer_api::middleware::auth_context::{USER_ID_HEADER, USER_ROLE_HEADER};

#[actix_rt::test]
async fn test_health_check() {
    let test_app = TestApp::new();
    let app = test::init_service(test_app.create_app()).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
}

#[actix_rt::test]
async fn test_import_csv_creates_package() {
    let test_app = TestApp::new();
    let app = test::init_service(test_app.create_app()).await;

    let (content_type, body) = multipart_csv("alpine.csv", ALPINE_CSV);
    let req = test::TestRequest::post()
        .uri("/api/packages/import")
        .insert_header(("Content-Type", content_type))
        .insert_header((USER_ID_HEADER, ADMIN_ID))
        .insert_header((USER_ROLE_HEADER, "admin"))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["package"]["name"], "Alpine Escape");
    assert_eq!(body["package"]["version"], 1);
    assert_eq!(body["package"]["created_by"], ADMIN_ID);
    assert_eq!(body["package"]["pricing_matrix"].as_array().unwrap().len(), 4);
    assert_eq!(body["warnings"], json!([]));

    let id = oid(&body["package"]);
    let req = test::TestRequest::get()
        .uri(&format!("/api/packages/{}", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_rt::test]
async fn test_import_reports_every_bad_row() {
    let test_app = TestApp::new();
    let app = test::init_service(test_app.create_app()).await;

    let csv = "\
Package:,Broken
Period,1-5 People 2 Nights,1-5 People 3 Nights
June,90
July,95,abc
";
    let (content_type, body) = multipart_csv("broken.csv", csv);
    let req = test::TestRequest::post()
        .uri("/api/packages/import")
        .insert_header(("Content-Type", content_type))
        .insert_header((USER_ID_HEADER, ADMIN_ID))
        .insert_header((USER_ROLE_HEADER, "admin"))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "csv_parse_error");
    let errors: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e.as_str().unwrap())
        .collect();
    assert!(errors.contains(&"line 3: expected 2 prices, found 1"));
    assert!(errors.iter().any(|e| e.starts_with("line 4, column 3:")));

    let packages = test_app.state.package_service.list_packages(true).await.unwrap();
    assert!(packages.is_empty());
}

#[actix_rt::test]
async fn test_import_rejects_non_csv_and_oversized_files() {
    let mut config = AppConfig::default();
    config.max_csv_bytes = 64;
    let test_app = TestApp::with_config(config);
    let app = test::init_service(test_app.create_app()).await;

    let (content_type, body) = multipart_csv("alpine.xlsx", "Package:,X");
    let req = test::TestRequest::post()
        .uri("/api/packages/import/preview")
        .insert_header(("Content-Type", content_type))
        .insert_header((USER_ID_HEADER, ADMIN_ID))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let (content_type, body) = multipart_csv("alpine.csv", ALPINE_CSV);
    let req = test::TestRequest::post()
        .uri("/api/packages/import/preview")
        .insert_header(("Content-Type", content_type))
        .insert_header((USER_ID_HEADER, ADMIN_ID))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[actix_rt::test]
async fn test_preview_does_not_store() {
    let test_app = TestApp::new();
    let app = test::init_service(test_app.create_app()).await;

    let (content_type, body) = multipart_csv("alpine.csv", ALPINE_CSV);
    let req = test::TestRequest::post()
        .uri("/api/packages/import/preview")
        .insert_header(("Content-Type", content_type))
        .insert_header((USER_ID_HEADER, AGENT_ID))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["draft"]["duration_options"], json!([2, 3]));
    assert!(test_app
        .state
        .package_service
        .list_packages(true)
        .await
        .unwrap()
        .is_empty());
}

#[actix_rt::test]
async fn test_mutations_require_admin() {
    let test_app = TestApp::new();
    let app = test::init_service(test_app.create_app()).await;
    let draft = common::alpine_draft();

    let req = test::TestRequest::post()
        .uri("/api/packages")
        .set_json(&draft)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/api/packages")
        .insert_header((USER_ID_HEADER, AGENT_ID))
        .insert_header((USER_ROLE_HEADER, "agent"))
        .set_json(&draft)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "package_unauthorized");
}

#[actix_rt::test]
async fn test_create_rejects_invalid_draft() {
    let test_app = TestApp::new();
    let app = test::init_service(test_app.create_app()).await;
    let mut draft = common::alpine_draft();
    draft.duration_options.clear();

    let req = test::TestRequest::post()
        .uri("/api/packages")
        .insert_header((USER_ID_HEADER, ADMIN_ID))
        .insert_header((USER_ROLE_HEADER, "admin"))
        .set_json(&draft)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["field"], "duration_options");
}

#[actix_rt::test]
async fn test_update_with_stale_version_conflicts() {
    let test_app = TestApp::new();
    let package = test_app.seed_package().await;
    let id = package.id.unwrap().to_hex();
    let app = test::init_service(test_app.create_app()).await;

    let mut update = serde_json::to_value(package.to_draft()).unwrap();
    update["name"] = json!("Alpine Escape 2026");
    update["expected_version"] = json!(1);
    update["change_description"] = json!("Rename for next season");

    let req = test::TestRequest::put()
        .uri(&format!("/api/packages/{}", id))
        .insert_header((USER_ID_HEADER, ADMIN_ID))
        .insert_header((USER_ROLE_HEADER, "admin"))
        .set_json(&update)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["version"], 2);
    assert_eq!(body["last_modified_by"], ADMIN_ID);

    let req = test::TestRequest::put()
        .uri(&format!("/api/packages/{}", id))
        .insert_header((USER_ID_HEADER, ADMIN_ID))
        .insert_header((USER_ROLE_HEADER, "admin"))
        .set_json(&update)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["actual_version"], 2);
}

#[actix_rt::test]
async fn test_delete_is_soft_while_quotes_reference_package() {
    let test_app = TestApp::new();
    let package = test_app.seed_package().await;
    let quote = priced_quote(&package, 8, 3, date(2025, 6, 15));
    test_app.seed_quote(&quote).await;
    let id = package.id.unwrap().to_hex();
    let app = test::init_service(test_app.create_app()).await;

    let req = test::TestRequest::delete()
        .uri(&format!("/api/packages/{}", id))
        .insert_header((USER_ID_HEADER, ADMIN_ID))
        .insert_header((USER_ROLE_HEADER, "admin"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["kind"], "soft_deleted");
    assert_eq!(body["quote_count"], 1);
    assert_eq!(body["package"]["status"], "deleted");
    assert_eq!(body["package"]["version"], 2);

    // Tombstoned packages drop out of the default listing
    let req = test::TestRequest::get().uri("/api/packages").to_request();
    let listed: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listed, json!([]));

    let req = test::TestRequest::delete()
        .uri(&format!("/api/packages/{}", id))
        .insert_header((USER_ID_HEADER, ADMIN_ID))
        .insert_header((USER_ROLE_HEADER, "admin"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "package_in_use");
}

#[actix_rt::test]
async fn test_delete_is_hard_without_quotes() {
    let test_app = TestApp::new();
    let package = test_app.seed_package().await;
    let id = package.id.unwrap().to_hex();
    let app = test::init_service(test_app.create_app()).await;

    let req = test::TestRequest::delete()
        .uri(&format!("/api/packages/{}", id))
        .insert_header((USER_ID_HEADER, ADMIN_ID))
        .insert_header((USER_ROLE_HEADER, "admin"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["kind"], "hard_deleted");

    let req = test::TestRequest::get()
        .uri(&format!("/api/packages/{}", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_export_round_trips_through_import() {
    let test_app = TestApp::new();
    let package = test_app.seed_package().await;
    let id = package.id.unwrap().to_hex();
    let app = test::init_service(test_app.create_app()).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/packages/{}/export", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("Content-Type").unwrap(),
        "text/csv; charset=utf-8"
    );
    let bytes = test::read_body(resp).await;
    let csv = String::from_utf8(bytes.to_vec()).unwrap();

    let (content_type, body) = multipart_csv("export.csv", &csv);
    let req = test::TestRequest::post()
        .uri("/api/packages/import/preview")
        .insert_header(("Content-Type", content_type))
        .insert_header((USER_ID_HEADER, ADMIN_ID))
        .set_payload(body)
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let reparsed: super_offer_api::models::package::PackageDraft =
        serde_json::from_value(body["draft"].clone()).unwrap();

    assert_eq!(reparsed.group_size_tiers, package.group_size_tiers);
    for row in &package.pricing_matrix {
        let other = reparsed
            .pricing_matrix
            .iter()
            .find(|r| r.period == row.period)
            .unwrap();
        for cell in &row.prices {
            assert_eq!(other.price_for(cell.tier_index, cell.nights), Some(cell.price));
        }
    }
}

#[actix_rt::test]
async fn test_invalid_package_id_is_bad_request() {
    let test_app = TestApp::new();
    let app = test::init_service(test_app.create_app()).await;

    let req = test::TestRequest::get()
        .uri("/api/packages/not-an-id")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
