//! # API REST
//!
//! REST API implementation for the OPD records system.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON envelope, caller identity headers, CORS)
//!
//! Uses `opd-core` for storage and access rules and `api-shared` for wire types.

#![warn(rust_2018_idioms)]

pub mod auth;
pub mod error;
pub mod extract;
pub mod handlers;

use axum::routing::{get, post};
use axum::{middleware, Router};
use opd_core::Services;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use handlers::{adl_files, health, options, patients, prescriptions, proformas, users};

pub use error::{ApiError, ApiResult};

/// Application state for the REST API server
///
/// Every resource service, sharing one database handle and one change bus.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "OPD Records API"),
    paths(
        health::health,
        users::list,
        users::get,
        users::create,
        users::update,
        users::delete,
        patients::list,
        patients::get,
        patients::create,
        patients::update,
        patients::deactivate,
        patients::outpatient_record,
        patients::save_outpatient_record,
        proformas::list,
        proformas::list_for_patient,
        proformas::get,
        proformas::create,
        proformas::update,
        proformas::delete,
        prescriptions::create,
        prescriptions::create_bulk,
        prescriptions::list_for_proforma,
        prescriptions::get,
        prescriptions::update,
        prescriptions::delete,
        adl_files::list,
        adl_files::get,
        adl_files::for_patient,
        adl_files::update,
        adl_files::retrieve,
        adl_files::return_file,
        adl_files::archive,
        adl_files::movements,
        options::list,
        options::add,
        options::delete,
    ),
    components(schemas(
        api_shared::HealthRes,
        api_shared::ErrorRes,
        api_shared::Pagination,
        api_shared::Role,
        api_shared::Sex,
        api_shared::VisitType,
        api_shared::CaseSeverity,
        api_shared::DoctorDecision,
        api_shared::AdlStatus,
        api_shared::MovementType,
        api_shared::AuditAction,
        api_shared::UserInput,
        api_shared::User,
        api_shared::UserList,
        api_shared::PatientInput,
        api_shared::Patient,
        api_shared::PatientList,
        api_shared::OutpatientInput,
        api_shared::OutpatientRecord,
        api_shared::ProformaInput,
        api_shared::ClinicalProforma,
        api_shared::ProformaList,
        api_shared::ProformaSaved,
        api_shared::PrescriptionInput,
        api_shared::Prescription,
        api_shared::PrescriptionList,
        api_shared::CreatePrescriptionReq,
        api_shared::BulkPrescriptionReq,
        api_shared::BulkPrescriptionRes,
        api_shared::AdlDetails,
        api_shared::AdlFile,
        api_shared::AdlFileList,
        api_shared::UpdateAdlFileReq,
        api_shared::AdlMovementReq,
        api_shared::FileMovement,
        api_shared::MovementList,
        api_shared::AddOptionReq,
        api_shared::OptionList,
    ))
)]
pub struct ApiDoc;

/// Builds the REST router.
///
/// `/health` and the Swagger UI are open; every other route requires the caller identity
/// headers (see [`auth::require_identity`]).
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/users", get(users::list).post(users::create))
        .route(
            "/users/:id",
            get(users::get).put(users::update).delete(users::delete),
        )
        .route("/patients", get(patients::list).post(patients::create))
        .route(
            "/patients/:id",
            get(patients::get)
                .put(patients::update)
                .delete(patients::deactivate),
        )
        .route(
            "/patients/:id/outpatient-record",
            get(patients::outpatient_record).put(patients::save_outpatient_record),
        )
        .route(
            "/clinical-proforma",
            get(proformas::list).post(proformas::create),
        )
        .route(
            "/clinical-proforma/patient/:patient_id",
            get(proformas::list_for_patient),
        )
        .route(
            "/clinical-proforma/:id",
            get(proformas::get)
                .put(proformas::update)
                .delete(proformas::delete),
        )
        .route("/prescriptions", post(prescriptions::create))
        .route("/prescriptions/bulk", post(prescriptions::create_bulk))
        .route(
            "/prescriptions/proforma/:proforma_id",
            get(prescriptions::list_for_proforma),
        )
        .route(
            "/prescriptions/:id",
            get(prescriptions::get)
                .put(prescriptions::update)
                .delete(prescriptions::delete),
        )
        .route("/adl-files", get(adl_files::list))
        .route("/adl-files/patient/:patient_id", get(adl_files::for_patient))
        .route(
            "/adl-files/:id",
            get(adl_files::get).put(adl_files::update),
        )
        .route("/adl-files/:id/retrieve", post(adl_files::retrieve))
        .route("/adl-files/:id/return", post(adl_files::return_file))
        .route("/adl-files/:id/archive", post(adl_files::archive))
        .route("/adl-files/:id/movements", get(adl_files::movements))
        .route(
            "/clinical-options/:field",
            get(options::list).post(options::add),
        )
        .route("/clinical-options/:field/:label", axum::routing::delete(options::delete))
        .route_layer(middleware::from_fn(auth::require_identity));

    Router::new()
        .route("/health", get(health::health))
        .merge(protected)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use opd_core::{ChangeBus, Database};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> (Router, Services) {
        let services = Services::new(
            Database::open_in_memory().expect("in-memory database"),
            ChangeBus::new(),
        );
        (router(AppState::new(services.clone())), services)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        role: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(role) = role {
            builder = builder.header("x-user-role", role);
        }
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn register_patient(app: &Router, name: &str) -> i64 {
        let (status, body) = send(
            app,
            "POST",
            "/patients",
            Some("Admin"),
            Some(json!({ "name": name, "sex": "F", "age": 29 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["id"].as_i64().unwrap()
    }

    async fn record_visit(app: &Router, patient_id: i64, extra: Value) -> Value {
        let mut body = json!({ "patient_id": patient_id, "visit_date": "2024-01-10" });
        if let (Some(target), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            target.extend(extra.clone());
        }
        let (status, body) =
            send(app, "POST", "/clinical-proforma", Some("JR"), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"].clone()
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let (app, _) = app();
        let (status, body) = send(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_missing_or_unknown_role_is_unauthorised() {
        let (app, _) = app();

        let (status, body) = send(&app, "GET", "/patients", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let (status, _) = send(&app, "GET", "/patients", Some("Nurse"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_patient_list_uses_envelope_and_pagination() {
        let (app, _) = app();
        for name in ["Asha", "Bina", "Chitra"] {
            register_patient(&app, name).await;
        }

        let (status, body) =
            send(&app, "GET", "/patients?page=2&limit=2", Some("MWO"), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["patients"].as_array().unwrap().len(), 1);
        assert_eq!(
            body["data"]["pagination"],
            json!({ "page": 2, "limit": 2, "total": 3, "pages": 2 })
        );

        let (status, body) = send(&app, "GET", "/patients?search=bin", Some("SR"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["patients"][0]["name"], "Bina");
    }

    #[tokio::test]
    async fn test_mwo_cannot_read_proformas() {
        let (app, _) = app();
        let patient_id = register_patient(&app, "Asha").await;
        let proforma = record_visit(&app, patient_id, json!({})).await;
        let id = proforma["proforma"]["id"].as_i64().unwrap();

        let (status, body) = send(
            &app,
            "GET",
            &format!("/clinical-proforma/{id}"),
            Some("MWO"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);

        let (status, _) = send(
            &app,
            "GET",
            &format!("/clinical-proforma/{id}"),
            Some("JR"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_bulk_prescriptions_are_all_or_nothing() {
        let (app, services) = app();
        let patient_id = register_patient(&app, "Asha").await;
        let proforma = record_visit(&app, patient_id, json!({})).await;
        let proforma_id = proforma["proforma"]["id"].as_i64().unwrap();

        let (status, body) = send(
            &app,
            "POST",
            "/prescriptions/bulk",
            Some("SR"),
            Some(json!({
                "clinical_proforma_id": proforma_id,
                "prescriptions": [
                    { "medicine": "Olanzapine", "dosage": "5mg", "when": "Night" },
                    { "medicine": " " }
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "prescription 2 has no medicine");

        let (status, body) = send(
            &app,
            "POST",
            "/prescriptions/bulk",
            Some("SR"),
            Some(json!({
                "clinical_proforma_id": proforma_id,
                "prescriptions": [
                    { "medicine": "Olanzapine", "dosage": "5mg", "when": "Night" },
                    { "medicine": "Clonazepam" }
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["count"], 2);

        let stored = services
            .prescriptions
            .list_for_proforma(proforma_id, &opd_core::PageRequest::default())
            .unwrap();
        assert_eq!(stored.pagination.total, 2);
        assert_eq!(stored.items[0].item.when_to_take, "Night");
    }

    #[tokio::test]
    async fn test_bulk_prescriptions_for_unknown_proforma_is_not_found() {
        let (app, _) = app();
        let (status, body) = send(
            &app,
            "POST",
            "/prescriptions/bulk",
            Some("JR"),
            Some(json!({
                "clinical_proforma_id": 404,
                "prescriptions": [{ "medicine": "Lithium" }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_user_management_is_admin_only() {
        let (app, _) = app();
        let user = json!({ "name": "Dr Rao", "role": "JR", "email": "rao@hospital.org" });

        let (status, _) = send(&app, "POST", "/users", Some("SR"), Some(user.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&app, "GET", "/users", Some("JR"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, "POST", "/users", Some("Admin"), Some(user)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["email"], "rao@hospital.org");
    }

    #[tokio::test]
    async fn test_outpatient_record_writes_need_admin_or_mwo() {
        let (app, _) = app();
        let patient_id = register_patient(&app, "Asha").await;
        let uri = format!("/patients/{patient_id}/outpatient-record");
        let record = json!({ "occupation": "Farmer", "district": "Pune" });

        let (status, _) = send(&app, "PUT", &uri, Some("JR"), Some(record.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, "PUT", &uri, Some("MWO"), Some(record)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["occupation"], "Farmer");

        let (status, body) = send(&app, "GET", &uri, Some("JR"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["district"], "Pune");
    }

    #[tokio::test]
    async fn test_complex_case_opens_adl_file_and_movements_follow_workflow() {
        let (app, _) = app();
        let patient_id = register_patient(&app, "Asha").await;
        let saved = record_visit(
            &app,
            patient_id,
            json!({ "doctor_decision": "complex_case", "adl_reasoning": "Needs full work-up" }),
        )
        .await;

        assert_eq!(saved["proforma"]["requires_adl_file"], true);
        let file_id = saved["adl_file"]["id"].as_i64().unwrap();
        assert_eq!(saved["proforma"]["adl_file_id"], file_id);

        let retrieve = format!("/adl-files/{file_id}/retrieve");
        let (status, body) = send(&app, "POST", &retrieve, Some("SR"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["file_status"], "retrieved");

        let archive = format!("/adl-files/{file_id}/archive");
        let (status, _) = send(
            &app,
            "POST",
            &archive,
            Some("Admin"),
            Some(json!({ "notes": "Closed" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "POST", &retrieve, Some("SR"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, body) = send(
            &app,
            "GET",
            &format!("/adl-files/{file_id}/movements"),
            Some("SR"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let kinds: Vec<&str> = body["data"]["movements"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["movement_type"].as_str().unwrap())
            .collect();
        assert_eq!(kinds, vec!["created", "retrieved", "archived"]);

        let (status, body) = send(&app, "GET", "/adl-files?status=bogus", Some("SR"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_clinical_options_add_is_idempotent() {
        let (app, _) = app();
        let label = json!({ "label": "Euphoric" });

        send(&app, "POST", "/clinical-options/mood", Some("JR"), Some(label.clone())).await;
        let (status, body) =
            send(&app, "POST", "/clinical-options/mood", Some("SR"), Some(label)).await;
        assert_eq!(status, StatusCode::OK);
        let count = body["data"]["options"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|o| *o == "Euphoric")
            .count();
        assert_eq!(count, 1);

        let (status, body) = send(
            &app,
            "DELETE",
            "/clinical-options/mood/Euphoric",
            Some("JR"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body["data"]["options"]
            .as_array()
            .unwrap()
            .contains(&json!("Euphoric")));

        let (status, _) = send(&app, "GET", "/clinical-options/colour", Some("JR"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            "POST",
            "/clinical-options/mood",
            Some("JR"),
            Some(json!({ "label": "Low, tearful" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_malformed_body_gets_error_envelope() {
        let (app, _) = app();
        let req = Request::builder()
            .method("POST")
            .uri("/patients")
            .header("x-user-role", "Admin")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
    }

    #[test]
    fn test_openapi_lists_bulk_endpoint() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/prescriptions/bulk"));
        assert!(doc.paths.paths.contains_key("/clinical-proforma/patient/{patient_id}"));
    }
}
