//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod clubs;
mod data;
mod requests;

use crate::config::Settings;
use crate::error::{not_found_error, AppError};
use crate::import::MAX_FILE_SIZE;
use crate::state::SharedState;
use axum::{
    extract::{DefaultBodyLimit, State},
    handler::HandlerWithoutStateExt,
    http::{header, Method, Uri},
    routing::{get, post, put},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::{info, Level};

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(settings);

    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    let router = Router::new()
        // Health check
        .route("/health", get(health_check))

        // Request routes
        .route(
            "/api/requests",
            get(requests::list_requests)
                .post(requests::create_request)
                .delete(requests::delete_all_requests),
        )
        .route("/api/requests/random", get(requests::random_request))
        .route(
            "/api/requests/{id}",
            put(requests::update_request).delete(requests::delete_request),
        )
        .route("/api/requests/{id}/complete", post(requests::complete_request))

        // Club routes
        .route("/api/clubs", get(clubs::list_clubs).post(clubs::create_club))
        .route("/api/clubs/{id}", put(clubs::update_club).delete(clubs::delete_club))

        // Bulk data and import routes
        .route("/api/data", get(data::get_data).post(data::set_data))
        .route("/api/import", post(data::bulk_import))
        .route(
            "/api/import/spreadsheet",
            post(data::import_spreadsheet).layer(DefaultBodyLimit::max(MAX_FILE_SIZE * 2)),
        );

    // Unmatched paths go to the static assets first, when configured
    let router = match &settings.storage.static_dir {
        Some(dir) => {
            info!("Serving static assets from {}", dir.display());
            router.fallback_service(ServeDir::new(dir).not_found_service(route_not_found.into_service()))
        }
        None => router.fallback(route_not_found),
    };

    // Apply middleware and state
    router.layer(middleware).with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let cors = if origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(origins)
    };

    cors.allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}

/// Health check endpoint
async fn health_check(State(state): State<SharedState>) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "diskLoads": state.store.disk_loads()
    }))
}

/// Fallback for unmatched routes
async fn route_not_found(uri: Uri) -> AppError {
    not_found_error(format!("No route for {}", uri.path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use crate::store::DataStore;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        state: SharedState,
        _dir: TempDir,
    }

    impl TestApp {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let state = Arc::new(AppState::new(DataStore::new(dir.path().join("data.json"))));
            let router = create_router(state.clone(), &Settings::default());
            Self {
                router,
                state,
                _dir: dir,
            }
        }

        async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            let body = match body {
                Some(json) => {
                    builder = builder.header(header::CONTENT_TYPE, "application/json");
                    Body::from(serde_json::to_vec(&json).unwrap())
                }
                None => Body::empty(),
            };
            let response = self
                .router
                .clone()
                .oneshot(builder.body(body).unwrap())
                .await
                .unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            (status, value)
        }

        async fn upload(&self, uri: &str, bytes: Vec<u8>) -> (StatusCode, Value) {
            let request = Request::builder()
                .method(Method::POST)
                .uri(uri)
                .body(Body::from(bytes))
                .unwrap();
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new();
        let (status, body) = app.send(Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["diskLoads"], json!(0));
        assert!(body.get("dataFile").is_none());
    }

    #[tokio::test]
    async fn test_request_lifecycle() {
        let app = TestApp::new();

        let (status, created) = app
            .send(Method::POST, "/api/requests", Some(json!({"text": "Call client"})))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["text"], json!("Call client"));
        assert!(created["id"].is_u64());
        assert!(created["createdAt"].is_string());
        let id = created["id"].as_u64().unwrap();

        let (_, listed) = app.send(Method::GET, "/api/requests", None).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["id"], json!(id));

        let (status, removed) = app
            .send(Method::DELETE, &format!("/api/requests/{}", id), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(removed, created);

        let (_, listed) = app.send(Method::GET, "/api/requests", None).await;
        assert_eq!(listed, json!([]));
    }

    #[tokio::test]
    async fn test_unknown_request_is_404() {
        let app = TestApp::new();
        let (status, body) = app.send(Method::DELETE, "/api/requests/42", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], json!("NOT_FOUND"));

        let (status, _) = app
            .send(Method::PUT, "/api/requests/42", Some(json!({"text": "x"})))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_text_is_400() {
        let app = TestApp::new();
        let (status, body) = app
            .send(Method::POST, "/api/requests", Some(json!({"text": "   "})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], json!("VALIDATION_ERROR"));

        let (status, _) = app.send(Method::POST, "/api/requests", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_search_and_complete() {
        let app = TestApp::new();
        let (_, first) = app
            .send(Method::POST, "/api/requests", Some(json!({"text": "Call Ivanov"})))
            .await;
        app.send(Method::POST, "/api/requests", Some(json!({"text": "Send documents"})))
            .await;
        let id = first["id"].as_u64().unwrap();

        let (status, edited) = app
            .send(
                Method::PUT,
                &format!("/api/requests/{}", id),
                Some(json!({"text": "Call Ivanov again"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(edited["text"], json!("Call Ivanov again"));

        let (_, found) = app.send(Method::GET, "/api/requests?search=IVANOV", None).await;
        assert_eq!(found.as_array().unwrap().len(), 1);

        let (status, done) = app
            .send(Method::POST, &format!("/api/requests/{}/complete", id), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(done["completedCount"], json!(1));
        assert_eq!(done["remaining"], json!(1));

        let (_, data) = app.send(Method::GET, "/api/data", None).await;
        assert_eq!(data["completedCount"], json!(1));
    }

    #[tokio::test]
    async fn test_random_and_delete_all() {
        let app = TestApp::new();
        let (status, _) = app.send(Method::GET, "/api/requests/random", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        app.send(Method::POST, "/api/requests", Some(json!({"text": "Only one"})))
            .await;
        let (status, picked) = app.send(Method::GET, "/api/requests/random", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(picked["text"], json!("Only one"));

        let (status, cleared) = app.send(Method::DELETE, "/api/requests", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cleared["deleted"], json!(1));
    }

    #[tokio::test]
    async fn test_deleting_club_unlinks_requests() {
        let app = TestApp::new();
        let (status, club) = app
            .send(
                Method::POST,
                "/api/clubs",
                Some(json!({"name": "Chess club", "address": "Main st. 1", "lat": "55.7", "lng": 37.6})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let club_id = club["id"].as_u64().unwrap();

        let (_, request) = app
            .send(
                Method::POST,
                "/api/requests",
                Some(json!({"text": "Visit the club", "clubId": club_id})),
            )
            .await;
        assert_eq!(request["clubId"], json!(club_id));

        let (status, deleted) = app
            .send(Method::DELETE, &format!("/api/clubs/{}", club_id), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["unlinkedRequests"], json!(1));

        let (_, listed) = app.send(Method::GET, "/api/requests", None).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["clubId"], Value::Null);

        let (_, clubs) = app.send(Method::GET, "/api/clubs", None).await;
        assert_eq!(clubs, json!([]));
    }

    #[tokio::test]
    async fn test_club_without_coordinates_is_400() {
        let app = TestApp::new();
        let (status, _) = app
            .send(Method::POST, "/api/clubs", Some(json!({"name": "Nowhere"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_set_data_accepts_legacy_layout() {
        let app = TestApp::new();
        let (status, data) = app
            .send(Method::POST, "/api/data", Some(json!(["Old entry", {"id": 7, "text": "Object entry"}])))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data["requests"].as_array().unwrap().len(), 2);
        assert_eq!(data["nextRequestId"], json!(9));

        let (_, created) = app
            .send(Method::POST, "/api/requests", Some(json!({"text": "New"})))
            .await;
        assert_eq!(created["id"], json!(9));
    }

    #[tokio::test]
    async fn test_set_data_never_reissues_ids() {
        let app = TestApp::new();
        let mut issued = Vec::new();
        for text in ["A", "B", "C"] {
            let (_, created) = app
                .send(Method::POST, "/api/requests", Some(json!({"text": text})))
                .await;
            issued.push(created["id"].clone());
        }
        app.send(Method::DELETE, "/api/requests", None).await;

        let (status, data) = app
            .send(Method::POST, "/api/data", Some(json!(["Legacy entry"])))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data["requests"][0]["text"], json!("Legacy entry"));
        assert!(!issued.contains(&data["requests"][0]["id"]));
        assert_eq!(data["requests"][0]["id"], json!(4));
        assert_eq!(data["nextRequestId"], json!(5));
    }

    #[tokio::test]
    async fn test_set_data_with_out_of_range_id_is_400() {
        let app = TestApp::new();
        let (status, body) = app
            .send(
                Method::POST,
                "/api/data",
                Some(json!({"requests": [{"id": u64::MAX, "text": "a"}, "b"]})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], json!("VALIDATION_ERROR"));

        let (_, data) = app.send(Method::GET, "/api/data", None).await;
        assert_eq!(data["requests"], json!([]));
    }

    #[tokio::test]
    async fn test_bulk_import_is_idempotent() {
        let app = TestApp::new();
        let body = json!({
            "requests": ["Call client", {"text": "Send invoice"}],
            "clubs": [{"name": "Chess", "lat": 1, "lng": 2}]
        });

        let (status, first) = app.send(Method::POST, "/api/import", Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["addedRequests"], json!(2));
        assert_eq!(first["addedClubs"], json!(1));

        let (_, second) = app.send(Method::POST, "/api/import", Some(body)).await;
        assert_eq!(second["addedRequests"], json!(0));
        assert_eq!(second["skippedRequests"], json!(2));
        assert_eq!(second["skippedClubs"], json!(1));
    }

    #[tokio::test]
    async fn test_spreadsheet_with_wrong_extension_is_rejected() {
        let app = TestApp::new();
        let (status, body) = app
            .upload("/api/import/spreadsheet?filename=requests.csv", b"number,contact".to_vec())
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], json!("IMPORT_ERROR"));
    }

    #[tokio::test]
    async fn test_spreadsheet_without_filename_is_json_400() {
        let app = TestApp::new();
        let (status, body) = app.upload("/api/import/spreadsheet", vec![1, 2, 3]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["code"], json!("BAD_REQUEST"));
    }

    #[tokio::test]
    async fn test_oversized_spreadsheet_is_413() {
        let app = TestApp::new();
        let (status, body) = app
            .upload("/api/import/spreadsheet?filename=big.xlsx", vec![0; MAX_FILE_SIZE + 1])
            .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["code"], json!("IMPORT_ERROR"));
        assert!(body["message"].as_str().unwrap().contains("too large"));
    }

    #[tokio::test]
    async fn test_spreadsheet_without_header_lists_first_rows() {
        let app = TestApp::new();
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Name").unwrap();
        sheet.write_string(0, 1, "Phone").unwrap();
        sheet.write_string(1, 0, "Ivanov").unwrap();
        sheet.write_string(1, 1, "555-01-02").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let (status, body) = app
            .upload("/api/import/spreadsheet?filename=people.xlsx", bytes)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], json!("IMPORT_ERROR"));
        let message = body["message"].as_str().unwrap();
        assert!(message.contains(r#"["Name","Phone"]"#), "{message}");
        assert!(message.contains("Ivanov"), "{message}");

        let data = app.state.store.read().await.unwrap();
        assert!(data.requests.is_empty());
    }

    #[tokio::test]
    async fn test_spreadsheet_import_twice_adds_once() {
        let app = TestApp::new();
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Report").unwrap();
        sheet.write_string(1, 0, "Номер").unwrap();
        sheet.write_string(1, 10, "Контактное лицо").unwrap();
        sheet.write_number(2, 0, 501).unwrap();
        sheet.write_string(2, 10, "Office/Sidorov").unwrap();
        sheet.write_number(3, 0, 502).unwrap();
        sheet.write_string(3, 10, "Romashka LLC").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        for expected in [2, 0] {
            let (status, report) = app
                .upload("/api/import/spreadsheet?filename=requests.xlsx", bytes.clone())
                .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(report["added"], json!(expected));
        }

        let data = app.state.store.read().await.unwrap();
        let texts: Vec<&str> = data.requests.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["Request: 501 — Sidorov", "Request: 502 — Romashka LLC"]);
    }

    #[tokio::test]
    async fn test_unmatched_route_is_json_404() {
        let app = TestApp::new();
        let (status, body) = app.send(Method::GET, "/api/nothing-here", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], json!(false));
    }
}
