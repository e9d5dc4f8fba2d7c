//! HTTP API tests against the router with mock providers.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::config::Config as CoreConfig;
use skin_analysis_service::config::{
    AnalysisConfig, GoogleConfig, LimitsConfig, ModelConfig, ObservabilityConfig,
    DEFAULT_API_BASE,
};
use skin_analysis_service::models::FullAnalysis;
use skin_analysis_service::services::analysis::healing_prompt;
use skin_analysis_service::services::metrics::init_metrics;
use skin_analysis_service::services::providers::mock::{MockImageProvider, MockVisionProvider};
use skin_analysis_service::services::AnalysisService;
use skin_analysis_service::session::{ANALYSIS_FAILED_MESSAGE, INVALID_FILE_TYPE_MESSAGE};
use skin_analysis_service::startup::{build_router, AppState};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "X-SKIN-ANALYSIS-BOUNDARY";
const MAX_UPLOAD_BYTES: usize = 4096;
const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

fn test_config(api_key: &str) -> AnalysisConfig {
    AnalysisConfig {
        common: CoreConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        models: ModelConfig {
            text_model: "mock-vision".to_string(),
            image_model: "mock-image".to_string(),
        },
        google: GoogleConfig {
            api_key: Secret::new(api_key.to_string()),
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout_secs: 5,
        },
        limits: LimitsConfig {
            max_upload_bytes: MAX_UPLOAD_BYTES,
            session_idle_secs: 60,
        },
        observability: ObservabilityConfig {
            log_level: "debug".to_string(),
            otlp_endpoint: None,
        },
    }
}

fn state_with(vision: MockVisionProvider, images: MockImageProvider) -> AppState {
    AppState::new(
        test_config("test-api-key"),
        AnalysisService::new(Arc::new(vision), Arc::new(images)),
    )
}

fn test_state() -> AppState {
    state_with(MockVisionProvider::new(true), MockImageProvider::new(true))
}

fn app(state: &AppState) -> Router {
    build_router(state.clone())
}

fn multipart_body(file_name: &str, content_type: &str, data: &[u8], source: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(source) = source {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"source\"\r\n\r\n{source}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: Method, uri: &str, value: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(value.to_string()))
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

async fn create_session(state: &AppState) -> String {
    let response = app(state)
        .oneshot(empty_request(Method::POST, "/api/sessions"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["sessionId"]
        .as_str()
        .unwrap()
        .to_string()
}

async fn upload_png(state: &AppState, id: &str) -> Response {
    app(state)
        .oneshot(upload_request(
            &format!("/api/sessions/{id}/image"),
            multipart_body("arm.png", "image/png", PNG_BYTES, None),
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn new_session_has_empty_camel_case_view() {
    let state = test_state();
    let response = app(&state)
        .oneshot(empty_request(Method::POST, "/api/sessions"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert!(body["sessionId"].is_string());
    assert!(body["uploadedImage"].is_null());
    assert!(body["fullAnalysis"].is_null());
    assert_eq!(body["isLoading"], false);
    assert_eq!(body["dragOver"], false);
    assert!(body["error"].is_null());
}

#[tokio::test]
async fn uploading_png_stores_data_url() {
    let state = test_state();
    let id = create_session(&state).await;

    let response = upload_png(&state, &id).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let expected = format!("data:image/png;base64,{}", BASE64.encode(PNG_BYTES));
    assert_eq!(body["uploadedImage"], expected);
    assert_eq!(body["uploadedImageType"], "image/png");
    assert_eq!(body["uploadedFileName"], "arm.png");
}

#[tokio::test]
async fn unsupported_type_is_rejected_and_recorded_on_session() {
    let state = test_state();
    let id = create_session(&state).await;

    let response = app(&state)
        .oneshot(upload_request(
            &format!("/api/sessions/{id}/image"),
            multipart_body("notes.pdf", "application/pdf", b"%PDF-1.4", None),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body_json(response).await["error"], INVALID_FILE_TYPE_MESSAGE);

    let view = body_json(
        app(&state)
            .oneshot(empty_request(Method::GET, &format!("/api/sessions/{id}")))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(view["error"], INVALID_FILE_TYPE_MESSAGE);
    assert!(view["uploadedImage"].is_null());
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let state = test_state();
    let id = create_session(&state).await;

    let response = app(&state)
        .oneshot(upload_request(
            &format!("/api/sessions/{id}/image"),
            multipart_body("big.png", "image/png", &vec![0u8; MAX_UPLOAD_BYTES + 1], None),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn upload_past_body_limit_is_recorded_on_session() {
    let state = test_state();
    let id = create_session(&state).await;
    upload_png(&state, &id).await;

    let response = app(&state)
        .oneshot(upload_request(
            &format!("/api/sessions/{id}/image"),
            multipart_body(
                "huge.png",
                "image/png",
                &vec![0u8; MAX_UPLOAD_BYTES + 128 * 1024],
                None,
            ),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let message = body_json(response).await["error"].clone();
    assert!(message.as_str().unwrap().starts_with("File is too large"));

    let view = body_json(
        app(&state)
            .oneshot(empty_request(Method::GET, &format!("/api/sessions/{id}")))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(view["error"], message);
    assert_eq!(view["uploadedFileName"], "arm.png");
}

#[tokio::test]
async fn analyze_without_image_is_bad_request() {
    let state = test_state();
    let id = create_session(&state).await;

    let response = app(&state)
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/sessions/{id}/analyze"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn analyze_returns_diagnosis_with_ordered_healing_images() {
    let state = test_state();
    let id = create_session(&state).await;
    upload_png(&state, &id).await;

    let response = app(&state)
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/sessions/{id}/analyze"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let view = body_json(response).await;
    assert_eq!(view["isLoading"], false);
    assert!(view["error"].is_null());

    let analysis: FullAnalysis = serde_json::from_value(view["fullAnalysis"].clone()).unwrap();
    assert_eq!(analysis.diagnosis.condition, "Atopic dermatitis");
    assert_eq!(analysis.healing_images.len(), 3);
    for (step, image) in analysis.healing_stages() {
        let prompt = healing_prompt(&analysis.diagnosis.condition, step);
        assert_eq!(image, MockImageProvider::image_for(&prompt));
    }

    // First healing image is served decoded
    let response = app(&state)
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/sessions/{id}/healing-images/0"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    let expected = healing_prompt(
        &analysis.diagnosis.condition,
        &analysis.diagnosis.treatment_plan[0],
    );
    assert_eq!(body_bytes(response).await, expected.into_bytes());

    let response = app(&state)
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/sessions/{id}/healing-images/7"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn healing_image_is_served_with_model_reported_type() {
    let state = state_with(
        MockVisionProvider::new(true),
        MockImageProvider::new(true).with_mime_type("image/png"),
    );
    let id = create_session(&state).await;
    upload_png(&state, &id).await;

    let response = app(&state)
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/sessions/{id}/analyze"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(&state)
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/sessions/{id}/healing-images/1"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
}

#[tokio::test]
async fn failed_analysis_reports_generic_error() {
    let state = state_with(
        MockVisionProvider::new(true),
        MockImageProvider::new(true).failing_on("corticosteroid"),
    );
    let id = create_session(&state).await;
    upload_png(&state, &id).await;

    let response = app(&state)
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/sessions/{id}/analyze"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let view = body_json(response).await;
    assert_eq!(view["error"], ANALYSIS_FAILED_MESSAGE);
    assert!(view["fullAnalysis"].is_null());
    assert_eq!(view["isLoading"], false);
    assert!(view["uploadedImage"].is_string());
}

#[tokio::test]
async fn removing_image_clears_result() {
    let state = test_state();
    let id = create_session(&state).await;
    upload_png(&state, &id).await;
    app(&state)
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/sessions/{id}/analyze"),
        ))
        .await
        .unwrap();

    let response = app(&state)
        .oneshot(empty_request(
            Method::DELETE,
            &format!("/api/sessions/{id}/image"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let view = body_json(response).await;
    assert!(view["uploadedImage"].is_null());
    assert!(view["fullAnalysis"].is_null());
    assert!(view["error"].is_null());
    assert_eq!(view["isLoading"], false);
}

#[tokio::test]
async fn drag_state_follows_events_and_drop_resets_it() {
    let state = test_state();
    let id = create_session(&state).await;

    let view = body_json(
        app(&state)
            .oneshot(json_request(
                Method::POST,
                &format!("/api/sessions/{id}/drag"),
                json!({ "over": true }),
            ))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(view["dragOver"], true);

    let response = app(&state)
        .oneshot(upload_request(
            &format!("/api/sessions/{id}/image"),
            multipart_body("drop.jpg", "image/jpeg", b"\xff\xd8\xff", Some("drop")),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let view = body_json(response).await;
    assert_eq!(view["dragOver"], false);
    assert_eq!(view["uploadedImageType"], "image/jpeg");
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let state = test_state();
    let id = uuid::Uuid::new_v4();

    let response = app(&state)
        .oneshot(empty_request(Method::GET, &format!("/api/sessions/{id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleted_session_is_gone() {
    let state = test_state();
    let id = create_session(&state).await;

    let response = app(&state)
        .oneshot(empty_request(Method::DELETE, &format!("/api/sessions/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app(&state)
        .oneshot(empty_request(Method::GET, &format!("/api/sessions/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn one_shot_analysis_returns_full_analysis() {
    let state = test_state();

    let response = app(&state)
        .oneshot(upload_request(
            "/api/analyses",
            multipart_body("arm.png", "image/png", PNG_BYTES, None),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["diagnosis"]["condition"], "Atopic dermatitis");
    assert_eq!(body["diagnosis"]["treatmentPlan"].as_array().unwrap().len(), 3);
    assert_eq!(body["healingImages"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn one_shot_analysis_validates_and_hides_remote_errors() {
    let state = state_with(MockVisionProvider::new(false), MockImageProvider::new(true));

    let response = app(&state)
        .oneshot(upload_request(
            "/api/analyses",
            multipart_body("anim.gif", "image/gif", b"GIF89a", None),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let response = app(&state)
        .oneshot(upload_request(
            "/api/analyses",
            multipart_body("arm.png", "image/png", PNG_BYTES, None),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["error"], ANALYSIS_FAILED_MESSAGE);
    assert!(!body.to_string().contains("not enabled"));
}

#[tokio::test]
async fn readiness_requires_real_api_key() {
    let ready = test_state();
    let response = app(&ready)
        .oneshot(empty_request(Method::GET, "/ready"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let unready = AppState::new(
        test_config("YOUR_API_KEY_HERE"),
        AnalysisService::new(
            Arc::new(MockVisionProvider::new(true)),
            Arc::new(MockImageProvider::new(true)),
        ),
    );
    let response = app(&unready)
        .oneshot(empty_request(Method::GET, "/ready"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn deep_readiness_asks_providers() {
    let healthy = test_state();
    let response = app(&healthy)
        .oneshot(empty_request(Method::GET, "/ready?deep=true"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let broken = state_with(MockVisionProvider::new(true), MockImageProvider::new(false));
    let response = app(&broken)
        .oneshot(empty_request(Method::GET, "/ready"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(&broken)
        .oneshot(empty_request(Method::GET, "/ready?deep=true"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn responses_carry_request_id_and_security_headers() {
    let state = test_state();
    let response = app(&state)
        .oneshot(empty_request(Method::GET, "/health"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["models"]["diagnosis"], "mock-vision");
}

#[tokio::test]
async fn metrics_endpoint_exposes_request_counts() {
    init_metrics();
    let state = test_state();

    app(&state)
        .oneshot(empty_request(Method::GET, "/health"))
        .await
        .unwrap();

    let response = app(&state)
        .oneshot(empty_request(Method::GET, "/metrics"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(text.contains("http_requests_total"));
    assert!(text.contains("path=\"/health\""));
}
