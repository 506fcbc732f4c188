//! Route table and pipeline tests, driving the router in-process.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::util::ServiceExt;

use admission_gateway::{Config, DebugModeOptions, FilterRules, config};

use crate::mocks::{
    MockRuntime, RecordingDeleter, RecordingHandlers, admission_review, build_server, capture_logs,
};

fn live_runtime() -> MockRuntime {
    MockRuntime {
        live: true,
        ready: true,
        going_down: false,
    }
}

fn default_router(handlers: &std::sync::Arc<RecordingHandlers>) -> Router {
    build_server(
        Config::default(),
        DebugModeOptions::default(),
        live_runtime(),
        handlers.clone(),
        RecordingDeleter::new(),
    )
    .router()
}

async fn post(router: Router, path: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn get(router: Router, path: &str) -> StatusCode {
    let request = Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap();
    router.oneshot(request).await.unwrap().status()
}

#[tokio::test]
async fn test_resource_mutate_failure_policy_dispatch() {
    let handlers = RecordingHandlers::new();
    for (suffix, mode) in [("", "all"), ("/fail", "fail"), ("/ignore", "ignore")] {
        let router = default_router(&handlers);
        let path = format!("{}{suffix}", config::RESOURCE_MUTATING_PATH);
        let (status, body) = post(router, &path, admission_review("default", "Pod", "alice")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"]["allowed"], json!(true));
        assert_eq!(
            handlers.calls().last().unwrap(),
            &format!("resource/mutate:{mode}")
        );
    }
    assert_eq!(handlers.calls().len(), 3);
}

#[tokio::test]
async fn test_resource_validate_failure_policy_dispatch() {
    let handlers = RecordingHandlers::new();
    for (suffix, mode) in [("", "all"), ("/fail", "fail"), ("/ignore", "ignore")] {
        let router = default_router(&handlers);
        let path = format!("{}{suffix}", config::RESOURCE_VALIDATING_PATH);
        let (status, _body) = post(router, &path, admission_review("default", "Pod", "alice")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            handlers.calls().last().unwrap(),
            &format!("resource/validate:{mode}")
        );
    }
}

#[tokio::test]
async fn test_policy_routes_have_no_mode() {
    let handlers = RecordingHandlers::new();
    for (path, expected) in [
        (config::POLICY_MUTATING_PATH, "policy/mutate"),
        (config::POLICY_VALIDATING_PATH, "policy/validate"),
    ] {
        let router = default_router(&handlers);
        let (status, _body) = post(router, path, admission_review("default", "Pod", "alice")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(handlers.calls().last().unwrap(), expected);
    }
}

#[tokio::test]
async fn test_verify_route_stamps_annotation_patch() {
    let handlers = RecordingHandlers::new();
    let router = default_router(&handlers);
    let (status, body) = post(
        router,
        config::VERIFY_MUTATING_PATH,
        admission_review("gateway-system", "Deployment", "alice"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["allowed"], json!(true));
    assert_eq!(body["response"]["patchType"], json!("JSONPatch"));
    // The verify endpoint never reaches the decision handlers.
    assert!(handlers.calls().is_empty());
}

#[tokio::test]
async fn test_excluded_request_is_allowed_without_handler() {
    let handlers = RecordingHandlers::new();
    let router = build_server(
        Config {
            filters: FilterRules {
                namespaces: vec!["kube-system".to_string()],
                ..Default::default()
            },
            ..Default::default()
        },
        DebugModeOptions::default(),
        live_runtime(),
        handlers.clone(),
        RecordingDeleter::new(),
    )
    .router();

    let (status, body) = post(
        router,
        config::RESOURCE_MUTATING_PATH,
        admission_review("kube-system", "Pod", "alice"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["allowed"], json!(true));
    assert!(body["response"]["patch"].is_null());
    assert!(handlers.calls().is_empty());
}

fn managed_update_review() -> Value {
    json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "managed-uid",
            "kind": { "group": "apps", "version": "v1", "kind": "Deployment" },
            "resource": { "group": "apps", "version": "v1", "resource": "deployments" },
            "namespace": "gateway-system",
            "name": "gateway-controller",
            "operation": "UPDATE",
            "userInfo": { "username": "alice" },
            "object": {
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "metadata": {
                    "name": "gateway-controller",
                    "namespace": "gateway-system",
                    "labels": { config::MANAGED_BY_LABEL: config::MANAGED_BY_VALUE },
                },
            },
        },
    })
}

#[tokio::test]
async fn test_protect_toggle_controls_managed_resource_denial() {
    // Toggle on: the mutation is denied before reaching the handler.
    let handlers = RecordingHandlers::new();
    let router = build_server(
        Config {
            protect_managed_resources: true,
            ..Default::default()
        },
        DebugModeOptions::default(),
        live_runtime(),
        handlers.clone(),
        RecordingDeleter::new(),
    )
    .router();
    let (status, body) = post(router, config::RESOURCE_MUTATING_PATH, managed_update_review()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["allowed"], json!(false));
    assert!(handlers.calls().is_empty());

    // Toggle off: the same request reaches the handler and is allowed.
    let handlers = RecordingHandlers::new();
    let router = default_router(&handlers);
    let (status, body) = post(router, config::RESOURCE_MUTATING_PATH, managed_update_review()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["allowed"], json!(true));
    assert_eq!(handlers.calls(), vec!["resource/mutate:all".to_string()]);
}

#[tokio::test]
async fn test_probes_reflect_runtime_predicates() {
    let handlers = RecordingHandlers::new();
    let router = build_server(
        Config::default(),
        DebugModeOptions::default(),
        MockRuntime {
            live: false,
            ready: true,
            going_down: false,
        },
        handlers.clone(),
        RecordingDeleter::new(),
    )
    .router();

    assert_eq!(
        get(router.clone(), config::LIVENESS_PATH).await,
        StatusCode::SERVICE_UNAVAILABLE
    );
    assert_eq!(get(router, config::READINESS_PATH).await, StatusCode::OK);
    // Probes never touch the admission pipeline.
    assert!(handlers.calls().is_empty());
}

#[tokio::test]
async fn test_unmatched_method_and_path() {
    let handlers = RecordingHandlers::new();
    let router = default_router(&handlers);
    assert_eq!(
        get(router.clone(), config::RESOURCE_MUTATING_PATH).await,
        StatusCode::METHOD_NOT_ALLOWED
    );
    let (status, _body) = post(
        router,
        "/nonexistent",
        admission_review("default", "Pod", "alice"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dump_logging_gated_by_toggle() {
    let (writer, _guard) = capture_logs();

    // Dump enabled: raw payloads are logged for webhook routes but never
    // for the verify endpoint, which always runs with debug disabled.
    let handlers = RecordingHandlers::new();
    let router = build_server(
        Config::default(),
        DebugModeOptions { dump_payload: true },
        live_runtime(),
        handlers.clone(),
        RecordingDeleter::new(),
    )
    .router();
    post(
        router.clone(),
        config::RESOURCE_MUTATING_PATH,
        admission_review("default", "Pod", "alice"),
    )
    .await;
    assert!(writer.contents().contains("admission request dump"));
    assert!(writer.contents().contains("admission response dump"));

    let before_verify = writer.contents().matches("admission request dump").count();
    post(
        router,
        config::VERIFY_MUTATING_PATH,
        admission_review("default", "Pod", "alice"),
    )
    .await;
    assert_eq!(
        writer.contents().matches("admission request dump").count(),
        before_verify
    );

    // Dump disabled: no payload logging at all.
    let (writer, _guard) = capture_logs();
    let router = default_router(&handlers);
    post(
        router,
        config::RESOURCE_MUTATING_PATH,
        admission_review("default", "Pod", "alice"),
    )
    .await;
    assert!(!writer.contents().contains("admission request dump"));
}

#[tokio::test]
async fn test_review_without_request_is_rejected() {
    let handlers = RecordingHandlers::new();
    let router = default_router(&handlers);
    let (status, body) = post(
        router,
        config::RESOURCE_MUTATING_PATH,
        json!({ "apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["response"]["allowed"], json!(false));
    assert!(handlers.calls().is_empty());
}
