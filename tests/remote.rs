//! Remote compression against a mock service bound to `127.0.0.1:0`.

#![cfg(feature = "server")]

mod common;

use axum::{
    body::{to_bytes, Body},
    extract::{Form, Multipart, Path, State},
    http::{header, HeaderMap, Request, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use common::sample_pdf;
use pdfpress::{
    compressor_for, server, Backend, Delivery, Outcome, Pipeline, PipelineConfig, PressError,
    RemoteCompressor, RemoteConfig, RemoteStep, Submission,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tower::ServiceExt;

const TOKEN: &str = "tok-123";
const TASK: &str = "task-9";
const COMPRESSED: &[u8] = b"%PDF-1.4\n% compressed by mock\n";

// ── Mock service ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct Mock {
    addr: Mutex<Option<SocketAddr>>,
    steps: Mutex<Vec<String>>,
    levels: Mutex<Vec<String>>,
    uploaded: Mutex<Vec<Bytes>>,
    /// Reply to `upload` with `{"files": [...]}` instead of a flat object.
    nested_upload: bool,
    fail_process: bool,
}

impl Mock {
    fn record(&self, step: &str, headers: &HeaderMap) -> bool {
        self.steps.lock().unwrap().push(step.to_string());
        step == "auth"
            || headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                == Some(format!("Bearer {TOKEN}").as_str())
    }
}

#[derive(Deserialize)]
struct AuthForm {
    public_key: String,
}

async fn auth(
    State(mock): State<Arc<Mock>>,
    headers: HeaderMap,
    Form(form): Form<AuthForm>,
) -> impl IntoResponse {
    mock.record("auth", &headers);
    if form.public_key != "project_public_key" {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "bad key" })));
    }
    (StatusCode::OK, Json(json!({ "token": TOKEN })))
}

async fn start(State(mock): State<Arc<Mock>>, headers: HeaderMap) -> impl IntoResponse {
    if !mock.record("start", &headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    let server = mock.addr.lock().unwrap().map(|a| a.to_string()).unwrap_or_default();
    (StatusCode::OK, Json(json!({ "server": server, "task": TASK })))
}

async fn upload(
    State(mock): State<Arc<Mock>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> impl IntoResponse {
    if !mock.record("upload", &headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    let mut task = None;
    while let Some(field) = multipart.next_field().await.unwrap() {
        match field.name() {
            Some("task") => task = Some(field.text().await.unwrap()),
            Some("file") => {
                let bytes = field.bytes().await.unwrap();
                mock.uploaded.lock().unwrap().push(bytes);
            }
            _ => {}
        }
    }
    if task.as_deref() != Some(TASK) {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "no task" })));
    }
    let body = if mock.nested_upload {
        json!({ "files": [{ "server_filename": "srv-1.pdf" }] })
    } else {
        json!({ "server_filename": "srv-1.pdf" })
    };
    (StatusCode::OK, Json(body))
}

async fn process(
    State(mock): State<Arc<Mock>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if !mock.record("process", &headers) {
        return (StatusCode::UNAUTHORIZED, "missing token".to_string());
    }
    if mock.fail_process {
        return (StatusCode::BAD_REQUEST, "compression_level is invalid".to_string());
    }
    assert_eq!(body["task"], TASK);
    assert_eq!(body["tool"], "compress");
    assert_eq!(body["files"][0]["server_filename"], "srv-1.pdf");
    let level = body["compression_level"].as_str().unwrap_or_default().to_string();
    mock.levels.lock().unwrap().push(level);
    (StatusCode::OK, "{}".to_string())
}

async fn download(
    State(mock): State<Arc<Mock>>,
    headers: HeaderMap,
    Path(task): Path<String>,
) -> impl IntoResponse {
    if !mock.record("download", &headers) || task != TASK {
        return (StatusCode::NOT_FOUND, Bytes::new());
    }
    (StatusCode::OK, Bytes::from_static(COMPRESSED))
}

async fn spawn_mock(mock: Mock) -> (Arc<Mock>, RemoteConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    *mock.addr.lock().unwrap() = Some(addr);
    let mock = Arc::new(mock);

    let app = Router::new()
        .route("/v1/auth", post(auth))
        .route("/v1/start/compress", get(start))
        .route("/v1/upload", post(upload))
        .route("/v1/process", post(process))
        .route("/v1/download/{task}", get(download))
        .with_state(Arc::clone(&mock));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = RemoteConfig::new("project_public_key")
        .with_api_base(format!("http://{addr}/v1"), "http");
    (mock, config)
}

// ── Client ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn runs_every_step_with_bearer_token() {
    let (mock, config) = spawn_mock(Mock::default()).await;
    let client = RemoteCompressor::new(config);
    let pdf = Bytes::from(sample_pdf(1));

    let out = client.compress(pdf.clone(), "tugas.pdf").await.unwrap();

    assert_eq!(out.as_ref(), COMPRESSED);
    assert_eq!(
        *mock.steps.lock().unwrap(),
        ["auth", "start", "upload", "process", "download"]
    );
    assert_eq!(*mock.levels.lock().unwrap(), ["recommended"]);
    assert_eq!(mock.uploaded.lock().unwrap()[0], pdf);
}

#[tokio::test]
async fn accepts_nested_upload_response() {
    let (_mock, config) = spawn_mock(Mock {
        nested_upload: true,
        ..Mock::default()
    })
    .await;
    let out = RemoteCompressor::new(config)
        .compress(Bytes::from(sample_pdf(1)), "a.pdf")
        .await
        .unwrap();
    assert_eq!(out.as_ref(), COMPRESSED);
}

#[tokio::test]
async fn failing_step_is_named_with_remote_body() {
    common::init_tracing();
    let (mock, config) = spawn_mock(Mock {
        fail_process: true,
        ..Mock::default()
    })
    .await;
    let err = RemoteCompressor::new(config)
        .compress(Bytes::from(sample_pdf(1)), "a.pdf")
        .await
        .unwrap_err();

    match err {
        PressError::RemoteServiceError { step, detail } => {
            assert_eq!(step, RemoteStep::Process);
            assert!(detail.contains("compression_level is invalid"), "{detail}");
        }
        other => panic!("expected RemoteServiceError, got {other:?}"),
    }
    assert!(!mock.steps.lock().unwrap().contains(&"download".to_string()));
}

#[tokio::test]
async fn bad_key_fails_at_auth() {
    let (_mock, config) = spawn_mock(Mock::default()).await;
    let mut config = config;
    config.public_key = "wrong".into();
    let err = RemoteCompressor::new(config)
        .compress(Bytes::from(sample_pdf(1)), "a.pdf")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PressError::RemoteServiceError { step: RemoteStep::Auth, .. }
    ));
}

#[tokio::test]
async fn empty_body_never_reaches_the_service() {
    let (mock, config) = spawn_mock(Mock::default()).await;
    let err = RemoteCompressor::new(config)
        .compress(Bytes::new(), "a.pdf")
        .await
        .unwrap_err();
    assert!(matches!(err, PressError::EmptyBody));
    assert!(mock.steps.lock().unwrap().is_empty());
}

// ── Pipeline backend ─────────────────────────────────────────────────────────

#[tokio::test]
async fn remote_backend_maps_preset_to_level() {
    let (mock, config) = spawn_mock(Mock::default()).await;
    let root = tempfile::tempdir().unwrap();
    let pipeline_config = PipelineConfig::builder()
        .workspace_root(root.path().join("jobs"))
        .backend(Backend::Remote)
        .delivery(Delivery::Download)
        .build()
        .unwrap();
    let remote = Arc::new(RemoteCompressor::new(config));
    let compressor = compressor_for(&pipeline_config, Some(remote)).unwrap();
    let pipeline = Pipeline::new(pipeline_config, compressor);

    let out = pipeline
        .submit(Submission::new(sample_pdf(1)).with_preset(pdfpress::Preset::Screen))
        .await
        .unwrap();

    let Outcome::Download { bytes, .. } = out else {
        panic!("expected Download");
    };
    assert_eq!(bytes.as_ref(), COMPRESSED);
    assert_eq!(*mock.levels.lock().unwrap(), ["extreme"]);
}

// ── Proxy route ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn proxy_route_returns_compressed_pdf_with_cors() {
    let (_mock, config) = spawn_mock(Mock::default()).await;
    let root = tempfile::tempdir().unwrap();
    let pipeline_config = PipelineConfig::builder()
        .workspace_root(root.path().join("jobs"))
        .backend(Backend::Passthrough)
        .build()
        .unwrap();
    let compressor = compressor_for(&pipeline_config, None).unwrap();
    let state = server::AppState::new(Pipeline::new(pipeline_config, compressor))
        .with_remote(Arc::new(RemoteCompressor::new(config)));
    let app = server::router(state);

    let req = Request::post("/proxy/compress")
        .header(header::ORIGIN, "https://example.org")
        .header(header::CONTENT_TYPE, "application/pdf")
        .body(Body::from(sample_pdf(1)))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body.as_ref(), COMPRESSED);

    let preflight = Request::builder()
        .method("OPTIONS")
        .uri("/proxy/compress")
        .header(header::ORIGIN, "https://example.org")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(preflight).await.unwrap();
    assert!(resp.status().is_success());
    assert_eq!(resp.headers()[header::ACCESS_CONTROL_MAX_AGE], "86400");

    let req = Request::post("/proxy/compress")
        .body(Body::from(&b""[..]))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
