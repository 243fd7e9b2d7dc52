//! Library-level integration tests for coloring-pages.
//!
//! The OpenAI provider path is exercised against a local axum server bound
//! to `127.0.0.1:0`, so no network access or API key is needed.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use coloring_pages::pipeline::encode::encode_png;
use coloring_pages::{
    ColoringError, GenerationRequest, Generator, GeneratorConfig, ImageSource, ManualClock,
    RequestThrottle, ThrottleScope,
};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Route library logs to the test harness; `RUST_LOG=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Small canvas and low DPI keep debug-build raster work fast.
fn small_config(output_dir: &Path) -> coloring_pages::GeneratorConfigBuilder {
    GeneratorConfig::builder()
        .canvas_size(160, 220)
        .pdf_dpi(12)
        .output_dir(output_dir)
}

#[derive(Clone, Copy)]
enum MockMode {
    Ok,
    Fail,
    Slow(Duration),
}

#[derive(Clone)]
struct MockState {
    mode: MockMode,
    requests: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

async fn mock_generations(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    state.requests.lock().unwrap().push((auth, body));

    match state.mode {
        MockMode::Ok => {
            let img = DynamicImage::ImageRgb8(RgbImage::from_fn(96, 96, |x, y| {
                if (x / 12 + y / 12) % 2 == 0 {
                    Rgb([30, 30, 30])
                } else {
                    Rgb([230, 230, 230])
                }
            }));
            let b64 = STANDARD.encode(encode_png(&img).unwrap());
            (StatusCode::OK, Json(json!({ "data": [{ "b64_json": b64 }] })))
        }
        MockMode::Fail => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": { "message": "model overloaded" } })),
        ),
        MockMode::Slow(delay) => {
            tokio::time::sleep(delay).await;
            (StatusCode::OK, Json(json!({ "data": [] })))
        }
    }
}

/// Spawn a fake `/v1/images/generations` endpoint and return its base URL.
async fn spawn_mock_provider(mode: MockMode) -> (String, MockState) {
    let state = MockState {
        mode,
        requests: Arc::default(),
    };

    let app = Router::new()
        .route("/v1/images/generations", post(mock_generations))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/v1"), state)
}

fn assert_black_and_white(png: &[u8]) {
    let img = image::load_from_memory(png).unwrap();
    for (_, _, px) in img.pixels() {
        let [r, g, b, _] = px.0;
        assert!(r == g && g == b, "pixel must be gray: {:?}", px);
        assert!(r == 0 || r == 255, "pixel must be pure black or white: {r}");
    }
}

// ── Placeholder path ─────────────────────────────────────────────────────────

#[tokio::test]
async fn placeholder_page_is_stored_and_returned() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let generator = Generator::new(small_config(dir.path()).build().unwrap()).without_provider();

    let response = generator
        .generate_and_store(&GenerationRequest::new("animals", "3-4"), None)
        .await
        .unwrap();

    assert_eq!(response.status, "ok");
    assert_eq!(response.filename, "coloring_animals.pdf");
    assert_eq!(response.pdf_url.as_deref(), Some("/files/coloring_animals.pdf"));
    assert!(response.prompt.contains("Subject: animals"));
    assert!(response.prompt.contains("Age group: 3-4"));

    let on_disk = std::fs::read(dir.path().join("coloring_animals.pdf")).unwrap();
    let embedded = STANDARD.decode(response.pdf_base64.unwrap()).unwrap();
    assert_eq!(on_disk, embedded);

    let doc = lopdf::Document::load_mem(&on_disk).unwrap();
    assert_eq!(doc.get_pages().len(), 1);

    let preview = STANDARD.decode(response.preview_base64).unwrap();
    let preview_img = image::load_from_memory(&preview).unwrap();
    assert_eq!(preview_img.dimensions(), (160, 220));
    assert_black_and_white(&preview);
}

#[tokio::test]
async fn pdf_base64_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path()).include_pdf_base64(false).build().unwrap();
    let generator = Generator::new(config).without_provider();
    let response = generator
        .generate_and_store(&GenerationRequest::new("alphabet", "7-8"), None)
        .await
        .unwrap();
    assert!(response.pdf_base64.is_none());
    assert!(dir.path().join("coloring_alphabet.pdf").is_file());
}

#[tokio::test]
async fn rejected_request_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let generator = Generator::new(small_config(&out).build().unwrap()).without_provider();

    let err = generator
        .generate_and_store(&GenerationRequest::new("space", "5-6"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ColoringError::UnsupportedTheme { .. }));
    assert_eq!(err.to_string(), "Unsupported theme");
    assert!(!out.exists());
}

// ── Provider path ────────────────────────────────────────────────────────────

#[tokio::test]
async fn provider_image_is_used_when_available() {
    init_tracing();
    let (base_url, mock) = spawn_mock_provider(MockMode::Ok).await;
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path())
        .openai_api_key("sk-test")
        .openai_base_url(base_url)
        .build()
        .unwrap();
    let generator = Generator::new(config);

    let artifact = generator
        .generate(&GenerationRequest::new("vehicles", "5-6"), None)
        .await
        .unwrap();
    assert_eq!(artifact.source, ImageSource::Provider);
    let preview = image::load_from_memory(&artifact.preview_bytes).unwrap();
    assert_eq!(preview.dimensions(), (96, 96));
    assert_black_and_white(&artifact.preview_bytes);

    let requests = mock.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let (auth, body) = &requests[0];
    assert_eq!(auth.as_deref(), Some("Bearer sk-test"));
    assert_eq!(body["model"], "dall-e-3");
    assert_eq!(body["size"], "1024x1024");
    assert_eq!(body["response_format"], "b64_json");
    assert_eq!(body["prompt"], artifact.prompt.as_str());
}

#[tokio::test]
async fn provider_failure_falls_back_to_placeholder() {
    init_tracing();
    let (base_url, mock) = spawn_mock_provider(MockMode::Fail).await;
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path())
        .openai_api_key("sk-test")
        .openai_base_url(base_url)
        .build()
        .unwrap();
    let generator = Generator::new(config);

    let artifact = generator
        .generate(&GenerationRequest::new("fantasy", "7-8"), None)
        .await
        .unwrap();
    assert_eq!(artifact.source, ImageSource::Placeholder);
    assert_eq!(mock.requests.lock().unwrap().len(), 1);
    assert!(artifact.pdf_bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn provider_retries_before_falling_back() {
    init_tracing();
    let (base_url, mock) = spawn_mock_provider(MockMode::Fail).await;
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path())
        .openai_api_key("sk-test")
        .openai_base_url(base_url)
        .provider_max_retries(2)
        .provider_retry_backoff_ms(10)
        .build()
        .unwrap();
    let generator = Generator::new(config);

    let artifact = generator
        .generate(&GenerationRequest::new("animals", "5-6"), None)
        .await
        .unwrap();
    assert_eq!(artifact.source, ImageSource::Placeholder);
    assert_eq!(mock.requests.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn slow_provider_is_an_acquisition_timeout() {
    init_tracing();
    let (base_url, _mock) = spawn_mock_provider(MockMode::Slow(Duration::from_secs(5))).await;
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let config = small_config(&out)
        .openai_api_key("sk-test")
        .openai_base_url(base_url)
        .acquisition_timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let generator = Generator::new(config);

    let err = generator
        .generate_and_store(&GenerationRequest::new("animals", "3-4"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ColoringError::AcquisitionTimeout { .. }), "{err:?}");
    assert_eq!(err.status_code(), 504);
    assert!(!out.exists());
}

// ── Throttling ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn throttle_window_slides_with_clock() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new());
    let throttle = Arc::new(RequestThrottle::with_clock(
        3,
        Duration::from_secs(60),
        ThrottleScope::Global,
        clock.clone(),
    ));
    let generator = Generator::new(small_config(dir.path()).build().unwrap())
        .without_provider()
        .with_throttle(throttle);
    let request = GenerationRequest::new("animals", "3-4");

    for _ in 0..3 {
        generator.generate(&request, None).await.unwrap();
    }
    let err = generator.generate(&request, None).await.unwrap_err();
    assert!(matches!(err, ColoringError::Throttled));

    clock.advance(Duration::from_secs(60));
    assert!(matches!(
        generator.generate(&request, None).await,
        Err(ColoringError::Throttled)
    ));

    clock.advance(Duration::from_millis(1));
    generator.generate(&request, None).await.unwrap();
}

#[tokio::test]
async fn per_client_scope_isolates_callers() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path())
        .throttle(1, 60)
        .throttle_scope(ThrottleScope::PerClient)
        .build()
        .unwrap();
    let generator = Generator::new(config).without_provider();
    let request = GenerationRequest::new("vehicles", "3-4");

    generator.generate(&request, Some("10.0.0.1")).await.unwrap();
    assert!(matches!(
        generator.generate(&request, Some("10.0.0.1")).await,
        Err(ColoringError::Throttled)
    ));
    generator.generate(&request, Some("10.0.0.2")).await.unwrap();
}
