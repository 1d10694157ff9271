//! HTTP-level tests: router, security layers and prediction pipeline together.
//!
//! Run with: cargo test --test integration_tests

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tower::ServiceExt;

use weather_predictor::error::ModelError;
use weather_predictor::http::{router, AppState};
use weather_predictor::model::{ModelSource, ModelStore, Regressor};
use weather_predictor::predictor::PredictionService;
use weather_predictor::security::{parse_limits, Csrf, RateLimiter};

const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/linear_model.json");
const REFERENCE_FORM: &str =
    "Temp=20&Humidity=50&DewPointTemp=15&WindSpeed=10&Rainfall=0&Hour=8";

struct Stub {
    calls: Arc<AtomicUsize>,
    output: Option<f64>,
}

impl Regressor for Stub {
    fn predict(&self, _batch: &[Vec<f64>]) -> anyhow::Result<Vec<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.into_iter().collect())
    }
}

struct StubSource {
    calls: Arc<AtomicUsize>,
    output: Option<f64>,
    present: bool,
}

impl ModelSource for StubSource {
    fn load(&self) -> Result<Arc<dyn Regressor>, ModelError> {
        if !self.present {
            return Err(ModelError::Unavailable(PathBuf::from("my_saved_model.json")));
        }
        Ok(Arc::new(Stub {
            calls: self.calls.clone(),
            output: self.output,
        }))
    }

    fn describe(&self) -> String {
        "stub".into()
    }
}

struct Harness {
    app: Router,
    csrf: Arc<Csrf>,
    calls: Arc<AtomicUsize>,
}

fn harness_with(store: ModelStore, calls: Arc<AtomicUsize>, limits: &str) -> Harness {
    let csrf = Arc::new(
        Csrf::new(b"integration-secret", Duration::from_secs(3600))
            .unwrap()
            .exempt("/csp_report"),
    );
    let state = AppState {
        service: Arc::new(PredictionService::new(Arc::new(store))),
        csrf: csrf.clone(),
        limiter: Arc::new(RateLimiter::new(parse_limits(limits).unwrap())),
    };
    Harness {
        app: router(state),
        csrf,
        calls,
    }
}

fn harness(output: Option<f64>, present: bool) -> Harness {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = ModelStore::new(StubSource {
        calls: calls.clone(),
        output,
        present,
    });
    harness_with(store, calls, "1000 per second")
}

impl Harness {
    async fn send(&self, req: Request<Body>) -> Response {
        self.app.clone().oneshot(req).await.unwrap()
    }

    async fn post_form(&self, form: &str) -> Response {
        let token = self.csrf.issue();
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::COOKIE, format!("csrf_token={}", token))
            .body(Body::from(format!("{}&csrf_token={}", form, token)))
            .unwrap();
        self.send(req).await
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_text(resp: Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn form_page_issues_token_and_headers() {
    let h = harness(Some(0.5), true);
    let resp = h.send(get("/")).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let csp = resp.headers()[header::CONTENT_SECURITY_POLICY].to_str().unwrap();
    assert!(csp.contains("report-uri /csp_report"));
    assert_eq!(resp.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(resp.headers()[header::X_FRAME_OPTIONS], "DENY");

    let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap().to_owned();
    assert!(cookie.starts_with("csrf_token="));
    assert!(cookie.contains("HttpOnly"));
    let token = cookie
        .trim_start_matches("csrf_token=")
        .split(';')
        .next()
        .unwrap()
        .to_owned();
    assert!(h.csrf.verify(&token).is_ok());

    let html = body_text(resp).await;
    assert!(html.contains(&format!("value=\"{}\"", token)));
    assert!(!html.contains("<output>"));
}

#[tokio::test]
async fn reference_input_renders_prediction() {
    let h = harness(Some(-0.4567), true);
    let resp = h.post_form(REFERENCE_FORM).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key(header::CONTENT_SECURITY_POLICY));
    let html = body_text(resp).await;
    assert!(html.contains("<output>457</output>"), "{html}");
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn file_backed_model_end_to_end() {
    let calls = Arc::new(AtomicUsize::new(0));
    let h = harness_with(ModelStore::from_path(FIXTURE), calls, "1000 per second");
    let html = body_text(h.post_form(REFERENCE_FORM).await).await;
    // 0.25 + 0.01 * Temp(20) = 0.45
    assert!(html.contains("<output>450</output>"), "{html}");
}

#[tokio::test]
async fn overflowing_prediction_is_a_failure_not_a_number() {
    for temp in ["1e308", "-1e308"] {
        let calls = Arc::new(AtomicUsize::new(0));
        let h = harness_with(ModelStore::from_path(FIXTURE), calls, "1000 per second");
        let form = format!(
            "Temp={}&Humidity=50&DewPointTemp=15&WindSpeed=10&Rainfall=0&Hour=8",
            temp
        );
        let html = body_text(h.post_form(&form).await).await;
        assert!(html.contains("Prediction failed, please try again"), "{html}");
        assert!(!html.contains("<output>"), "{html}");
        assert!(!html.contains("9223372036854775807"));
    }
}

#[tokio::test]
async fn non_numeric_input_flashes_and_skips_model() {
    let h = harness(Some(1.0), true);
    let html = body_text(
        h.post_form("Temp=warm&Humidity=50&DewPointTemp=15&WindSpeed=10&Rainfall=0&Hour=8")
            .await,
    )
    .await;
    assert!(html.contains("Please enter valid numbers"));
    assert!(!html.contains("<output>"));
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn midnight_is_rejected_as_domain_error() {
    let h = harness(Some(1.0), true);
    let html = body_text(
        h.post_form("Temp=20&Humidity=50&DewPointTemp=15&WindSpeed=10&Rainfall=0&Hour=0")
            .await,
    )
    .await;
    assert!(html.contains("must both be non-zero"));
    assert!(!html.contains("<output>"));
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_model_reports_unavailable() {
    let h = harness(Some(1.0), false);
    let html = body_text(h.post_form(REFERENCE_FORM).await).await;
    assert!(html.contains("Model not available"));
    assert!(!html.contains("<output>"));
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_model_output_hides_detail() {
    let h = harness(None, true);
    let html = body_text(h.post_form(REFERENCE_FORM).await).await;
    assert!(html.contains("Prediction failed, please try again"));
    assert!(!html.contains("no output"));
}

#[tokio::test]
async fn post_without_token_is_refused() {
    let h = harness(Some(1.0), true);
    let req = Request::builder()
        .method("POST")
        .uri("/")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(REFERENCE_FORM))
        .unwrap();
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(resp.headers().contains_key(header::CONTENT_SECURITY_POLICY));
    assert_eq!(body_text(resp).await, "The CSRF token is missing.");
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn post_with_foreign_token_is_refused() {
    let h = harness(Some(1.0), true);
    let forged = Csrf::new(b"attacker", Duration::from_secs(3600))
        .unwrap()
        .issue();
    let req = Request::builder()
        .method("POST")
        .uri("/")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::COOKIE, format!("csrf_token={}", forged))
        .body(Body::from(format!("{}&csrf_token={}", REFERENCE_FORM, forged)))
        .unwrap();
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(resp).await, "The CSRF token is invalid.");
}

#[tokio::test]
async fn header_token_is_accepted() {
    let h = harness(Some(0.002), true);
    let token = h.csrf.issue();
    let req = Request::builder()
        .method("POST")
        .uri("/")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::COOKIE, format!("csrf_token={}", token))
        .header("X-CSRFToken", token)
        .body(Body::from(REFERENCE_FORM))
        .unwrap();
    let html = body_text(h.send(req).await).await;
    assert!(html.contains("<output>2</output>"), "{html}");
}

#[tokio::test]
async fn csp_report_is_exempt_and_acknowledged() {
    let h = harness(Some(1.0), true);
    let req = Request::builder()
        .method("POST")
        .uri("/csp_report")
        .header(header::CONTENT_TYPE, "application/csp-report")
        .body(Body::from(r#"{"csp-report":{"violated-directive":"script-src"}}"#))
        .unwrap();
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "done");
}

#[tokio::test]
async fn index_aliases_redirect_to_root() {
    let h = harness(Some(1.0), true);
    for uri in ["/index", "/index.htm", "/index.asp", "/index.php", "/index.html"] {
        let resp = h.send(get(uri)).await;
        assert_eq!(resp.status(), StatusCode::FOUND, "{uri}");
        assert_eq!(resp.headers()[header::LOCATION], "/");
    }
}

#[tokio::test]
async fn privacy_page_renders() {
    let h = harness(Some(1.0), true);
    let resp = h.send(get("/privacy.html")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("Privacy policy"));
}

#[tokio::test]
async fn second_request_within_a_second_is_limited() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = ModelStore::new(StubSource {
        calls: calls.clone(),
        output: Some(1.0),
        present: true,
    });
    let h = harness_with(store, calls, "200 per day;100 per hour;1 per second");

    assert_eq!(h.send(get("/")).await.status(), StatusCode::OK);
    let resp = h.send(get("/")).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(resp.headers()[header::RETRY_AFTER], "1");
    assert!(resp.headers().contains_key(header::CONTENT_SECURITY_POLICY));
    assert_eq!(body_text(resp).await, "Too Many Requests");
}
