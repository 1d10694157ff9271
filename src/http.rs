use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    middleware::from_fn_with_state,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Router,
};

use crate::config::AppConfig;
use crate::error::PredictError;
use crate::model::ModelStore;
use crate::pages;
use crate::predictor::PredictionService;
use crate::security::{
    csp_layer, csrf_protect, frame_options_layer, nosniff_layer, rate_limit, Csrf, RateLimiter,
};

pub const CSP_REPORT_PATH: &str = "/csp_report";

const INDEX_ALIASES: [&str; 5] = [
    "/index",
    "/index.htm",
    "/index.asp",
    "/index.php",
    "/index.html",
];

// ---------- Server state ----------

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    pub csrf: Arc<Csrf>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn from_config(cfg: &AppConfig, models: Arc<ModelStore>) -> anyhow::Result<Self> {
        let service = PredictionService::new(models).with_feature_logging(cfg.log_predictions);
        let csrf = Csrf::new(&cfg.secret_key, cfg.csrf_time_limit)?.exempt(CSP_REPORT_PATH);
        Ok(Self {
            service: Arc::new(service),
            csrf: Arc::new(csrf),
            limiter: Arc::new(RateLimiter::new(cfg.rate_limits.clone())),
        })
    }
}

pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/", get(index).post(submit))
        .route("/privacy.html", get(privacy))
        .route(CSP_REPORT_PATH, post(csp_report));
    for alias in INDEX_ALIASES {
        app = app.route(alias, get(to_root));
    }

    app.layer(from_fn_with_state(state.csrf.clone(), csrf_protect))
        .layer(from_fn_with_state(state.limiter.clone(), rate_limit))
        .layer(nosniff_layer())
        .layer(frame_options_layer())
        .layer(csp_layer())
        .with_state(state)
}

// ---------- Handlers ----------

fn render(state: &AppState, result: Option<i64>, flashes: &[&str]) -> Response {
    let token = state.csrf.issue();
    (
        [(header::SET_COOKIE, state.csrf.set_cookie(&token))],
        Html(pages::index(result, flashes, &token)),
    )
        .into_response()
}

fn found(location: &'static str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

async fn index(State(state): State<AppState>) -> Response {
    render(&state, None, &[])
}

async fn submit(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    match state.service.predict_form(&form) {
        Ok(value) => render(&state, Some(value), &[]),
        Err(PredictError::Rejected) => {
            tracing::info!("Invalid format; redirecting to form");
            found("/")
        }
        Err(e) => {
            match &e {
                PredictError::InvalidNumber { field } => {
                    tracing::info!("rejected non-numeric {}", field)
                }
                PredictError::DivisionByZero => tracing::info!("rejected input: {}", e),
                PredictError::ModelUnavailable(path) => {
                    tracing::error!("model not available at {}", path.display())
                }
                _ => tracing::error!("Prediction error: {}", e),
            }
            render(&state, None, &[e.user_message()])
        }
    }
}

async fn privacy() -> Html<String> {
    Html(pages::privacy())
}

async fn to_root() -> Response {
    found("/")
}

async fn csp_report(body: Bytes) -> &'static str {
    tracing::error!(target: "csp_report", "{}", String::from_utf8_lossy(&body));
    "done"
}
