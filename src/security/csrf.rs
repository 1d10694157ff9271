use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use anyhow::anyhow;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const CSRF_FIELD: &str = "csrf_token";
pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrftoken";

const MAX_FORM_BYTES: usize = 64 * 1024;
// Tolerated clock skew for tokens stamped slightly in the future.
const SKEW_SECS: u64 = 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CsrfError {
    #[error("The CSRF token is missing.")]
    Missing,
    #[error("The CSRF session token is missing.")]
    MissingCookie,
    #[error("The CSRF tokens do not match.")]
    Mismatch,
    #[error("The CSRF token is invalid.")]
    Invalid,
    #[error("The CSRF token has expired.")]
    Expired,
}

/// Signed double-submit tokens: `<issued>.<nonce>.<hmac>`.
pub struct Csrf {
    // Keyed once; cloned per token.
    mac: HmacSha256,
    time_limit: Duration,
    exempt: Vec<String>,
}

impl Csrf {
    pub fn new(key: &[u8], time_limit: Duration) -> anyhow::Result<Self> {
        let mac =
            HmacSha256::new_from_slice(key).map_err(|e| anyhow!("unusable CSRF key: {}", e))?;
        Ok(Self {
            mac,
            time_limit,
            exempt: Vec::new(),
        })
    }

    pub fn exempt(mut self, path: impl Into<String>) -> Self {
        self.exempt.push(path.into());
        self
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt.iter().any(|p| p == path)
    }

    pub fn issue(&self) -> String {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        self.issue_at(unix_now(), &nonce)
    }

    fn issue_at(&self, issued: u64, nonce: &[u8]) -> String {
        let nonce: String = nonce.iter().map(|b| format!("{:02x}", b)).collect();
        let payload = format!("{}.{}", issued, nonce);
        let sig = URL_SAFE_NO_PAD.encode(self.sign(payload.as_bytes()));
        format!("{}.{}", payload, sig)
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    pub fn verify(&self, token: &str) -> Result<(), CsrfError> {
        self.verify_at(token, unix_now())
    }

    fn verify_at(&self, token: &str, now: u64) -> Result<(), CsrfError> {
        let (payload, sig) = token.rsplit_once('.').ok_or(CsrfError::Invalid)?;
        let (issued, _nonce) = payload.split_once('.').ok_or(CsrfError::Invalid)?;
        let issued: u64 = issued.parse().map_err(|_| CsrfError::Invalid)?;
        let sig = URL_SAFE_NO_PAD.decode(sig).map_err(|_| CsrfError::Invalid)?;
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&sig).map_err(|_| CsrfError::Invalid)?;
        if issued > now + SKEW_SECS {
            return Err(CsrfError::Invalid);
        }
        if now.saturating_sub(issued) > self.time_limit.as_secs() {
            return Err(CsrfError::Expired);
        }
        Ok(())
    }

    /// Submitted token must be present, equal the cookie, and verify.
    pub fn check(&self, submitted: Option<&str>, cookie: Option<&str>) -> Result<(), CsrfError> {
        let submitted = submitted.filter(|s| !s.is_empty()).ok_or(CsrfError::Missing)?;
        let cookie = cookie.filter(|s| !s.is_empty()).ok_or(CsrfError::MissingCookie)?;
        if !bool::from(submitted.as_bytes().ct_eq(cookie.as_bytes())) {
            return Err(CsrfError::Mismatch);
        }
        self.verify(submitted)
    }

    pub fn set_cookie(&self, token: &str) -> String {
        format!(
            "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
            CSRF_COOKIE,
            token,
            self.time_limit.as_secs()
        )
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            (k == name).then_some(v)
        })
}

// Valid tokens never need percent-decoding, so a raw match is enough.
fn form_field<'a>(body: &'a [u8], name: &str) -> Option<&'a str> {
    std::str::from_utf8(body).ok()?.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == name).then_some(v)
    })
}

fn is_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

pub async fn csrf_protect(State(csrf): State<Arc<Csrf>>, req: Request, next: Next) -> Response {
    if is_safe(req.method()) || csrf.is_exempt(req.uri().path()) {
        return next.run(req).await;
    }

    let cookie = cookie_value(req.headers(), CSRF_COOKIE).map(str::to_owned);
    let header_token = req
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let (parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_FORM_BYTES).await {
        Ok(b) => b,
        Err(_) => return (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large").into_response(),
    };
    let submitted = header_token.or_else(|| form_field(&bytes, CSRF_FIELD).map(str::to_owned));

    if let Err(e) = csrf.check(submitted.as_deref(), cookie.as_deref()) {
        tracing::warn!("CSRF check failed on {} {}: {}", parts.method, parts.uri.path(), e);
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
