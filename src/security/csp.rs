use axum::http::{header, HeaderValue};
use tower_http::set_header::SetResponseHeaderLayer;

/// Server-side policy. Matches the `<meta>` policy the pages carry.
pub const POLICY: &str = concat!(
    "base-uri 'self'; ",
    "default-src 'self'; ",
    "style-src 'self'; ",
    "script-src 'self'; ",
    "img-src 'self' data:; ",
    "media-src 'self'; ",
    "font-src 'self'; ",
    "object-src 'self'; ",
    "child-src 'self'; ",
    "connect-src 'self'; ",
    "worker-src 'self'; ",
    "report-uri /csp_report; ",
    "frame-ancestors 'none'; ",
    "form-action 'self'; ",
    "frame-src 'none'",
);

pub fn csp_layer() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(POLICY),
    )
}

pub fn nosniff_layer() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::if_not_present(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    )
}

pub fn frame_options_layer() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::if_not_present(
        header::X_FRAME_OPTIONS,
        HeaderValue::from_static("DENY"),
    )
}
