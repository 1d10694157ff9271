//! Weather-sensor prediction front end.
//!
//! Six form inputs are validated, turned into seven engineered features and
//! fed to a pre-trained regression model loaded from disk. The web surface
//! carries CSRF protection, a Content-Security-Policy header, per-client rate
//! limiting and a CSP-violation report endpoint.

pub mod config;
pub mod error;
pub mod features;
pub mod http;
pub mod model;
pub mod pages;
pub mod predictor;
pub mod security;
pub mod types;

