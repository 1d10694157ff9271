pub mod csp;
pub mod csrf;
pub mod rate_limit;

pub use csp::{csp_layer, frame_options_layer, nosniff_layer};
pub use csrf::{csrf_protect, Csrf, CsrfError};
pub use rate_limit::{parse_limits, rate_limit, RateLimit, RateLimiter};
