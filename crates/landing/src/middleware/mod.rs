//! HTTP middleware stack for the landing service.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, transaction)
//! 2. `TraceLayer` (request span with `request_id` field)
//! 3. Request ID (fills the span field, echoes `x-request-id`)
//! 4. Session layer (tower-sessions with in-memory store)
//! 5. Rate limiting on `/api/*` (governor)

pub mod funnel_cookie;
pub mod rate_limit;
pub mod request_id;
pub mod session;

pub use funnel_cookie::{CookieStageStore, FUNNEL_COOKIE};
pub use rate_limit::{RateLimiterLayer, lead_rate_limiter};
pub use request_id::request_id_middleware;
pub use session::create_session_layer;
