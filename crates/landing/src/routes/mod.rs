//! HTTP route handlers for the landing service.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness (mailing list configured)
//!
//! # Leads
//! POST /api/newsletter         - Newsletter signup (JSON)
//! POST /api/golden-ticket      - Golden ticket sweepstakes entry (JSON)
//!
//! # Funnel (cookie `funnel_step`)
//! GET  /api/funnel             - Current stage
//! POST /api/funnel             - Advance to a named stage
//! POST /api/funnel/interest    - Visitor showed interest in an item
//! POST /api/funnel/conversion  - Visitor converted
//!
//! # Multi-step signup (session-backed)
//! GET  /api/signup             - Current step
//! POST /api/signup/submit      - Submit the current step
//! POST /api/signup/skip        - Skip an optional step
//! POST /api/signup/back        - Return to the previous step
//! ```

pub mod funnel;
pub mod golden_ticket;
pub mod health;
pub mod newsletter;
pub mod signup;

use axum::{
    Router,
    routing::{get, post},
};

use crate::middleware::RateLimiterLayer;
use crate::state::AppState;

/// Create the funnel routes router.
pub fn funnel_routes() -> Router<AppState> {
    Router::new()
        .route("/funnel", get(funnel::current).post(funnel::advance))
        .route("/funnel/interest", post(funnel::interest))
        .route("/funnel/conversion", post(funnel::conversion))
}

/// Create the signup routes router.
pub fn signup_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", get(signup::current))
        .route("/signup/submit", post(signup::submit))
        .route("/signup/skip", post(signup::skip))
        .route("/signup/back", post(signup::back))
}

/// Create the JSON API router, rate limited when a limiter is given.
pub fn api_routes(limiter: Option<RateLimiterLayer>) -> Router<AppState> {
    let api = Router::new()
        .route("/newsletter", post(newsletter::subscribe))
        .route("/golden-ticket", post(golden_ticket::enter))
        .merge(funnel_routes())
        .merge(signup_routes());

    match limiter {
        Some(limiter) => api.layer(limiter),
        None => api,
    }
}

/// Build all routes.
pub fn routes(limiter: Option<RateLimiterLayer>) -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api", api_routes(limiter))
}
