//! Sweetbox landing service library.
//!
//! Lead capture for the Sweetbox landing page: newsletter signups, golden
//! ticket entries, the funnel stage cookie and the multi-step signup form,
//! all backed by a Mailchimp audience. Exposed as a library so the router can
//! be driven in tests without a socket.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

use axum::{Router, extract::Request};
use tower_http::trace::TraceLayer;

use crate::middleware::RateLimiterLayer;
use crate::state::AppState;

/// Build the application router with its middleware stack.
///
/// `limiter` guards `/api/*`; it keys on proxy client IP headers, so it is
/// left out where requests carry none.
pub fn build_router(state: AppState, limiter: Option<RateLimiterLayer>) -> Router {
    let session_layer = middleware::create_session_layer(state.config());

    Router::new()
        .merge(routes::routes(limiter))
        .layer(session_layer)
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
            )
        }))
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
