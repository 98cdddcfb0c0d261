//! Cookie-backed funnel stage storage.
//!
//! The visitor's furthest stage lives in the `funnel_step` cookie so the page
//! scripts can read it too. [`CookieStageStore`] is extracted from the
//! request, handed to a [`FunnelTracker`](sweetbox_core::FunnelTracker), and
//! turned back into a `Set-Cookie` header when the tracker advanced.

use std::time::Duration;

use axum::{
    extract::FromRequestParts,
    http::{
        HeaderMap, HeaderValue,
        header::{COOKIE, SET_COOKIE},
        request::Parts,
    },
    response::{IntoResponse, Response},
};
use sweetbox_core::{FunnelStage, StageStore};
use tower_sessions::cookie::{Cookie, SameSite, time};

use crate::state::AppState;

/// Name of the funnel cookie.
pub const FUNNEL_COOKIE: &str = "funnel_step";

/// Funnel stage read from, and written back to, the `funnel_step` cookie.
#[derive(Debug, Default)]
pub struct CookieStageStore {
    loaded: Option<FunnelStage>,
    pending: Option<Cookie<'static>>,
    secure: bool,
}

impl CookieStageStore {
    /// Read the stage from the request's `Cookie` headers.
    ///
    /// Missing, malformed and unknown values all load as unset.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, secure: bool) -> Self {
        let loaded = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == FUNNEL_COOKIE)
            .and_then(|cookie| cookie.value().parse::<FunnelStage>().ok());

        Self {
            loaded,
            pending: None,
            secure,
        }
    }

    /// The `Set-Cookie` value to send, if the stage was persisted.
    #[must_use]
    pub fn set_cookie(&self) -> Option<HeaderValue> {
        self.pending
            .as_ref()
            .and_then(|cookie| HeaderValue::from_str(&cookie.to_string()).ok())
    }

    /// Attach the `Set-Cookie` header (if any) to `response`.
    pub fn apply(self, response: impl IntoResponse) -> Response {
        let mut response = response.into_response();
        if let Some(value) = self.set_cookie() {
            response.headers_mut().append(SET_COOKIE, value);
        }
        response
    }
}

impl StageStore for CookieStageStore {
    fn load(&self) -> Option<FunnelStage> {
        self.loaded
    }

    fn persist(&mut self, stage: FunnelStage, ttl: Duration) {
        let max_age = time::Duration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));
        let cookie = Cookie::build((FUNNEL_COOKIE, stage.as_str()))
            .path("/")
            .max_age(max_age)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .build();

        self.loaded = Some(stage);
        self.pending = Some(cookie);
    }
}

impl FromRequestParts<AppState> for CookieStageStore {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers, state.config().is_secure()))
    }
}
