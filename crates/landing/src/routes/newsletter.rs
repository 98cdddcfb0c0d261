//! Newsletter signup route handler.
//!
//! Assembles a visitor profile from the JSON body, upserts it into the
//! mailing list and moves the funnel cookie to `email_capture`.

use axum::{Json, extract::State, response::Response};
use serde::{Deserialize, Serialize};
use sweetbox_core::{FunnelTracker, ProfileDraft, SubscriptionStatus, ValidationError};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::extract::ApiJson;
use crate::middleware::CookieStageStore;
use crate::services::{Campaign, UpsertRequest};
use crate::state::AppState;

/// Newsletter signup body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsletterRequest {
    #[serde(flatten)]
    pub profile: ProfileDraft,
    #[serde(default)]
    pub status_if_new: Option<SubscriptionStatus>,
}

/// Successful signup.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsletterResponse {
    pub message: &'static str,
    pub email: String,
    pub status: SubscriptionStatus,
    pub retried_as_pending: bool,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags_warning: Option<String>,
}

/// A visitor may ask for single or double opt-in, nothing else.
fn requested_status(status: Option<SubscriptionStatus>) -> Result<SubscriptionStatus> {
    match status.unwrap_or_default() {
        status @ (SubscriptionStatus::Subscribed | SubscriptionStatus::Pending) => Ok(status),
        other => Err(AppError::Validation(format!(
            "statusIfNew must be subscribed or pending, not {other}"
        ))),
    }
}

/// Subscribe to the newsletter.
///
/// Invalid input is rejected before the mailing list is contacted. Repeating
/// the same request updates the same member.
#[instrument(skip_all, fields(email = tracing::field::Empty))]
pub async fn subscribe(
    State(state): State<AppState>,
    funnel: CookieStageStore,
    ApiJson(request): ApiJson<NewsletterRequest>,
) -> Result<Response> {
    let profile = request
        .profile
        .into_profile(state.defaults())
        .map_err(ValidationError::from)?;
    let status_if_new = requested_status(request.status_if_new)?;
    tracing::Span::current().record("email", profile.email.as_str());

    let outcome = state
        .upsert()
        .upsert(UpsertRequest {
            profile: &profile,
            status_if_new,
            status: None,
            campaign: Campaign::Newsletter,
        })
        .await?;

    tracing::info!(
        status = %outcome.status,
        retried_as_pending = outcome.retried_as_pending,
        "Newsletter signup successful"
    );

    let mut tracker = FunnelTracker::new(funnel, state.events());
    tracker.track_email_capture(outcome.email.as_str());

    let message = if outcome.status == SubscriptionStatus::Pending {
        "Almost there! Please confirm your subscription via the email we sent you."
    } else {
        "Thanks for subscribing!"
    };

    let body = NewsletterResponse {
        message,
        email: outcome.email.as_str().to_string(),
        status: outcome.status,
        retried_as_pending: outcome.retried_as_pending,
        tags: outcome.tags,
        tags_warning: outcome.tags_warning,
    };

    Ok(tracker.into_store().apply(Json(body)))
}
