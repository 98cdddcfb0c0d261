//! Golden ticket sweepstakes entry.
//!
//! The entry is accepted once the ticket code and email are valid. Syncing
//! the entrant to the mailing list is best effort: a rejected or unreachable
//! list still answers `200` with `mailchimpSynced: false`. Only a missing
//! list configuration is an error.

use axum::{Json, extract::State, response::Response};
use serde::{Deserialize, Serialize};
use sweetbox_core::{FunnelTracker, ProfileDraft, SubscriptionStatus, TicketCode, ValidationError};
use tracing::instrument;

use crate::error::Result;
use crate::extract::ApiJson;
use crate::middleware::CookieStageStore;
use crate::services::{Campaign, UpsertError, UpsertRequest};
use crate::state::AppState;

/// Source recorded when the page does not send one.
pub const GOLDEN_TICKET_SOURCE: &str = "golden_ticket";

/// Golden ticket entry body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoldenTicketRequest {
    #[serde(flatten)]
    pub profile: ProfileDraft,
    #[serde(default)]
    pub ticket_code: Option<String>,
    #[serde(default)]
    pub newsletter_opt_in: bool,
}

/// Accepted entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoldenTicketResponse {
    pub success: bool,
    pub message: &'static str,
    pub ticket_code: TicketCode,
    pub email: String,
    pub mailchimp_synced: bool,
}

/// Enter the sweepstakes with a golden ticket code.
#[instrument(skip_all, fields(email = tracing::field::Empty, ticket = tracing::field::Empty))]
pub async fn enter(
    State(state): State<AppState>,
    funnel: CookieStageStore,
    ApiJson(request): ApiJson<GoldenTicketRequest>,
) -> Result<Response> {
    let mut draft = request.profile;
    if draft.source.as_deref().is_none_or(|s| s.trim().is_empty()) {
        draft.source = Some(GOLDEN_TICKET_SOURCE.to_string());
    }
    if draft.offer_name.as_deref().is_none_or(|s| s.trim().is_empty()) {
        draft.offer_name = Some(state.upsert().policy().sweepstakes_offer.clone());
    }

    let profile = draft
        .into_profile(state.defaults())
        .map_err(ValidationError::from)?;
    let ticket = TicketCode::parse(request.ticket_code.as_deref().map_or("", str::trim))?;

    let span = tracing::Span::current();
    span.record("email", profile.email.as_str());
    span.record("ticket", ticket.as_str());

    // Opting in re-confirms existing members too; entering without opt-in
    // never demotes a subscriber.
    let (status_if_new, status) = if request.newsletter_opt_in {
        (SubscriptionStatus::Pending, Some(SubscriptionStatus::Pending))
    } else {
        (SubscriptionStatus::Transactional, None)
    };

    let synced = match state
        .upsert()
        .upsert(UpsertRequest {
            profile: &profile,
            status_if_new,
            status,
            campaign: Campaign::Sweepstakes {
                ticket: ticket.clone(),
                newsletter_opt_in: request.newsletter_opt_in,
            },
        })
        .await
    {
        Ok(outcome) => {
            if let Some(warning) = &outcome.tags_warning {
                tracing::warn!(warning = %warning, "Golden ticket entry tagged partially");
            }
            true
        }
        Err(UpsertError::NotConfigured) => return Err(UpsertError::NotConfigured.into()),
        Err(err) => {
            tracing::warn!(
                error = %err,
                kind = %err.kind().map_or("unknown", |k| k.as_str()),
                "Golden ticket entry accepted without mailing list sync"
            );
            false
        }
    };

    let mut tracker = FunnelTracker::new(funnel, state.events());
    tracker.track_email_capture(profile.email.as_str());

    let body = GoldenTicketResponse {
        success: true,
        message: "Your golden ticket entry has been received. Good luck!",
        ticket_code: ticket,
        email: profile.email.as_str().to_string(),
        mailchimp_synced: synced,
    };

    Ok(tracker.into_store().apply(Json(body)))
}
