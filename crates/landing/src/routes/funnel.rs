//! Funnel stage routes.
//!
//! Page scripts report progress here; the stage only ever moves forward and
//! lives in the `funnel_step` cookie.

use axum::{Json, extract::State, response::Response};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sweetbox_core::{EventParams, FunnelStage, FunnelTracker, StageStore};

use crate::extract::ApiJson;
use crate::middleware::CookieStageStore;
use crate::services::TracingEventSink;
use crate::state::AppState;

/// Currency assumed when a conversion does not name one.
pub const DEFAULT_CURRENCY: &str = "EUR";

/// Current funnel position.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelView {
    pub step: FunnelStage,
    pub step_number: usize,
}

impl FunnelView {
    const fn of(stage: FunnelStage) -> Self {
        Self {
            step: stage,
            step_number: stage.step_number(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    pub step: String,
    #[serde(default)]
    pub data: EventParams,
}

#[derive(Debug, Deserialize)]
pub struct InterestRequest {
    pub item: String,
}

#[derive(Debug, Deserialize)]
pub struct ConversionRequest {
    pub value: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
}

type Tracker<'a> = FunnelTracker<CookieStageStore, &'a TracingEventSink>;

fn respond(tracker: Tracker<'_>) -> Response {
    let view = FunnelView::of(tracker.current_stage());
    tracker.into_store().apply(Json(view))
}

/// Report the visitor's current stage.
pub async fn current(funnel: CookieStageStore) -> Json<FunnelView> {
    Json(FunnelView::of(funnel.load().unwrap_or_default()))
}

/// Advance to a named stage. Unknown names and backwards moves are ignored.
pub async fn advance(
    State(state): State<AppState>,
    funnel: CookieStageStore,
    ApiJson(request): ApiJson<AdvanceRequest>,
) -> Response {
    let mut tracker = FunnelTracker::new(funnel, state.events());
    tracker.advance_named(request.step.trim(), request.data);
    respond(tracker)
}

pub async fn interest(
    State(state): State<AppState>,
    funnel: CookieStageStore,
    ApiJson(request): ApiJson<InterestRequest>,
) -> Response {
    let mut tracker = FunnelTracker::new(funnel, state.events());
    tracker.track_interest(request.item.trim());
    respond(tracker)
}

pub async fn conversion(
    State(state): State<AppState>,
    funnel: CookieStageStore,
    ApiJson(request): ApiJson<ConversionRequest>,
) -> Response {
    let currency = request
        .currency
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_CURRENCY)
        .to_uppercase();

    let mut tracker = FunnelTracker::new(funnel, state.events());
    tracker.track_conversion(request.value, &currency);
    respond(tracker)
}
