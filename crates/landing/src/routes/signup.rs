//! Multi-step signup routes.
//!
//! The visitor's [`SignupMachine`] lives in the session and is written back
//! only after a step finished, so an abandoned request never leaves partial
//! progress behind. One submission per visitor may run at a time.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use sweetbox_core::{
    FormStep, FunnelTracker, SignupMachine, StepInput, SubmissionGuard, SubscriptionStatus,
    Transition,
};
use tower_sessions::Session;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::extract::ApiJson;
use crate::middleware::CookieStageStore;
use crate::middleware::session::keys;
use crate::services::UpsertError;
use crate::state::AppState;

/// Where the visitor stands after a request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupView {
    pub flow: String,
    pub step: FormStep,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SubscriptionStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl SignupView {
    fn of(machine: &SignupMachine, transition: Option<Transition>) -> Self {
        let (status, warnings) =
            transition.map_or((None, Vec::new()), |t| (t.status, t.warnings));
        Self {
            flow: machine.flow().name.clone(),
            step: machine.current_step(),
            completed: machine.is_complete(),
            email: machine.profile().map(|p| p.email.as_str().to_string()),
            status,
            warnings,
        }
    }
}

/// Get the visitor ID, creating one on first use.
async fn visitor_id(session: &Session) -> Result<String> {
    if let Some(id) = session.get::<String>(keys::VISITOR_ID).await? {
        return Ok(id);
    }
    let id = Uuid::new_v4().to_string();
    session.insert(keys::VISITOR_ID, &id).await?;
    Ok(id)
}

/// Load the visitor's machine, starting over if the configured flow changed.
async fn load_machine(state: &AppState, session: &Session) -> Result<SignupMachine> {
    let flow = state.signup_flow();
    let machine = session
        .get::<SignupMachine>(keys::SIGNUP)
        .await?
        .filter(|machine| machine.flow().name == flow.name);
    Ok(machine.unwrap_or_else(|| SignupMachine::new(flow.clone())))
}

/// Take the visitor's submission lock.
///
/// The session was read before the lock was held, so a stored session is
/// loaded again: the previous holder has saved its progress by now.
async fn lock(state: &AppState, session: &Session) -> Result<Arc<SubmissionGuard>> {
    let visitor = visitor_id(session).await?;
    let guard = state.submissions().try_acquire(visitor).ok_or_else(|| {
        tracing::warn!("Signup submission already in flight");
        AppError::Conflict("Your previous submission is still being processed".to_string())
    })?;
    if session.id().is_some() {
        session.load().await?;
    }
    Ok(Arc::new(guard))
}

/// Release the lock only when the response is dropped, after the session
/// layer saved the machine.
fn hold(guard: Arc<SubmissionGuard>, response: impl IntoResponse) -> Response {
    let mut response = response.into_response();
    response.extensions_mut().insert(guard);
    response
}

/// Report the current step.
pub async fn current(State(state): State<AppState>, session: Session) -> Result<Json<SignupView>> {
    let machine = load_machine(&state, &session).await?;
    Ok(Json(SignupView::of(&machine, None)))
}

/// Submit the current step.
#[instrument(skip_all, fields(step = tracing::field::Empty))]
pub async fn submit(
    State(state): State<AppState>,
    session: Session,
    funnel: CookieStageStore,
    ApiJson(input): ApiJson<StepInput>,
) -> Result<Response> {
    let guard = lock(&state, &session).await?;
    let mut machine = load_machine(&state, &session).await?;
    tracing::Span::current().record("step", machine.current_step().as_str());

    let mut tracker = FunnelTracker::new(funnel, state.events());
    let transition = machine
        .submit(input, state.defaults(), state.upsert(), &mut tracker)
        .await?;

    tracing::info!(from = %transition.from, to = %transition.to, "Signup step completed");
    session.insert(keys::SIGNUP, &machine).await?;

    let view = SignupView::of(&machine, Some(transition));
    Ok(hold(guard, tracker.into_store().apply(Json(view))))
}

/// Skip the current step if it is optional.
#[instrument(skip_all, fields(step = tracing::field::Empty))]
pub async fn skip(
    State(state): State<AppState>,
    session: Session,
    funnel: CookieStageStore,
) -> Result<Response> {
    let guard = lock(&state, &session).await?;
    let mut machine = load_machine(&state, &session).await?;
    tracing::Span::current().record("step", machine.current_step().as_str());

    let mut tracker = FunnelTracker::new(funnel, state.events());
    let transition = machine.skip(state.upsert(), &mut tracker).await?;

    tracing::info!(from = %transition.from, to = %transition.to, "Signup step skipped");
    session.insert(keys::SIGNUP, &machine).await?;

    let view = SignupView::of(&machine, Some(transition));
    Ok(hold(guard, tracker.into_store().apply(Json(view))))
}

/// Return to the previous step.
pub async fn back(State(state): State<AppState>, session: Session) -> Result<Response> {
    let guard = lock(&state, &session).await?;
    let mut machine = load_machine(&state, &session).await?;

    let transition = machine.back::<UpsertError>()?;
    session.insert(keys::SIGNUP, &machine).await?;

    Ok(hold(guard, Json(SignupView::of(&machine, Some(transition)))))
}
