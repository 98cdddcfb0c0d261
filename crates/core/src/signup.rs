//! Multi-step signup state machine.
//!
//! One machine serves every form variant: the step sequence is data
//! ([`FlowDefinition`]), not code. A visitor moves forward one step per
//! successful submission, the profile accumulating along the way, until the
//! terminal `done` step.
//!
//! # Transitions
//!
//! ```text
//! email   --submit--> name    --submit--> done
//! contact --submit--> address --submit--> done
//!                     address --skip----> done
//!                     address --back----> contact
//! ```
//!
//! Local validation and the consent gate run before any remote call. Remote
//! failures leave the machine on the current step.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::events::{EventParams, EventSink, params};
use crate::funnel::{FunnelTracker, StageStore};
use crate::types::{
    Email, EmailError, FormStep, ProfileDefaults, ProfileDraft, ProfileError, ProfileField,
    SubscriptionStatus, VisitorProfile,
};

/// Emitted once when a visitor reaches `done`.
pub const COMPLETE_EVENT: &str = "complete_registration";

/// Emitted when a step's remote call fails.
pub const FORM_ERROR_EVENT: &str = "form_error";

/// Emitted when the optional giveaway opt-in was recorded.
pub const GIVEAWAY_EVENT: &str = "giveaway_opt_in";

/// Remote side of a signup: the mailing list upsert.
#[async_trait]
pub trait LeadCapture: Send + Sync {
    /// Error surfaced to the machine on a failed call.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Create or update the visitor's remote record. Must be idempotent per email.
    async fn capture(
        &self,
        profile: &VisitorProfile,
        status_if_new: SubscriptionStatus,
    ) -> Result<CaptureReceipt, Self::Error>;

    /// Record the optional giveaway opt-in. Independent of `capture`.
    async fn enter_giveaway(&self, email: &Email) -> Result<(), Self::Error>;
}

/// Result of a successful [`LeadCapture::capture`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureReceipt {
    pub status: SubscriptionStatus,
    /// Non-fatal problem worth showing to the caller (e.g. tagging failed).
    pub warning: Option<String>,
}

/// Local validation failures. Never reach the network.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid email: {0}")]
    InvalidEmail(EmailError),
    #[error("{} is required", .0.label())]
    MissingField(ProfileField),
    #[error("{} must be at least {min} characters", .field.label())]
    TooShort { field: ProfileField, min: usize },
    #[error("email cannot change once captured")]
    EmailChanged,
}

impl From<ProfileError> for ValidationError {
    fn from(err: ProfileError) -> Self {
        match err {
            ProfileError::MissingEmail => Self::MissingField(ProfileField::Email),
            ProfileError::InvalidEmail(e) => Self::InvalidEmail(e),
            ProfileError::EmailChanged => Self::EmailChanged,
        }
    }
}

/// Errors returned by the signup machine.
#[derive(thiserror::Error, Debug)]
pub enum SignupError<E> {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("consent is required")]
    ConsentRequired,
    #[error("signup is already complete")]
    AlreadyComplete,
    #[error("step {0} cannot be skipped")]
    NotSkippable(FormStep),
    #[error("cannot go back from step {0}")]
    CannotGoBack(FormStep),
    #[error("submission failed: {0}")]
    Capture(#[source] E),
}

/// One step of a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub step: FormStep,
    /// Fields that must be non-empty on the merged profile.
    pub required: Vec<ProfileField>,
    /// Minimum length of required name fields (0 = no minimum).
    pub min_name_length: usize,
    pub requires_consent: bool,
    pub skippable: bool,
    pub allows_back: bool,
    /// Event emitted when this step's submission succeeds.
    pub capture_event: Option<String>,
    /// `type` reported with `form_error` events.
    pub error_type: String,
}

impl StepDescriptor {
    fn new(step: FormStep, error_type: &str) -> Self {
        Self {
            step,
            required: Vec::new(),
            min_name_length: 0,
            requires_consent: false,
            skippable: false,
            allows_back: false,
            capture_event: None,
            error_type: error_type.to_string(),
        }
    }

    fn email_capture(step: FormStep, required: &[ProfileField], event: &str, error: &str) -> Self {
        Self {
            required: required.to_vec(),
            min_name_length: 2,
            requires_consent: true,
            capture_event: Some(event.to_string()),
            ..Self::new(step, error)
        }
    }
}

/// An ordered list of steps plus the status new members get.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub name: String,
    pub steps: Vec<StepDescriptor>,
    pub status_if_new: SubscriptionStatus,
}

impl FlowDefinition {
    /// Email only, straight to done.
    #[must_use]
    pub fn single_step() -> Self {
        Self {
            name: "single_step".to_string(),
            steps: vec![StepDescriptor::email_capture(
                FormStep::Email,
                &[ProfileField::Email],
                "newsletter_email_captured",
                "newsletter_signup_email",
            )],
            status_if_new: SubscriptionStatus::Subscribed,
        }
    }

    /// Hero form: email first, first name second.
    #[must_use]
    pub fn hero_two_step() -> Self {
        Self {
            name: "hero_two_step".to_string(),
            steps: vec![
                StepDescriptor::email_capture(
                    FormStep::Email,
                    &[ProfileField::Email],
                    "newsletter_email_captured",
                    "newsletter_signup_email",
                ),
                StepDescriptor {
                    required: vec![ProfileField::FirstName],
                    min_name_length: 2,
                    ..StepDescriptor::new(FormStep::Name, "newsletter_signup_name")
                },
            ],
            status_if_new: SubscriptionStatus::Subscribed,
        }
    }

    /// Contact details, then an optional address step.
    #[must_use]
    pub fn contact_address() -> Self {
        Self {
            name: "contact_address".to_string(),
            steps: vec![
                StepDescriptor::email_capture(
                    FormStep::Contact,
                    &[
                        ProfileField::Email,
                        ProfileField::FirstName,
                        ProfileField::LastName,
                    ],
                    "contact_captured",
                    "signup_contact",
                ),
                StepDescriptor {
                    skippable: true,
                    allows_back: true,
                    ..StepDescriptor::new(FormStep::Address, "signup_address")
                },
            ],
            status_if_new: SubscriptionStatus::Subscribed,
        }
    }

    /// Look up a preset by name.
    #[must_use]
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "single_step" => Some(Self::single_step()),
            "hero_two_step" => Some(Self::hero_two_step()),
            "contact_address" => Some(Self::contact_address()),
            _ => None,
        }
    }

    /// Override the status assigned to new members.
    #[must_use]
    pub const fn with_status_if_new(mut self, status: SubscriptionStatus) -> Self {
        self.status_if_new = status;
        self
    }
}

/// Input of one step submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepInput {
    #[serde(flatten)]
    pub profile: ProfileDraft,
    #[serde(default)]
    pub giveaway_opt_in: bool,
}

/// Outcome of a successful transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: FormStep,
    pub to: FormStep,
    pub status: Option<SubscriptionStatus>,
    pub warnings: Vec<String>,
}

/// A visitor's progress through a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupMachine {
    flow: FlowDefinition,
    position: usize,
    profile: Option<VisitorProfile>,
    completed: bool,
}

impl SignupMachine {
    /// Start a visitor at the first step of `flow`.
    #[must_use]
    pub const fn new(flow: FlowDefinition) -> Self {
        Self {
            flow,
            position: 0,
            profile: None,
            completed: false,
        }
    }

    /// The step the visitor is on.
    #[must_use]
    pub fn current_step(&self) -> FormStep {
        if self.completed {
            return FormStep::Done;
        }
        self.descriptor().map_or(FormStep::Done, |d| d.step)
    }

    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.completed
    }

    /// The accumulated profile, once the first step succeeded.
    #[must_use]
    pub const fn profile(&self) -> Option<&VisitorProfile> {
        self.profile.as_ref()
    }

    #[must_use]
    pub const fn flow(&self) -> &FlowDefinition {
        &self.flow
    }

    fn descriptor(&self) -> Option<&StepDescriptor> {
        if self.completed {
            return None;
        }
        self.flow.steps.get(self.position)
    }

    /// Submit the current step.
    ///
    /// # Errors
    ///
    /// - [`SignupError::Validation`] / [`SignupError::ConsentRequired`] before
    ///   any remote call
    /// - [`SignupError::Capture`] if the remote call failed (step unchanged)
    /// - [`SignupError::AlreadyComplete`] once `done`
    pub async fn submit<C, S, E>(
        &mut self,
        input: StepInput,
        defaults: &ProfileDefaults,
        capture: &C,
        funnel: &mut FunnelTracker<S, E>,
    ) -> Result<Transition, SignupError<C::Error>>
    where
        C: LeadCapture + ?Sized,
        S: StageStore,
        E: EventSink,
    {
        let descriptor = self
            .descriptor()
            .cloned()
            .ok_or(SignupError::AlreadyComplete)?;

        let candidate = match &self.profile {
            None => input.profile.into_profile(defaults).map_err(ValidationError::from)?,
            Some(existing) => {
                let mut merged = existing.clone();
                merged.apply(&input.profile).map_err(ValidationError::from)?;
                merged
            }
        };

        check_required(&descriptor, &candidate)?;

        if descriptor.requires_consent && !candidate.consent {
            return Err(SignupError::ConsentRequired);
        }

        self.finish_step(&descriptor, candidate, input.giveaway_opt_in, capture, funnel)
            .await
    }

    /// Skip the current (optional) step with an empty delta.
    ///
    /// # Errors
    ///
    /// Returns [`SignupError::NotSkippable`] on a required step, otherwise the
    /// same errors as [`SignupMachine::submit`].
    pub async fn skip<C, S, E>(
        &mut self,
        capture: &C,
        funnel: &mut FunnelTracker<S, E>,
    ) -> Result<Transition, SignupError<C::Error>>
    where
        C: LeadCapture + ?Sized,
        S: StageStore,
        E: EventSink,
    {
        let descriptor = self
            .descriptor()
            .cloned()
            .ok_or(SignupError::AlreadyComplete)?;

        if !descriptor.skippable {
            return Err(SignupError::NotSkippable(descriptor.step));
        }

        let candidate = self
            .profile
            .clone()
            .ok_or(ValidationError::MissingField(ProfileField::Email))?;

        self.finish_step(&descriptor, candidate, false, capture, funnel)
            .await
    }

    /// Return to the previous step. No remote call, no events.
    ///
    /// # Errors
    ///
    /// Returns [`SignupError::CannotGoBack`] unless the current step allows it.
    pub fn back<E>(&mut self) -> Result<Transition, SignupError<E>> {
        let descriptor = self.descriptor().ok_or(SignupError::AlreadyComplete)?;
        let from = descriptor.step;

        if !descriptor.allows_back || self.position == 0 {
            return Err(SignupError::CannotGoBack(from));
        }

        self.position -= 1;
        Ok(Transition {
            from,
            to: self.current_step(),
            status: None,
            warnings: Vec::new(),
        })
    }

    async fn finish_step<C, S, E>(
        &mut self,
        descriptor: &StepDescriptor,
        candidate: VisitorProfile,
        giveaway_opt_in: bool,
        capture: &C,
        funnel: &mut FunnelTracker<S, E>,
    ) -> Result<Transition, SignupError<C::Error>>
    where
        C: LeadCapture + ?Sized,
        S: StageStore,
        E: EventSink,
    {
        let receipt = match capture.capture(&candidate, self.flow.status_if_new).await {
            Ok(receipt) => receipt,
            Err(err) => {
                funnel.events().track(
                    FORM_ERROR_EVENT,
                    params(json!({
                        "type": descriptor.error_type,
                        "error": err.to_string(),
                    })),
                );
                return Err(SignupError::Capture(err));
            }
        };

        let mut warnings: Vec<String> = receipt.warning.into_iter().collect();
        let first_capture = self.profile.is_none();

        if first_capture {
            funnel.track_email_capture(candidate.email.as_str());
        }

        if let Some(event) = &descriptor.capture_event {
            funnel.events().track(event, self.event_params(&candidate));
        }

        if giveaway_opt_in {
            match capture.enter_giveaway(&candidate.email).await {
                Ok(()) => funnel
                    .events()
                    .track(GIVEAWAY_EVENT, params(json!({ "source": candidate.source }))),
                Err(err) => warnings.push(format!("giveaway entry not recorded: {err}")),
            }
        }

        let completion_params = self.event_params(&candidate);
        self.profile = Some(candidate);
        self.position += 1;

        if self.position >= self.flow.steps.len() {
            self.completed = true;
            funnel.events().track(COMPLETE_EVENT, completion_params);
        }

        Ok(Transition {
            from: descriptor.step,
            to: self.current_step(),
            status: Some(receipt.status),
            warnings,
        })
    }

    fn event_params(&self, profile: &VisitorProfile) -> EventParams {
        params(json!({
            "method": self.flow.name,
            "source": profile.source,
            "offer": profile.offer_name.as_deref().map(str::to_lowercase),
            "utm_source": profile.attribution.utm_source,
        }))
    }
}

fn check_required(
    descriptor: &StepDescriptor,
    profile: &VisitorProfile,
) -> Result<(), ValidationError> {
    for field in &descriptor.required {
        let value = field
            .value_in(profile)
            .ok_or(ValidationError::MissingField(*field))?;
        if field.is_name() && value.trim().chars().count() < descriptor.min_name_length {
            return Err(ValidationError::TooShort {
                field: *field,
                min: descriptor.min_name_length,
            });
        }
    }
    Ok(())
}

/// At-most-one in-flight submission per visitor.
///
/// [`SubmissionLock::try_acquire`] hands out a guard; the slot frees when the
/// guard drops, whether the submission succeeded, failed, panicked or was
/// cancelled mid-flight.
#[derive(Debug, Default)]
pub struct SubmissionLock {
    active: Mutex<HashSet<String>>,
}

impl SubmissionLock {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the slot for `key`, or `None` if a submission is already running.
    #[must_use]
    pub fn try_acquire(self: &Arc<Self>, key: impl Into<String>) -> Option<SubmissionGuard> {
        let key = key.into();
        let inserted = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());

        inserted.then(|| SubmissionGuard {
            lock: Arc::clone(self),
            key,
        })
    }

    /// True if a submission for `key` is in flight.
    #[must_use]
    pub fn is_active(&self, key: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

/// Held for the duration of one submission.
#[derive(Debug)]
pub struct SubmissionGuard {
    lock: Arc<SubmissionLock>,
    key: String,
}

impl Drop for SubmissionGuard {
    fn drop(&mut self) {
        self.lock
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::types::FunnelStage;

    #[derive(Debug, thiserror::Error)]
    #[error("remote said no")]
    struct RemoteNo;

    #[derive(Default)]
    struct FakeCapture {
        calls: AtomicUsize,
        giveaway_calls: AtomicUsize,
        fail: bool,
        fail_giveaway: bool,
        seen: Mutex<Vec<VisitorProfile>>,
    }

    #[async_trait]
    impl LeadCapture for FakeCapture {
        type Error = RemoteNo;

        async fn capture(
            &self,
            profile: &VisitorProfile,
            status_if_new: SubscriptionStatus,
        ) -> Result<CaptureReceipt, RemoteNo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(profile.clone());
            if self.fail {
                return Err(RemoteNo);
            }
            Ok(CaptureReceipt {
                status: status_if_new,
                warning: None,
            })
        }

        async fn enter_giveaway(&self, _email: &Email) -> Result<(), RemoteNo> {
            self.giveaway_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_giveaway {
                return Err(RemoteNo);
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryStore(Option<FunnelStage>);

    impl StageStore for MemoryStore {
        fn load(&self) -> Option<FunnelStage> {
            self.0
        }

        fn persist(&mut self, stage: FunnelStage, _ttl: Duration) {
            self.0 = Some(stage);
        }
    }

    #[derive(Default)]
    struct RecordingSink(RefCell<Vec<String>>);

    impl RecordingSink {
        fn names(&self) -> Vec<String> {
            self.0.borrow().clone()
        }

        fn count(&self, name: &str) -> usize {
            self.0.borrow().iter().filter(|n| *n == name).count()
        }
    }

    impl EventSink for RecordingSink {
        fn track(&self, event: &str, _params: EventParams) {
            self.0.borrow_mut().push(event.to_string());
        }
    }

    fn input(json: serde_json::Value) -> StepInput {
        serde_json::from_value(json).unwrap()
    }

    #[tokio::test]
    async fn test_two_step_happy_path() {
        let capture = FakeCapture::default();
        let sink = RecordingSink::default();
        let mut funnel = FunnelTracker::new(MemoryStore::default(), &sink);
        let defaults = ProfileDefaults::default();
        let mut machine = SignupMachine::new(FlowDefinition::hero_two_step());

        let t = machine
            .submit(
                input(json!({"email": "a@b.com", "firstName": "", "consent": true})),
                &defaults,
                &capture,
                &mut funnel,
            )
            .await
            .unwrap();
        assert_eq!((t.from, t.to), (FormStep::Email, FormStep::Name));
        assert_eq!(funnel.current_stage(), FunnelStage::EmailCapture);

        let t = machine
            .submit(input(json!({"firstName": "Lena"})), &defaults, &capture, &mut funnel)
            .await
            .unwrap();
        assert_eq!(t.to, FormStep::Done);
        assert!(machine.is_complete());

        let seen = capture.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].email.as_str(), "a@b.com");
        assert_eq!(seen[1].first_name.as_deref(), Some("Lena"));
        assert_eq!(
            seen[0].email.subscriber_hash(),
            seen[1].email.subscriber_hash()
        );

        assert_eq!(
            sink.names(),
            vec!["funnel_step", "newsletter_email_captured", COMPLETE_EVENT]
        );
    }

    #[tokio::test]
    async fn test_consent_gate_blocks_remote_call() {
        let capture = FakeCapture::default();
        let sink = RecordingSink::default();
        let mut funnel = FunnelTracker::new(MemoryStore::default(), &sink);
        let mut machine = SignupMachine::new(FlowDefinition::hero_two_step());

        let err = machine
            .submit(
                input(json!({"email": "a@b.com", "consent": false})),
                &ProfileDefaults::default(),
                &capture,
                &mut funnel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SignupError::ConsentRequired));
        assert_eq!(capture.calls.load(Ordering::SeqCst), 0);
        assert_eq!(machine.current_step(), FormStep::Email);
        assert_eq!(funnel.current_stage(), FunnelStage::Landing);
        assert!(sink.names().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_email_fails_fast() {
        let capture = FakeCapture::default();
        let sink = RecordingSink::default();
        let mut funnel = FunnelTracker::new(MemoryStore::default(), &sink);
        let mut machine = SignupMachine::new(FlowDefinition::single_step());

        for bad in ["bad", "a@b", "a b@c.de", ""] {
            let err = machine
                .submit(
                    input(json!({"email": bad, "consent": true})),
                    &ProfileDefaults::default(),
                    &capture,
                    &mut funnel,
                )
                .await
                .unwrap_err();
            assert!(matches!(err, SignupError::Validation(_)), "{bad}");
        }
        assert_eq!(capture.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_remote_failure_stays_on_step() {
        let capture = FakeCapture {
            fail: true,
            ..FakeCapture::default()
        };
        let sink = RecordingSink::default();
        let mut funnel = FunnelTracker::new(MemoryStore::default(), &sink);
        let mut machine = SignupMachine::new(FlowDefinition::hero_two_step());

        let err = machine
            .submit(
                input(json!({"email": "a@b.com", "consent": true})),
                &ProfileDefaults::default(),
                &capture,
                &mut funnel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SignupError::Capture(_)));
        assert_eq!(machine.current_step(), FormStep::Email);
        assert!(machine.profile().is_none());
        assert_eq!(funnel.current_stage(), FunnelStage::Landing);
        assert_eq!(sink.names(), vec![FORM_ERROR_EVENT]);
    }

    #[tokio::test]
    async fn test_contact_requires_names_with_min_length() {
        let capture = FakeCapture::default();
        let sink = RecordingSink::default();
        let mut funnel = FunnelTracker::new(MemoryStore::default(), &sink);
        let mut machine = SignupMachine::new(FlowDefinition::contact_address());

        let err = machine
            .submit(
                input(json!({"email": "a@b.com", "firstName": "A", "lastName": "Berg", "consent": true})),
                &ProfileDefaults::default(),
                &capture,
                &mut funnel,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SignupError::Validation(ValidationError::TooShort {
                field: ProfileField::FirstName,
                min: 2
            })
        ));

        let err = machine
            .submit(
                input(json!({"email": "a@b.com", "firstName": "Ana", "consent": true})),
                &ProfileDefaults::default(),
                &capture,
                &mut funnel,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SignupError::Validation(ValidationError::MissingField(ProfileField::LastName))
        ));
        assert_eq!(capture.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_address_skip_back_and_completion_once() {
        let capture = FakeCapture::default();
        let sink = RecordingSink::default();
        let mut funnel = FunnelTracker::new(MemoryStore::default(), &sink);
        let defaults = ProfileDefaults::default();
        let mut machine = SignupMachine::new(FlowDefinition::contact_address());

        machine
            .submit(
                input(json!({"email": "a@b.com", "firstName": "Ana", "lastName": "Berg", "consent": true})),
                &defaults,
                &capture,
                &mut funnel,
            )
            .await
            .unwrap();
        assert_eq!(machine.current_step(), FormStep::Address);

        let t = machine.back::<RemoteNo>().unwrap();
        assert_eq!((t.from, t.to), (FormStep::Address, FormStep::Contact));
        assert_eq!(capture.calls.load(Ordering::SeqCst), 1);

        // Re-submitting contact targets the same identity
        machine
            .submit(input(json!({})), &defaults, &capture, &mut funnel)
            .await
            .unwrap();

        let t = machine.skip(&capture, &mut funnel).await.unwrap();
        assert_eq!(t.to, FormStep::Done);
        assert_eq!(sink.count(COMPLETE_EVENT), 1);

        let err = machine
            .submit(input(json!({})), &defaults, &capture, &mut funnel)
            .await
            .unwrap_err();
        assert!(matches!(err, SignupError::AlreadyComplete));
        assert!(matches!(
            machine.skip(&capture, &mut funnel).await.unwrap_err(),
            SignupError::AlreadyComplete
        ));
        assert_eq!(sink.count(COMPLETE_EVENT), 1);
        assert_eq!(capture.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_contact_step_cannot_skip_or_go_back() {
        let capture = FakeCapture::default();
        let sink = RecordingSink::default();
        let mut funnel = FunnelTracker::new(MemoryStore::default(), &sink);
        let mut machine = SignupMachine::new(FlowDefinition::contact_address());

        assert!(matches!(
            machine.skip(&capture, &mut funnel).await.unwrap_err(),
            SignupError::NotSkippable(FormStep::Contact)
        ));
        assert!(matches!(
            machine.back::<RemoteNo>().unwrap_err(),
            SignupError::CannotGoBack(FormStep::Contact)
        ));
    }

    #[tokio::test]
    async fn test_giveaway_failure_is_warning() {
        let capture = FakeCapture {
            fail_giveaway: true,
            ..FakeCapture::default()
        };
        let sink = RecordingSink::default();
        let mut funnel = FunnelTracker::new(MemoryStore::default(), &sink);
        let defaults = ProfileDefaults::default();
        let mut machine = SignupMachine::new(FlowDefinition::contact_address());

        machine
            .submit(
                input(json!({"email": "a@b.com", "firstName": "Ana", "lastName": "Berg", "consent": true})),
                &defaults,
                &capture,
                &mut funnel,
            )
            .await
            .unwrap();

        let t = machine
            .submit(
                input(json!({"street": "Zuckerweg 1", "city": "Berlin", "giveawayOptIn": true})),
                &defaults,
                &capture,
                &mut funnel,
            )
            .await
            .unwrap();

        assert_eq!(t.to, FormStep::Done);
        assert_eq!(t.warnings.len(), 1);
        assert_eq!(capture.giveaway_calls.load(Ordering::SeqCst), 1);
        assert_eq!(machine.profile().unwrap().address.city, "Berlin");
    }

    #[tokio::test]
    async fn test_email_cannot_change_between_steps() {
        let capture = FakeCapture::default();
        let sink = RecordingSink::default();
        let mut funnel = FunnelTracker::new(MemoryStore::default(), &sink);
        let defaults = ProfileDefaults::default();
        let mut machine = SignupMachine::new(FlowDefinition::hero_two_step());

        machine
            .submit(
                input(json!({"email": "a@b.com", "consent": true})),
                &defaults,
                &capture,
                &mut funnel,
            )
            .await
            .unwrap();

        let err = machine
            .submit(
                input(json!({"email": "c@d.com", "firstName": "Lena"})),
                &defaults,
                &capture,
                &mut funnel,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SignupError::Validation(ValidationError::EmailChanged)
        ));
    }

    #[test]
    fn test_submission_lock_releases_on_drop() {
        let lock = SubmissionLock::new();

        let guard = lock.try_acquire("visitor-1").unwrap();
        assert!(lock.is_active("visitor-1"));
        assert!(lock.try_acquire("visitor-1").is_none());
        assert!(lock.try_acquire("visitor-2").is_some());

        drop(guard);
        assert!(!lock.is_active("visitor-1"));
        assert!(lock.try_acquire("visitor-1").is_some());
    }

    #[test]
    fn test_flow_presets_by_name() {
        assert_eq!(
            FlowDefinition::by_name("contact_address"),
            Some(FlowDefinition::contact_address())
        );
        assert!(FlowDefinition::by_name("four_step").is_none());
    }

    #[test]
    fn test_machine_survives_session_roundtrip() {
        let machine = SignupMachine::new(FlowDefinition::hero_two_step());
        let json = serde_json::to_value(&machine).unwrap();
        let back: SignupMachine = serde_json::from_value(json).unwrap();
        assert_eq!(back, machine);
        assert_eq!(back.current_step(), FormStep::Email);
    }
}
