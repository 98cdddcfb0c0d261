//! Integration test harness for the Sweetbox landing service.
//!
//! The full router is driven in-process with `tower::ServiceExt::oneshot`;
//! the Mailchimp audience is replaced by [`FakeMailingList`], which keeps
//! members keyed by subscriber hash the way the real API does.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p sweetbox-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use serde_json::{Map, Value};
use tokio::sync::Notify;
use sweetbox_core::{FlowDefinition, ProfileDefaults, SubscriberHash, SubscriptionStatus};
use sweetbox_landing::{
    build_router,
    config::LandingConfig,
    services::{
        MailingList, RejectionKind, RemoteError, UpsertPolicy,
        mailchimp::{MemberPut, MemberRecord},
    },
    state::AppState,
};
use tower::ServiceExt;

/// A member as stored by [`FakeMailingList`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMember {
    pub email_address: String,
    pub status: SubscriptionStatus,
    pub merge_fields: Map<String, Value>,
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct FakeState {
    members: HashMap<SubscriberHash, StoredMember>,
    puts: Vec<(SubscriberHash, MemberPut)>,
    tag_calls: usize,
    put_failures: VecDeque<RemoteError>,
    tag_failures: VecDeque<RemoteError>,
    gate: Option<Arc<PutGate>>,
}

/// Parks the next `put_member` call until released.
#[derive(Debug, Default)]
pub struct PutGate {
    /// Notified once the parked call has started.
    pub entered: Notify,
    /// Notify to let the parked call continue.
    pub release: Notify,
}

/// In-memory mailing list with Mailchimp's upsert semantics.
///
/// - `status_if_new` applies only when the member is created
/// - `status`, when present, overrides the stored status
/// - merge fields are merged, never cleared
/// - tagging an unknown member fails with `not_found`
///
/// Failures can be queued per call type and are consumed in order.
#[derive(Debug, Default)]
pub struct FakeMailingList {
    state: Mutex<FakeState>,
}

impl FakeMailingList {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `put_member` call with `err`.
    pub fn fail_next_put(&self, err: RemoteError) {
        self.state().put_failures.push_back(err);
    }

    /// Fail the next `add_tags` call with `err`.
    pub fn fail_next_tags(&self, err: RemoteError) {
        self.state().tag_failures.push_back(err);
    }

    /// Park the next `put_member` call until the returned gate is released.
    pub fn hold_next_put(&self) -> Arc<PutGate> {
        let gate = Arc::new(PutGate::default());
        self.state().gate = Some(Arc::clone(&gate));
        gate
    }

    /// The member stored for `email`, looked up by subscriber hash.
    #[must_use]
    pub fn member(&self, email: &str) -> Option<StoredMember> {
        let hash = sweetbox_core::Email::parse(email).ok()?.subscriber_hash();
        self.state().members.get(&hash).cloned()
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.state().members.len()
    }

    /// Number of `put_member` calls, failed ones included.
    #[must_use]
    pub fn put_calls(&self) -> usize {
        self.state().puts.len()
    }

    /// Number of `add_tags` calls, failed ones included.
    #[must_use]
    pub fn tag_calls(&self) -> usize {
        self.state().tag_calls
    }

    /// Every `put_member` call so far, in order.
    #[must_use]
    pub fn puts(&self) -> Vec<(SubscriberHash, MemberPut)> {
        self.state().puts.clone()
    }
}

#[async_trait]
impl MailingList for FakeMailingList {
    async fn put_member(
        &self,
        hash: &SubscriberHash,
        body: &MemberPut,
    ) -> Result<MemberRecord, RemoteError> {
        let gate = self.state().gate.take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let mut state = self.state();
        state.puts.push((hash.clone(), body.clone()));

        if let Some(err) = state.put_failures.pop_front() {
            return Err(err);
        }

        let member = state
            .members
            .entry(hash.clone())
            .or_insert_with(|| StoredMember {
                email_address: body.email_address.clone(),
                status: body.status_if_new,
                merge_fields: Map::new(),
                tags: BTreeSet::new(),
            });

        if let Some(status) = body.status {
            member.status = status;
        }
        member.email_address.clone_from(&body.email_address);
        member
            .merge_fields
            .extend(body.merge_fields.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(MemberRecord {
            id: hash.to_string(),
            email_address: member.email_address.clone(),
            status: member.status,
        })
    }

    async fn add_tags(&self, hash: &SubscriberHash, tags: &[String]) -> Result<(), RemoteError> {
        let mut state = self.state();
        state.tag_calls += 1;

        if let Some(err) = state.tag_failures.pop_front() {
            return Err(err);
        }

        let member = state.members.get_mut(hash).ok_or_else(|| RemoteError {
            kind: RejectionKind::NotFound,
            status: Some(404),
            detail: "The requested resource could not be found.".to_string(),
        })?;
        member.tags.extend(tags.iter().cloned());
        Ok(())
    }
}

/// Remote rejection in Mailchimp's compliance shape.
#[must_use]
pub fn compliance_rejection() -> RemoteError {
    RemoteError {
        kind: RejectionKind::Compliance,
        status: Some(400),
        detail: "a@b.com is in a compliance state due to unsubscribe, bounce, or compliance review and cannot be subscribed.".to_string(),
    }
}

/// Configuration for tests: no Mailchimp credentials, plain-HTTP base URL.
#[must_use]
pub fn test_config(flow: FlowDefinition) -> LandingConfig {
    LandingConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        base_url: "http://localhost:3000".to_string(),
        mailchimp: None,
        upsert: UpsertPolicy::default(),
        signup_flow: flow,
        defaults: ProfileDefaults::default(),
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// The router under test and the fake list behind it.
#[derive(Clone)]
pub struct TestApp {
    pub router: Router,
    pub list: Arc<FakeMailingList>,
}

impl TestApp {
    /// App on the hero two-step flow backed by an empty fake list.
    #[must_use]
    pub fn new() -> Self {
        Self::with_flow(FlowDefinition::hero_two_step())
    }

    #[must_use]
    pub fn with_flow(flow: FlowDefinition) -> Self {
        let list = FakeMailingList::new();
        let shared: Arc<dyn MailingList> = list.clone();
        let state = AppState::with_list(test_config(flow), Some(shared));
        Self {
            router: build_router(state, None),
            list,
        }
    }

    /// App with no mailing list configured.
    #[must_use]
    pub fn unconfigured() -> Self {
        let state = AppState::with_list(test_config(FlowDefinition::hero_two_step()), None);
        Self {
            router: build_router(state, None),
            list: FakeMailingList::new(),
        }
    }

    /// Send a request through the router.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the body is not JSON.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<&Value>,
        cookies: &[String],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if !cookies.is_empty() {
            builder = builder.header(header::COOKIE, cookies.join("; "));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request builds");

        self.dispatch(request).await
    }

    /// Post a raw body labelled as JSON, malformed or not.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built.
    pub async fn post_raw(&self, uri: &str, body: &'static str) -> TestResponse {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .expect("request builds");
        self.dispatch(request).await
    }

    async fn dispatch(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn post(&self, uri: &str, body: &Value) -> TestResponse {
        self.send(Method::POST, uri, Some(body), &[]).await
    }

    pub async fn post_with_cookies(
        &self,
        uri: &str,
        body: &Value,
        cookies: &[String],
    ) -> TestResponse {
        self.send(Method::POST, uri, Some(body), cookies).await
    }

    pub async fn get(&self, uri: &str, cookies: &[String]) -> TestResponse {
        self.send(Method::GET, uri, None, cookies).await
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// A buffered response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// The `name=value` pair of a cookie set by this response.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .find(|pair| pair.split('=').next() == Some(name))
            .map(str::to_string)
    }

    /// The raw `Set-Cookie` header for `name`, attributes included.
    #[must_use]
    pub fn set_cookie_header(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with(&format!("{name}=")))
            .map(str::to_string)
    }
}
