//! Application state shared across handlers.

use std::sync::Arc;

use sweetbox_core::{FlowDefinition, ProfileDefaults, SubmissionLock};

use crate::config::LandingConfig;
use crate::services::{
    MailchimpClient, MailchimpError, MailingList, TracingEventSink, UpsertService,
};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the upsert service, the submission lock and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: LandingConfig,
    upsert: UpsertService,
    submissions: Arc<SubmissionLock>,
    events: TracingEventSink,
}

impl AppState {
    /// Create the application state, building the Mailchimp client if configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the Mailchimp HTTP client cannot be built.
    pub fn new(config: LandingConfig) -> Result<Self, MailchimpError> {
        let list = match &config.mailchimp {
            Some(mailchimp) => {
                let client: Arc<dyn MailingList> = Arc::new(MailchimpClient::new(mailchimp)?);
                Some(client)
            }
            None => None,
        };
        Ok(Self::with_list(config, list))
    }

    /// Create the application state around an existing mailing list.
    #[must_use]
    pub fn with_list(config: LandingConfig, list: Option<Arc<dyn MailingList>>) -> Self {
        let upsert = UpsertService::new(list, config.upsert.clone());
        Self {
            inner: Arc::new(AppStateInner {
                config,
                upsert,
                submissions: SubmissionLock::new(),
                events: TracingEventSink,
            }),
        }
    }

    /// Get a reference to the landing configuration.
    #[must_use]
    pub fn config(&self) -> &LandingConfig {
        &self.inner.config
    }

    /// Get a reference to the upsert service.
    #[must_use]
    pub fn upsert(&self) -> &UpsertService {
        &self.inner.upsert
    }

    /// In-flight signup submissions, keyed by visitor.
    #[must_use]
    pub fn submissions(&self) -> &Arc<SubmissionLock> {
        &self.inner.submissions
    }

    #[must_use]
    pub fn events(&self) -> &TracingEventSink {
        &self.inner.events
    }

    #[must_use]
    pub fn signup_flow(&self) -> &FlowDefinition {
        &self.inner.config.signup_flow
    }

    #[must_use]
    pub fn defaults(&self) -> &ProfileDefaults {
        &self.inner.config.defaults
    }
}
