//! Mailchimp Marketing API client.
//!
//! Only the two calls the lead flows need: the identity-keyed member upsert
//! (`PUT /lists/{list}/members/{hash}`) and tag activation
//! (`POST /lists/{list}/members/{hash}/tags`). Both are addressed by
//! [`SubscriberHash`], so repeating them is safe.

pub mod classify;
pub mod types;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sweetbox_core::SubscriberHash;
use thiserror::Error;
use tracing::instrument;
use url::Url;

pub use classify::{RejectionKind, RemoteError};
pub use types::{ErrorBody, MemberPut, MemberRecord, TagsBody};

use crate::config::MailchimpConfig;

/// Errors building a [`MailchimpClient`].
#[derive(Debug, Error)]
pub enum MailchimpError {
    /// HTTP client failed to build.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Audience URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// The remote mailing list, as seen by the upsert protocol.
#[async_trait]
pub trait MailingList: Send + Sync {
    /// Create or update the member addressed by `hash`.
    async fn put_member(
        &self,
        hash: &SubscriberHash,
        body: &MemberPut,
    ) -> Result<MemberRecord, RemoteError>;

    /// Activate `tags` on the member addressed by `hash`.
    async fn add_tags(&self, hash: &SubscriberHash, tags: &[String]) -> Result<(), RemoteError>;
}

/// Mailchimp API client bound to one audience.
#[derive(Clone)]
pub struct MailchimpClient {
    client: reqwest::Client,
    members_url: Url,
    api_key: SecretString,
}

impl MailchimpClient {
    /// Create a new Mailchimp client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build or the audience URL is invalid.
    pub fn new(config: &MailchimpConfig) -> Result<Self, MailchimpError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("sweetbox-landing/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let members_url = config
            .api_base
            .join(&format!("lists/{}/members/", config.audience_id))?;

        Ok(Self {
            client,
            members_url,
            api_key: config.api_key.clone(),
        })
    }

    fn member_url(&self, hash: &SubscriberHash, suffix: &str) -> Result<Url, RemoteError> {
        self.members_url
            .join(&format!("{hash}{suffix}"))
            .map_err(|e| RemoteError::transport(RejectionKind::Other, e.to_string()))
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        // Mailchimp ignores the user name; the key is the password.
        request.basic_auth("sweetbox", Some(self.api_key.expose_secret()))
    }
}

#[async_trait]
impl MailingList for MailchimpClient {
    #[instrument(skip(self, body), fields(subscriber_hash = %hash, status_if_new = %body.status_if_new))]
    async fn put_member(
        &self,
        hash: &SubscriberHash,
        body: &MemberPut,
    ) -> Result<MemberRecord, RemoteError> {
        let url = self.member_url(hash, "")?;

        let response = self
            .authorized(self.client.put(url))
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(error_from(response).await);
        }

        response.json::<MemberRecord>().await.map_err(|e| {
            RemoteError::transport(RejectionKind::Other, format!("unreadable member: {e}"))
        })
    }

    #[instrument(skip(self, tags), fields(subscriber_hash = %hash, tag_count = tags.len()))]
    async fn add_tags(&self, hash: &SubscriberHash, tags: &[String]) -> Result<(), RemoteError> {
        let url = self.member_url(hash, "/tags")?;

        let response = self
            .authorized(self.client.post(url))
            .json(&TagsBody::activate(tags))
            .send()
            .await
            .map_err(transport_error)?;

        // 204 No Content on success
        if !response.status().is_success() {
            return Err(error_from(response).await);
        }

        Ok(())
    }
}

/// Classify a non-2xx response. Unparseable bodies classify by status alone.
async fn error_from(response: reqwest::Response) -> RemoteError {
    let status = response.status().as_u16();
    let body = response.json::<ErrorBody>().await.unwrap_or_default();
    let error = RemoteError::from_response(status, &body);
    tracing::warn!(
        status,
        kind = %error.kind,
        title = %body.title,
        detail = %error.detail,
        "Mailchimp rejected request"
    );
    error
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    let kind = if err.is_timeout() {
        RejectionKind::Timeout
    } else {
        RejectionKind::Transport
    };
    tracing::warn!(error = %err, kind = %kind, "Mailchimp request failed");
    RemoteError::transport(kind, err.to_string())
}
