//! Identity-keyed upsert of visitor profiles into the mailing list.
//!
//! # Protocol
//!
//! 1. `PUT` the member under its subscriber hash with the requested
//!    `status_if_new`, the forced `status` if any, and the allow-listed
//!    merge fields.
//! 2. On a compliance rejection, `PUT` once more with `status` and
//!    `status_if_new` forced to `pending`. Any other rejection is final.
//! 3. Activate the categorical tags in a second call. A failure here is
//!    reported as a warning; the member record is already correct.
//!
//! Every call is keyed by the subscriber hash, so the whole sequence can be
//! repeated without creating duplicates.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use sweetbox_core::{
    CaptureReceipt, Email, LeadCapture, SubscriberHash, SubscriptionStatus, TicketCode,
    VisitorProfile,
};
use thiserror::Error;
use tracing::{Span, instrument};

use super::mailchimp::{MailingList, MemberPut, RejectionKind, RemoteError};

/// Tag applied to every signup.
pub const SIGNUP_TAG: &str = "website-signup";

/// Tag applied by the separate giveaway opt-in call.
pub const GIVEAWAY_TAG: &str = "giveaway-opt-in";

/// Server-side knobs of the upsert protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertPolicy {
    /// Merge fields that may be sent (upper-case Mailchimp tags).
    pub merge_fields: Vec<String>,
    /// Sources that earn the `promo-offer` tag.
    pub promo_sources: Vec<String>,
    /// Tags on every sweepstakes entry. Audience segments are built on these.
    pub sweepstakes_tags: Vec<String>,
    /// Extra tags on sweepstakes entries that opted into the newsletter.
    pub sweepstakes_opt_in_tags: Vec<String>,
    /// `OFFER` recorded for sweepstakes entries that name none.
    pub sweepstakes_offer: String,
}

impl Default for UpsertPolicy {
    fn default() -> Self {
        Self {
            merge_fields: vec!["FNAME".into(), "LNAME".into(), "ADDRESS".into()],
            promo_sources: vec!["hero_offer".into(), "giveaway".into(), "golden_ticket".into()],
            sweepstakes_tags: vec![
                "sweepstakes-entry".into(),
                "gewinnspiel-teilnehmer".into(),
                "golden-ticket-2024".into(),
            ],
            sweepstakes_opt_in_tags: vec![
                "newsletter-opt-in".into(),
                "golden-ticket-gewinnspiel".into(),
            ],
            sweepstakes_offer: "Adventskalender 2025".into(),
        }
    }
}

impl UpsertPolicy {
    fn allows(&self, field: &str) -> bool {
        self.merge_fields
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(field))
    }

    fn is_promo(&self, source: &str) -> bool {
        self.promo_sources.iter().any(|promo| promo == source)
    }
}

/// Which form the profile came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Campaign {
    Newsletter,
    /// Golden ticket sweepstakes entry.
    Sweepstakes {
        ticket: TicketCode,
        newsletter_opt_in: bool,
    },
}

/// Input of one upsert.
#[derive(Debug, Clone)]
pub struct UpsertRequest<'a> {
    pub profile: &'a VisitorProfile,
    /// Status for a member the list does not know yet.
    pub status_if_new: SubscriptionStatus,
    /// Status applied to existing members as well.
    pub status: Option<SubscriptionStatus>,
    pub campaign: Campaign,
}

/// Result of a successful upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub email: Email,
    pub subscriber_hash: SubscriberHash,
    /// Status the remote list reports after the upsert.
    pub status: SubscriptionStatus,
    /// True if the compliance fallback was used.
    pub retried_as_pending: bool,
    pub tags: Vec<String>,
    /// Set when the tag call failed.
    pub tags_warning: Option<String>,
}

/// Errors returned by the upsert protocol.
#[derive(Debug, Error)]
pub enum UpsertError {
    /// API key or audience missing. A deployment defect, not retryable.
    #[error("mailing list is not configured")]
    NotConfigured,

    /// The remote list refused the member.
    #[error(transparent)]
    Rejected(#[from] RemoteError),
}

impl UpsertError {
    /// Classified remote failure, if any.
    #[must_use]
    pub const fn kind(&self) -> Option<RejectionKind> {
        match self {
            Self::NotConfigured => None,
            Self::Rejected(err) => Some(err.kind),
        }
    }

    /// True if the visitor may simply try again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self.kind() {
            Some(kind) => kind.is_retryable(),
            None => false,
        }
    }
}

/// Upserts profiles into the configured mailing list.
#[derive(Clone)]
pub struct UpsertService {
    list: Option<Arc<dyn MailingList>>,
    policy: UpsertPolicy,
}

impl UpsertService {
    /// Create the service. `list` is `None` when credentials are missing.
    #[must_use]
    pub fn new(list: Option<Arc<dyn MailingList>>, policy: UpsertPolicy) -> Self {
        Self { list, policy }
    }

    /// True if a mailing list is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.list.is_some()
    }

    #[must_use]
    pub const fn policy(&self) -> &UpsertPolicy {
        &self.policy
    }

    /// Create or update the member for `request.profile`.
    ///
    /// # Errors
    ///
    /// - [`UpsertError::NotConfigured`] without credentials (no remote call)
    /// - [`UpsertError::Rejected`] if the member upsert failed terminally
    #[instrument(
        skip(self, request),
        fields(email = %request.profile.email, subscriber_hash, source = %request.profile.source)
    )]
    pub async fn upsert(&self, request: UpsertRequest<'_>) -> Result<UpsertOutcome, UpsertError> {
        let list = self.list.as_deref().ok_or(UpsertError::NotConfigured)?;
        let profile = request.profile;
        let hash = profile.email.subscriber_hash();
        Span::current().record("subscriber_hash", hash.as_str());

        let mut body = MemberPut {
            email_address: profile.email.as_str().to_string(),
            status_if_new: request.status_if_new,
            status: request.status,
            merge_fields: self.merge_fields(profile, &request.campaign),
        };

        let (record, retried_as_pending) = match list.put_member(&hash, &body).await {
            Ok(record) => (record, false),
            Err(err) if err.kind == RejectionKind::Compliance => {
                tracing::info!(detail = %err.detail, "Compliance rejection, retrying as pending");
                body.status_if_new = SubscriptionStatus::Pending;
                body.status = Some(SubscriptionStatus::Pending);
                (list.put_member(&hash, &body).await?, true)
            }
            Err(err) => return Err(err.into()),
        };

        let tags = self.tags(profile, &request.campaign);
        let tags_warning = match list.add_tags(&hash, &tags).await {
            Ok(()) => None,
            Err(err) => {
                tracing::warn!(error = %err, "Tag assignment failed, member kept");
                Some("Signup saved, but tags could not be applied".to_string())
            }
        };

        tracing::info!(
            status = %record.status,
            retried_as_pending,
            tag_count = tags.len(),
            "Member upserted"
        );

        Ok(UpsertOutcome {
            email: profile.email.clone(),
            subscriber_hash: hash,
            status: record.status,
            retried_as_pending,
            tags,
            tags_warning,
        })
    }

    /// Record a giveaway opt-in as its own tag call.
    ///
    /// # Errors
    ///
    /// Returns an error if not configured or the tag call failed.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn enter_giveaway(&self, email: &Email) -> Result<(), UpsertError> {
        let list = self.list.as_deref().ok_or(UpsertError::NotConfigured)?;
        list.add_tags(&email.subscriber_hash(), &[GIVEAWAY_TAG.to_string()])
            .await?;
        Ok(())
    }

    /// Compose the merge fields for `profile`.
    ///
    /// Text fields are sent only when allow-listed and non-blank. `CONSENT`
    /// is boolean and skips the blank check. `TICKET` is always sent for
    /// sweepstakes entries.
    #[must_use]
    pub fn merge_fields(&self, profile: &VisitorProfile, campaign: &Campaign) -> Map<String, Value> {
        let mut fields = Map::new();
        let attribution = &profile.attribution;

        for (name, value) in [
            ("FNAME", profile.first_name.as_deref()),
            ("LNAME", profile.last_name.as_deref()),
            ("PHONE", profile.phone.as_deref()),
            ("OFFER", profile.offer_name.as_deref()),
            ("SOURCE", Some(profile.source.as_str())),
            ("UTM_SOURCE", Some(attribution.utm_source.as_str())),
            ("UTM_MEDIUM", Some(attribution.utm_medium.as_str())),
            ("UTM_CAMPAIGN", Some(attribution.utm_campaign.as_str())),
        ] {
            let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
                continue;
            };
            if self.policy.allows(name) {
                fields.insert(name.to_string(), Value::String(value.to_string()));
            }
        }

        if self.policy.allows("ADDRESS") && profile.address.is_provided() {
            let address = &profile.address;
            fields.insert(
                "ADDRESS".to_string(),
                json!({
                    "addr1": address.street,
                    "city": address.city,
                    "zip": address.postal_code,
                    "country": address.country,
                }),
            );
        }

        if self.policy.allows("CONSENT") {
            fields.insert("CONSENT".to_string(), Value::Bool(profile.consent));
        }

        if let Campaign::Sweepstakes { ticket, .. } = campaign {
            fields.insert("TICKET".to_string(), Value::String(ticket.to_string()));
        }

        fields
    }

    /// Compute the categorical tags for `profile`, deduplicated in order.
    #[must_use]
    pub fn tags(&self, profile: &VisitorProfile, campaign: &Campaign) -> Vec<String> {
        let mut tags = Vec::new();
        let source = profile.source.trim();
        let attribution = &profile.attribution;

        tags.push(SIGNUP_TAG.to_string());
        if !source.is_empty() {
            tags.push(source.to_string());
        }
        if self.policy.is_promo(source) {
            tags.push("promo-offer".to_string());
        }
        if let Some(slug) = profile.offer_name.as_deref().map(slugify).filter(|s| !s.is_empty()) {
            tags.push(format!("offer-{slug}"));
        }
        if profile.address.is_provided() {
            tags.push("address_provided".to_string());
        }
        for (prefix, value) in [
            ("utm_source", attribution.utm_source.trim()),
            ("utm_campaign", attribution.utm_campaign.trim()),
        ] {
            if !value.is_empty() {
                tags.push(format!("{prefix}_{value}"));
            }
        }

        if let Campaign::Sweepstakes {
            ticket,
            newsletter_opt_in,
        } = campaign
        {
            tags.extend(self.policy.sweepstakes_tags.iter().cloned());
            tags.push(format!("ticket-{}", ticket.prefix()));
            if *newsletter_opt_in {
                tags.extend(self.policy.sweepstakes_opt_in_tags.iter().cloned());
            }
        }

        let mut seen = HashSet::new();
        tags.retain(|tag| seen.insert(tag.clone()));
        tags
    }
}

#[async_trait]
impl LeadCapture for UpsertService {
    type Error = UpsertError;

    async fn capture(
        &self,
        profile: &VisitorProfile,
        status_if_new: SubscriptionStatus,
    ) -> Result<CaptureReceipt, UpsertError> {
        let outcome = self
            .upsert(UpsertRequest {
                profile,
                status_if_new,
                status: None,
                campaign: Campaign::Newsletter,
            })
            .await?;

        Ok(CaptureReceipt {
            status: outcome.status,
            warning: outcome.tags_warning,
        })
    }

    async fn enter_giveaway(&self, email: &Email) -> Result<(), UpsertError> {
        Self::enter_giveaway(self, email).await
    }
}

/// Lowercase, alphanumerics kept, everything else collapsed into single dashes.
fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    for c in value.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
