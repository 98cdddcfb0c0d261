//! Visitor profile accumulated across signup steps.
//!
//! The wire shape ([`ProfileDraft`]) is all-optional; defaults are applied
//! exactly once, at the boundary where a draft first becomes a
//! [`VisitorProfile`]. Later steps merge further drafts into the profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::email::{Email, EmailError};

/// Errors that can occur when building or updating a profile.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("email is required")]
    MissingEmail,
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),
    #[error("email cannot change once captured")]
    EmailChanged,
}

/// Fields a signup step can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    Email,
    FirstName,
    LastName,
    Phone,
    Street,
    City,
    PostalCode,
    Country,
}

impl ProfileField {
    /// Human-readable field name for validation messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::FirstName => "first name",
            Self::LastName => "last name",
            Self::Phone => "phone",
            Self::Street => "street",
            Self::City => "city",
            Self::PostalCode => "postal code",
            Self::Country => "country",
        }
    }

    /// True for the name fields that carry a minimum length.
    #[must_use]
    pub const fn is_name(self) -> bool {
        matches!(self, Self::FirstName | Self::LastName)
    }

    /// Current value of this field on a profile, if set.
    #[must_use]
    pub fn value_in(self, profile: &VisitorProfile) -> Option<&str> {
        let value = match self {
            Self::Email => Some(profile.email.as_str()),
            Self::FirstName => profile.first_name.as_deref(),
            Self::LastName => profile.last_name.as_deref(),
            Self::Phone => profile.phone.as_deref(),
            Self::Street => Some(profile.address.street.as_str()),
            Self::City => Some(profile.address.city.as_str()),
            Self::PostalCode => Some(profile.address.postal_code.as_str()),
            Self::Country => Some(profile.address.country.as_str()),
        };
        value.filter(|v| !v.trim().is_empty())
    }
}

/// Defaults applied when a profile is first assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDefaults {
    pub country: String,
    pub source: String,
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: String,
}

impl Default for ProfileDefaults {
    fn default() -> Self {
        Self {
            country: "DE".to_string(),
            source: "standard".to_string(),
            utm_source: "direct".to_string(),
            utm_medium: "organic".to_string(),
            utm_campaign: "default".to_string(),
        }
    }
}

/// Postal address. Empty strings mean "not given".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

impl PostalAddress {
    /// True if the visitor supplied any part of the address.
    ///
    /// The country is ignored: it always carries a default.
    #[must_use]
    pub fn is_provided(&self) -> bool {
        [&self.street, &self.city, &self.postal_code]
            .iter()
            .any(|part| !part.trim().is_empty())
    }
}

/// Campaign attribution captured from UTM parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: String,
}

/// All-optional wire form of a profile or a profile delta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDraft {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default, alias = "whatsapp")]
    pub phone: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, rename = "offer", alias = "offerName")]
    pub offer_name: Option<String>,
    #[serde(default, rename = "utm_source")]
    pub utm_source: Option<String>,
    #[serde(default, rename = "utm_medium")]
    pub utm_medium: Option<String>,
    #[serde(default, rename = "utm_campaign")]
    pub utm_campaign: Option<String>,
    #[serde(default)]
    pub consent: Option<bool>,
    #[serde(default)]
    pub consent_ts: Option<DateTime<Utc>>,
}

impl ProfileDraft {
    /// Build a profile, applying `defaults` to everything left out.
    ///
    /// # Errors
    ///
    /// Returns an error if the email is missing or malformed.
    pub fn into_profile(self, defaults: &ProfileDefaults) -> Result<VisitorProfile, ProfileError> {
        let email = match clean(self.email.as_ref()) {
            Some(raw) => Email::parse(&raw)?,
            None => return Err(ProfileError::MissingEmail),
        };

        let consent = self.consent.unwrap_or(false);
        let consent_timestamp = consent.then(|| self.consent_ts.unwrap_or_else(Utc::now));

        Ok(VisitorProfile {
            email,
            first_name: clean(self.first_name.as_ref()),
            last_name: clean(self.last_name.as_ref()),
            phone: clean(self.phone.as_ref()),
            address: PostalAddress {
                street: clean(self.street.as_ref()).unwrap_or_default(),
                city: clean(self.city.as_ref()).unwrap_or_default(),
                postal_code: clean(self.postal_code.as_ref()).unwrap_or_default(),
                country: or_default(self.country.as_ref(), &defaults.country),
            },
            consent,
            consent_timestamp,
            source: or_default(self.source.as_ref(), &defaults.source),
            offer_name: clean(self.offer_name.as_ref()),
            attribution: Attribution {
                utm_source: or_default(self.utm_source.as_ref(), &defaults.utm_source),
                utm_medium: or_default(self.utm_medium.as_ref(), &defaults.utm_medium),
                utm_campaign: or_default(self.utm_campaign.as_ref(), &defaults.utm_campaign),
            },
        })
    }
}

/// A visitor's accumulated profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorProfile {
    pub email: Email,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address: PostalAddress,
    pub consent: bool,
    pub consent_timestamp: Option<DateTime<Utc>>,
    pub source: String,
    pub offer_name: Option<String>,
    pub attribution: Attribution,
}

impl VisitorProfile {
    /// Merge a later step's draft into this profile.
    ///
    /// Only non-empty values overwrite. Consent, once given, stays given and
    /// keeps its original timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft names a different (or malformed) email.
    pub fn apply(&mut self, draft: &ProfileDraft) -> Result<(), ProfileError> {
        if let Some(raw) = clean(draft.email.as_ref()) {
            let email = Email::parse(&raw)?;
            if !email.same_identity(&self.email) {
                return Err(ProfileError::EmailChanged);
            }
        }

        overwrite(&mut self.first_name, draft.first_name.as_ref());
        overwrite(&mut self.last_name, draft.last_name.as_ref());
        overwrite(&mut self.phone, draft.phone.as_ref());
        overwrite(&mut self.offer_name, draft.offer_name.as_ref());

        replace(&mut self.address.street, draft.street.as_ref());
        replace(&mut self.address.city, draft.city.as_ref());
        replace(&mut self.address.postal_code, draft.postal_code.as_ref());
        replace(&mut self.address.country, draft.country.as_ref());
        replace(&mut self.source, draft.source.as_ref());
        replace(&mut self.attribution.utm_source, draft.utm_source.as_ref());
        replace(&mut self.attribution.utm_medium, draft.utm_medium.as_ref());
        replace(&mut self.attribution.utm_campaign, draft.utm_campaign.as_ref());

        if draft.consent == Some(true) && !self.consent {
            self.consent = true;
            self.consent_timestamp = Some(draft.consent_ts.unwrap_or_else(Utc::now));
        }

        Ok(())
    }
}

/// Trim a value and drop it if nothing is left.
fn clean(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn or_default(value: Option<&String>, default: &str) -> String {
    clean(value).unwrap_or_else(|| default.to_string())
}

fn overwrite(slot: &mut Option<String>, value: Option<&String>) {
    if let Some(v) = clean(value) {
        *slot = Some(v);
    }
}

fn replace(slot: &mut String, value: Option<&String>) {
    if let Some(v) = clean(value) {
        *slot = v;
    }
}
