//! Landing service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `LANDING_BASE_URL` - Public URL of the landing page (`https://` enables secure cookies)
//!
//! ## Optional
//! - `LANDING_HOST` - Bind address (default: 127.0.0.1)
//! - `LANDING_PORT` - Listen port (default: 3000)
//! - `MAILCHIMP_API_KEY` - Mailchimp API key (`<key>-<datacenter>`)
//! - `MAILCHIMP_AUDIENCE_ID` - Audience (list) ID, `MAILCHIMP_LIST_ID` accepted as fallback
//! - `MAILCHIMP_API_BASE` - Override the API base URL (default: derived from the key's datacenter)
//! - `MAILCHIMP_TIMEOUT_SECS` - Request timeout (default: 5)
//! - `MAILCHIMP_MERGE_FIELDS` - Comma-separated merge field allow-list (default: FNAME,LNAME,ADDRESS)
//! - `MAILCHIMP_PROMO_SOURCES` - Sources tagged `promo-offer` (default: `hero_offer,giveaway,golden_ticket`)
//! - `MAILCHIMP_SWEEPSTAKES_TAGS` - Tags on every golden ticket entry
//!   (default: `sweepstakes-entry,gewinnspiel-teilnehmer,golden-ticket-2024`)
//! - `MAILCHIMP_SWEEPSTAKES_OPT_IN_TAGS` - Extra tags when the entrant opts in
//!   (default: `newsletter-opt-in,golden-ticket-gewinnspiel`)
//! - `SWEEPSTAKES_OFFER` - Offer recorded for golden ticket entries (default: `Adventskalender 2025`)
//! - `SIGNUP_FLOW` - `hero_two_step`, `contact_address` or `single_step` (default: `hero_two_step`)
//! - `SIGNUP_STATUS_IF_NEW` - Status for new members from the signup flow (default: subscribed)
//! - `DEFAULT_COUNTRY` - Country applied when none is given (default: DE)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Traces sample rate (default: 0.1)
//!
//! The Mailchimp credentials are optional at startup so health checks keep
//! working, but every lead endpoint answers 500 until both are set.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use sweetbox_core::{FlowDefinition, ProfileDefaults, SubscriptionStatus};
use thiserror::Error;
use url::Url;

use crate::services::upsert::UpsertPolicy;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Landing service configuration.
#[derive(Debug, Clone)]
pub struct LandingConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of the landing page
    pub base_url: String,
    /// Mailchimp credentials, `None` if not configured
    pub mailchimp: Option<MailchimpConfig>,
    /// Merge field allow-list and promotional sources
    pub upsert: UpsertPolicy,
    /// Step sequence of the signup form
    pub signup_flow: FlowDefinition,
    /// Defaults applied when a profile is first assembled
    pub defaults: ProfileDefaults,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Mailchimp Marketing API configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct MailchimpConfig {
    /// API key, also used as the basic auth password
    pub api_key: SecretString,
    /// Audience (list) ID
    pub audience_id: String,
    /// API root, e.g. `https://us21.api.mailchimp.com/3.0/`
    pub api_base: Url,
    /// Per-request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for MailchimpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailchimpConfig")
            .field("api_key", &"[REDACTED]")
            .field("audience_id", &self.audience_id)
            .field("api_base", &self.api_base.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LandingConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the Mailchimp key fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("LANDING_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("LANDING_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("LANDING_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("LANDING_PORT".to_string(), e.to_string()))?;
        let base_url = get_required_env("LANDING_BASE_URL")?;

        let mailchimp = MailchimpConfig::from_env()?;
        let upsert = UpsertPolicy {
            merge_fields: get_list_or_default("MAILCHIMP_MERGE_FIELDS", "FNAME,LNAME,ADDRESS"),
            promo_sources: get_list_or_default(
                "MAILCHIMP_PROMO_SOURCES",
                "hero_offer,giveaway,golden_ticket",
            ),
            sweepstakes_tags: get_list_or_default(
                "MAILCHIMP_SWEEPSTAKES_TAGS",
                "sweepstakes-entry,gewinnspiel-teilnehmer,golden-ticket-2024",
            ),
            sweepstakes_opt_in_tags: get_list_or_default(
                "MAILCHIMP_SWEEPSTAKES_OPT_IN_TAGS",
                "newsletter-opt-in,golden-ticket-gewinnspiel",
            ),
            sweepstakes_offer: get_env_or_default("SWEEPSTAKES_OFFER", "Adventskalender 2025"),
        };

        let status_if_new = parse_status(&get_env_or_default("SIGNUP_STATUS_IF_NEW", "subscribed"))?;
        let flow_name = get_env_or_default("SIGNUP_FLOW", "hero_two_step");
        let signup_flow = FlowDefinition::by_name(&flow_name)
            .ok_or_else(|| {
                ConfigError::InvalidEnvVar(
                    "SIGNUP_FLOW".to_string(),
                    format!("unknown flow '{flow_name}'"),
                )
            })?
            .with_status_if_new(status_if_new);

        let defaults = ProfileDefaults {
            country: get_env_or_default("DEFAULT_COUNTRY", "DE"),
            ..ProfileDefaults::default()
        };

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);

        Ok(Self {
            host,
            port,
            base_url,
            mailchimp,
            upsert,
            signup_flow,
            defaults,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// True if the landing page is served over HTTPS.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl MailchimpConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let api_key = get_optional_env("MAILCHIMP_API_KEY");
        let audience_id =
            get_optional_env("MAILCHIMP_AUDIENCE_ID").or_else(|| get_optional_env("MAILCHIMP_LIST_ID"));

        let (Some(key), Some(audience_id)) = (api_key, audience_id) else {
            return Ok(None);
        };

        validate_secret_strength(&key, "MAILCHIMP_API_KEY")?;

        let api_base = match get_optional_env("MAILCHIMP_API_BASE") {
            Some(base) => parse_api_base(&base, "MAILCHIMP_API_BASE")?,
            None => {
                let dc = datacenter(&key).ok_or_else(|| {
                    ConfigError::InvalidEnvVar(
                        "MAILCHIMP_API_KEY".to_string(),
                        "missing '-<datacenter>' suffix".to_string(),
                    )
                })?;
                parse_api_base(
                    &format!("https://{dc}.api.mailchimp.com/3.0/"),
                    "MAILCHIMP_API_KEY",
                )?
            }
        };

        let timeout_secs = get_optional_env("MAILCHIMP_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Some(Self {
            api_key: SecretString::from(key),
            audience_id,
            api_base,
            timeout: Duration::from_secs(timeout_secs),
        }))
    }

    /// Datacenter encoded in the configured key.
    #[must_use]
    pub fn datacenter(&self) -> Option<&str> {
        datacenter(self.api_key.expose_secret())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Datacenter suffix of a Mailchimp API key (`abc123-us21` -> `us21`).
fn datacenter(api_key: &str) -> Option<&str> {
    api_key
        .rsplit_once('-')
        .map(|(_, dc)| dc)
        .filter(|dc| !dc.is_empty() && dc.bytes().all(|b| b.is_ascii_alphanumeric()))
}

/// Parse an API base URL, forcing a trailing slash so relative joins append.
fn parse_api_base(raw: &str, var_name: &str) -> Result<Url, ConfigError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&with_slash)
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))
}

fn parse_status(raw: &str) -> Result<SubscriptionStatus, ConfigError> {
    raw.parse::<SubscriptionStatus>().map_err(|e| {
        ConfigError::InvalidEnvVar("SIGNUP_STATUS_IF_NEW".to_string(), e.to_string())
    })
}

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable. Blank values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a comma-separated list, trimming entries and dropping empty ones.
fn get_list_or_default(key: &str, default: &str) -> Vec<String> {
    split_list(&get_env_or_default(key, default))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the key from the Mailchimp account settings."
            ),
        ));
    }

    Ok(())
}
