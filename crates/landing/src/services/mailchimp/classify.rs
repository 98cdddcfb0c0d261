//! Classification of Mailchimp failures into a closed set of kinds.
//!
//! Structured data wins: the problem-details `title` first, then the HTTP
//! status. Only when neither is conclusive does the free-text `detail` get
//! searched for known phrases. Retry decisions look at [`RejectionKind`]
//! alone, so the heuristics here can change without touching the upsert logic.

use core::fmt;

use serde::Serialize;
use thiserror::Error;

use super::types::ErrorBody;

/// What went wrong on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// Member is unsubscribed, cleaned or forgotten; only `pending` may re-add it.
    Compliance,
    /// Bad or revoked API key.
    Unauthorized,
    /// Payload rejected (bad merge field, fake-looking address, ...).
    InvalidResource,
    /// Audience or member does not exist.
    NotFound,
    RateLimited,
    Timeout,
    /// Connection failed before a response arrived.
    Transport,
    Other,
}

impl RejectionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Compliance => "compliance",
            Self::Unauthorized => "unauthorized",
            Self::InvalidResource => "invalid_resource",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::Other => "other",
        }
    }

    /// True if the same request may succeed when the visitor tries again.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout | Self::Transport)
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed Mailchimp call, already classified.
#[derive(Debug, Clone, Error)]
#[error("mailchimp {kind} ({}): {detail}", .status.map_or_else(|| "no response".to_string(), |s| s.to_string()))]
pub struct RemoteError {
    pub kind: RejectionKind,
    /// HTTP status, `None` when no response arrived.
    pub status: Option<u16>,
    /// Remote detail text. Logged, never shown to visitors.
    pub detail: String,
}

impl RemoteError {
    /// Classify an error response.
    #[must_use]
    pub fn from_response(status: u16, body: &ErrorBody) -> Self {
        let detail = if body.detail.is_empty() {
            body.title.clone()
        } else {
            body.detail.clone()
        };
        Self {
            kind: classify(status, body),
            status: Some(status),
            detail,
        }
    }

    #[must_use]
    pub fn transport(kind: RejectionKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            detail: detail.into(),
        }
    }
}

/// Map an error response to a [`RejectionKind`].
#[must_use]
pub fn classify(status: u16, body: &ErrorBody) -> RejectionKind {
    from_title(&body.title)
        .or_else(|| from_status(status))
        .unwrap_or_else(|| from_detail(&body.detail, status))
}

fn from_title(title: &str) -> Option<RejectionKind> {
    match title.trim().to_ascii_lowercase().as_str() {
        "member in compliance state" | "forgotten email not subscribed" => {
            Some(RejectionKind::Compliance)
        }
        "api key invalid" | "api key missing" | "user disabled" => Some(RejectionKind::Unauthorized),
        "resource not found" => Some(RejectionKind::NotFound),
        "too many requests" => Some(RejectionKind::RateLimited),
        // "Invalid Resource" and "Bad Request" cover compliance and payload
        // problems alike; the detail decides.
        _ => None,
    }
}

const fn from_status(status: u16) -> Option<RejectionKind> {
    match status {
        401 | 403 => Some(RejectionKind::Unauthorized),
        404 => Some(RejectionKind::NotFound),
        429 => Some(RejectionKind::RateLimited),
        _ => None,
    }
}

fn from_detail(detail: &str, status: u16) -> RejectionKind {
    let detail = detail.to_lowercase();
    if ["compliance", "resubscribe", "pending"]
        .iter()
        .any(|needle| detail.contains(needle))
    {
        RejectionKind::Compliance
    } else if detail.contains("api key") {
        RejectionKind::Unauthorized
    } else if status == 400 {
        RejectionKind::InvalidResource
    } else {
        RejectionKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(title: &str, detail: &str) -> ErrorBody {
        ErrorBody {
            title: title.to_string(),
            detail: detail.to_string(),
            ..ErrorBody::default()
        }
    }

    #[test]
    fn test_structured_title_wins() {
        assert_eq!(
            classify(400, &body("Member In Compliance State", "whatever")),
            RejectionKind::Compliance
        );
        assert_eq!(
            classify(400, &body("Forgotten Email Not Subscribed", "")),
            RejectionKind::Compliance
        );
        assert_eq!(
            classify(401, &body("API Key Invalid", "Your API key may be invalid")),
            RejectionKind::Unauthorized
        );
    }

    #[test]
    fn test_status_before_heuristics() {
        assert_eq!(classify(401, &body("", "pending")), RejectionKind::Unauthorized);
        assert_eq!(classify(404, &body("", "")), RejectionKind::NotFound);
        assert_eq!(classify(429, &body("", "")), RejectionKind::RateLimited);
    }

    #[test]
    fn test_detail_heuristics_case_insensitive() {
        assert_eq!(
            classify(400, &body("Invalid Resource", "Please RESUBSCRIBE via the form")),
            RejectionKind::Compliance
        );
        assert_eq!(
            classify(400, &body("Invalid Resource", "Member is PENDING")),
            RejectionKind::Compliance
        );
        assert_eq!(
            classify(500, &body("", "Invalid API key")),
            RejectionKind::Unauthorized
        );
        assert_eq!(
            classify(400, &body("Invalid Resource", "fake or invalid")),
            RejectionKind::InvalidResource
        );
        assert_eq!(classify(503, &body("", "")), RejectionKind::Other);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(RejectionKind::Timeout.is_retryable());
        assert!(RejectionKind::Transport.is_retryable());
        assert!(!RejectionKind::Compliance.is_retryable());
        assert!(!RejectionKind::Unauthorized.is_retryable());
    }

    #[test]
    fn test_from_response_falls_back_to_title() {
        let err = RemoteError::from_response(404, &body("Resource Not Found", ""));
        assert_eq!(err.kind, RejectionKind::NotFound);
        assert_eq!(err.detail, "Resource Not Found");
        assert_eq!(err.status, Some(404));
    }
}
