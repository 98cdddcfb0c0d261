//! Email address type.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::id::SubscriberHash;

/// Errors that can occur when parsing an [`Email`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    /// The input string is empty.
    #[error("email cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("email must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains whitespace after trimming.
    #[error("email cannot contain whitespace")]
    ContainsWhitespace,
    /// The input does not contain an @ symbol.
    #[error("email must contain an @ symbol")]
    MissingAtSymbol,
    /// The local part (before @) is empty.
    #[error("email local part cannot be empty")]
    EmptyLocalPart,
    /// The domain part (after @) is empty.
    #[error("email domain cannot be empty")]
    EmptyDomain,
    /// The domain has no dot separating a name and a top-level part.
    #[error("email domain must contain a dot")]
    InvalidDomain,
}

/// An email address, the identity of a visitor on the mailing list.
///
/// Parsing accepts what the signup forms accept: one run of non-whitespace
/// characters shaped like `local@domain.tld` (the `^\S+@\S+\.\S+$` rule).
/// Surrounding whitespace is trimmed. The original casing is kept, but the
/// identity used for remote calls is case-insensitive, see
/// [`Email::subscriber_hash`].
///
/// ## Examples
///
/// ```
/// use sweetbox_core::Email;
///
/// assert!(Email::parse("a@b.com").is_ok());
/// assert!(Email::parse("  Lena@Example.de ").is_ok());
///
/// assert!(Email::parse("bad").is_err());
/// assert!(Email::parse("user@domain").is_err());
/// assert!(Email::parse("us er@domain.com").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Maximum length of an email address (RFC 5321).
    pub const MAX_LENGTH: usize = 254;

    /// Parse an `Email` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed input:
    /// - Is empty or longer than 254 characters
    /// - Contains whitespace
    /// - Has no @ symbol, an empty local part, or a domain without a dot
    pub fn parse(s: &str) -> Result<Self, EmailError> {
        let s = s.trim();

        if s.is_empty() {
            return Err(EmailError::Empty);
        }

        if s.len() > Self::MAX_LENGTH {
            return Err(EmailError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        if s.chars().any(char::is_whitespace) {
            return Err(EmailError::ContainsWhitespace);
        }

        let mut last_error = EmailError::MissingAtSymbol;

        for (at_pos, _) in s.match_indices('@') {
            if at_pos == 0 {
                last_error = EmailError::EmptyLocalPart;
                continue;
            }
            let domain = &s[at_pos + 1..];
            if domain.is_empty() {
                last_error = EmailError::EmptyDomain;
                continue;
            }
            if has_inner_dot(domain) {
                return Ok(Self(s.to_owned()));
            }
            last_error = EmailError::InvalidDomain;
        }

        Err(last_error)
    }

    /// Returns the email address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `Email` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Returns the address in the lowercase form used for identity.
    #[must_use]
    pub fn normalized(&self) -> String {
        self.0.to_lowercase()
    }

    /// Returns true if both addresses name the same mailing list member.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }

    /// The deterministic key of this address on the remote list.
    #[must_use]
    pub fn subscriber_hash(&self) -> SubscriberHash {
        SubscriberHash::of(self)
    }

    /// Returns the domain part of the email (after the last @).
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.rsplit('@').next().unwrap_or("")
    }
}

/// True if `domain` has a `.` with at least one character on each side.
fn has_inner_dot(domain: &str) -> bool {
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Email {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Email {
    type Error = EmailError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
