//! Sweepstakes ticket codes.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`TicketCode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TicketCodeError {
    #[error("ticket code must be exactly {expected} characters")]
    WrongLength { expected: usize },
    #[error("ticket code may only contain A-Z and 0-9")]
    InvalidCharacter,
}

/// An 8-character golden ticket code (`[A-Z0-9]{8}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TicketCode(String);

impl TicketCode {
    /// Required code length.
    pub const LENGTH: usize = 8;

    /// Parse a ticket code. Lowercase letters are rejected, not folded.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is not exactly 8 uppercase alphanumerics.
    pub fn parse(s: &str) -> Result<Self, TicketCodeError> {
        if s.len() != Self::LENGTH {
            return Err(TicketCodeError::WrongLength {
                expected: Self::LENGTH,
            });
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        {
            return Err(TicketCodeError::InvalidCharacter);
        }
        Ok(Self(s.to_owned()))
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First three characters, used for batch tagging.
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.0.get(..3).unwrap_or(&self.0)
    }
}

impl fmt::Display for TicketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TicketCode {
    type Error = TicketCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TicketCode> for String {
    fn from(code: TicketCode) -> Self {
        code.0
    }
}
