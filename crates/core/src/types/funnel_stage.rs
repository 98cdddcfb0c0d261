//! Funnel stages.

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A checkpoint in the visitor's linear progression toward conversion.
///
/// Stages are ordered; the declaration order is the funnel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    #[default]
    Landing,
    Interest,
    EmailCapture,
    Conversion,
}

impl FunnelStage {
    /// All stages in funnel order.
    pub const ALL: [Self; 4] = [
        Self::Landing,
        Self::Interest,
        Self::EmailCapture,
        Self::Conversion,
    ];

    /// Zero-based position in the funnel.
    #[must_use]
    pub const fn ordinal(self) -> usize {
        match self {
            Self::Landing => 0,
            Self::Interest => 1,
            Self::EmailCapture => 2,
            Self::Conversion => 3,
        }
    }

    /// One-based step number reported to analytics.
    #[must_use]
    pub const fn step_number(self) -> usize {
        self.ordinal() + 1
    }

    /// Wire name of the stage (also the cookie value).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Landing => "landing",
            Self::Interest => "interest",
            Self::EmailCapture => "email_capture",
            Self::Conversion => "conversion",
        }
    }
}

impl fmt::Display for FunnelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for a stage name outside the funnel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown funnel stage: {0}")]
pub struct UnknownStage(pub String);

impl FromStr for FunnelStage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}
