//! Remote identity keys.

use core::fmt;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use super::email::Email;

/// Deterministic key of a member on the remote mailing list.
///
/// The lowercase hex MD5 of the lowercased email address. Two calls for the
/// same address in any casing always address the same remote record, which
/// makes this the idempotency key of every upsert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberHash(String);

impl SubscriberHash {
    /// Compute the hash for an email address.
    #[must_use]
    pub fn of(email: &Email) -> Self {
        let digest = Md5::digest(email.normalized().as_bytes());
        Self(hex::encode(digest))
    }

    /// Returns the hash as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SubscriberHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_md5_of_lowercase() {
        let email = Email::parse("Urist.McVankab@freddiesjokes.com").unwrap();
        // Reference value from the Mailchimp API docs for this address.
        assert_eq!(
            email.subscriber_hash().as_str(),
            "62eeb292278cc15f5817cb78f7790b08"
        );
    }

    #[test]
    fn test_hash_is_stable_across_case() {
        let lower = Email::parse("a@b.com").unwrap();
        let upper = Email::parse("A@B.COM").unwrap();
        assert_eq!(SubscriberHash::of(&lower), SubscriberHash::of(&upper));
        assert_eq!(lower.subscriber_hash().as_str().len(), 32);
    }
}
