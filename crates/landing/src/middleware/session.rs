//! Session middleware configuration.
//!
//! Signup progress lives in a bounded in-memory `tower-sessions` store. Moka
//! evicts each record once its expiry passes and drops the least recently
//! used ones past [`SESSION_CAPACITY`]. A visitor who comes back after a
//! restart simply starts the form again.

use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_moka_store::MokaStore;

use crate::config::LandingConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "sb_session";

/// Session expiry after inactivity (2 hours).
const SESSION_EXPIRY_SECONDS: i64 = 2 * 60 * 60;

/// Most sessions held at once.
pub const SESSION_CAPACITY: u64 = 100_000;

/// Session keys.
pub mod keys {
    /// Serialized `SignupMachine`.
    pub const SIGNUP: &str = "signup";
    /// Stable per-visitor ID used for the submission lock.
    pub const VISITOR_ID: &str = "visitor_id";
}

/// Create the session store.
#[must_use]
pub fn create_session_store() -> MokaStore {
    MokaStore::new(Some(SESSION_CAPACITY))
}

/// Create the session layer backed by [`create_session_store`].
#[must_use]
pub fn create_session_layer(config: &LandingConfig) -> SessionManagerLayer<MokaStore> {
    SessionManagerLayer::new(create_session_store())
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.is_secure())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}
