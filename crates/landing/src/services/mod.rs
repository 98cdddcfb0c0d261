//! Business logic services for the landing service.
//!
//! # Services
//!
//! - `mailchimp` - Mailchimp Marketing API client and error classification
//! - `upsert` - Idempotent member upsert, tagging and compliance fallback
//! - `events` - Analytics event sink backed by `tracing` and Sentry

pub mod events;
pub mod mailchimp;
pub mod upsert;

pub use events::TracingEventSink;
pub use mailchimp::{MailchimpClient, MailchimpError, MailingList, RejectionKind, RemoteError};
pub use upsert::{Campaign, UpsertError, UpsertOutcome, UpsertPolicy, UpsertRequest, UpsertService};
