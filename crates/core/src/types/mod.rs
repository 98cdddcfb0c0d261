//! Core types for Sweetbox.
//!
//! This module provides type-safe wrappers for the lead capture domain.

pub mod email;
pub mod funnel_stage;
pub mod id;
pub mod profile;
pub mod status;
pub mod ticket;

pub use email::{Email, EmailError};
pub use funnel_stage::{FunnelStage, UnknownStage};
pub use id::SubscriberHash;
pub use profile::{
    Attribution, PostalAddress, ProfileDefaults, ProfileDraft, ProfileError, ProfileField,
    VisitorProfile,
};
pub use status::*;
pub use ticket::{TicketCode, TicketCodeError};
