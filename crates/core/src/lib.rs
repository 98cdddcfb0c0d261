//! Sweetbox Core - lead capture domain library.
//!
//! This crate provides the types and state machines shared by the Sweetbox
//! landing service and its tests:
//! - `landing` - HTTP service fronting the mailing list
//! - `integration-tests` - end-to-end router tests
//!
//! # Architecture
//!
//! The core crate contains only types, traits and pure state machines - no
//! HTTP, no cookies, no mailing list client. Everything with side effects is
//! reached through a trait seam ([`EventSink`], [`StageStore`],
//! [`LeadCapture`]) so the logic is testable without a browser or network.
//!
//! # Modules
//!
//! - [`types`] - Newtypes for emails, subscriber hashes, funnel stages, profiles
//! - [`events`] - Analytics event sink seam
//! - [`funnel`] - Monotonic funnel stage tracker
//! - [`signup`] - Parameterized multi-step signup state machine

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod events;
pub mod funnel;
pub mod signup;
pub mod types;

pub use events::{EventParams, EventSink};
pub use funnel::{FUNNEL_TTL, FunnelTracker, StageStore};
pub use signup::{
    CaptureReceipt, FlowDefinition, LeadCapture, SignupError, SignupMachine, StepDescriptor,
    StepInput, SubmissionGuard, SubmissionLock, Transition, ValidationError,
};
pub use types::*;
