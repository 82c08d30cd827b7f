//! Lead capture for brokerage marketing forms.
//!
//! The crate exposes one parameterized submission flow (validation, consent
//! gating, bot mitigation, relay delivery) driven by per-form configuration,
//! plus the configuration, telemetry and error plumbing the API service uses.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
