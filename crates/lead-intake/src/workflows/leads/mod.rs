//! Lead submission flow shared by every capture form on the site.
//!
//! A form is described once in the [`catalog`]; the [`service`] then runs the
//! same sequence for all of them: validate every field, require consent, fetch
//! a fresh bot-mitigation token when the relay demands one, deliver to the
//! relay, and settle the [`session`] into exactly one terminal state.

pub mod access;
pub mod catalog;
pub mod domain;
pub mod flags;
pub mod mitigation;
pub mod notify;
pub mod relay;
pub mod repository;
pub mod router;
pub mod service;
pub mod session;
pub mod validation;

#[cfg(test)]
mod tests;

pub use access::{AccessDecision, AccessGate, AllowListGate, Role, Session};
pub use catalog::{ConfirmationTemplate, FormCatalog, FormDefinition, FormView};
pub use domain::{
    ConsentState, DeliveryReceipt, FieldRule, FieldSpec, FormId, FormSchema, SubmissionField,
    SubmissionPayload, SubmissionResult,
};
pub use flags::{FlagStoreError, JsonFileFlagStore, OneTimeFlagStore};
pub use mitigation::{
    request_mitigation_token, ClientTokenProvider, MitigationError, MitigationProvider,
};
pub use notify::{Notification, NotificationSink, Severity, TracingNotificationSink};
pub use relay::{
    encode_payload, HttpRelay, MitigationPolicy, PayloadEncoding, RelayBody, RelayEndpoint,
    RelayEnvelope, RelayError, RelayTransport,
};
pub use repository::{LedgerError, RecordedOutcome, SubmissionLedger, SubmissionRecord};
pub use router::{lead_router, LeadApi};
pub use service::{LeadSubmissionService, MitigationSettings, SubmissionError};
pub use session::{FormSession, SessionError, SubmissionTicket};
pub use validation::{validate, FieldError, ValidationReport};
