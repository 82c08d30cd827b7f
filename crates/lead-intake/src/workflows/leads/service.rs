use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use super::catalog::{ConfirmationTemplate, FormCatalog, FormDefinition};
use super::domain::{DeliveryReceipt, SubmissionPayload, SubmissionResult};
use super::flags::{FlagStoreError, OneTimeFlagStore};
use super::mitigation::{request_mitigation_token, MitigationError, MitigationProvider};
use super::notify::{Notification, NotificationSink};
use super::relay::{relay_message, RelayError, RelayTransport};
use super::repository::{LedgerError, RecordedOutcome, SubmissionLedger, SubmissionRecord};
use super::session::{FormSession, SessionError, SubmissionTicket};
use super::validation::ValidationReport;

const GENERIC_RELAY_FAILURE: &str =
    "There was a problem submitting your request. Please try again.";

/// Every way a single submission attempt can fail. All are recoverable by
/// the user; none leave the form unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("validation failed: {0}")]
    Validation(ValidationReport),
    #[error("consent is required before submitting")]
    ConsentRequired,
    #[error("bot mitigation provider was not ready after {waited_ms} ms")]
    MitigationUnavailable { waited_ms: u64 },
    #[error("bot mitigation rejected: {0}")]
    MitigationRejected(String),
    #[error("network failure: {0}")]
    NetworkFailure(String),
    #[error("relay rejected the submission with status {status}")]
    RelayRejected { status: u16, body: String },
}

impl SubmissionError {
    pub fn kind(&self) -> &'static str {
        match self {
            SubmissionError::Validation(_) => "validation",
            SubmissionError::ConsentRequired => "consent_required",
            SubmissionError::MitigationUnavailable { .. } => "mitigation_unavailable",
            SubmissionError::MitigationRejected(_) => "mitigation_rejected",
            SubmissionError::NetworkFailure(_) => "network_failure",
            SubmissionError::RelayRejected { .. } => "relay_rejected",
        }
    }

    /// Errors resolved before anything leaves the process.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            SubmissionError::Validation(_) | SubmissionError::ConsentRequired
        )
    }

    pub fn notification(&self) -> Notification {
        match self {
            SubmissionError::Validation(report) if report.has_missing_fields() => {
                Notification::error("Form Incomplete", "Please fill in all required fields.")
            }
            SubmissionError::Validation(report) => {
                Notification::error("Check Your Details", report.to_string())
            }
            SubmissionError::ConsentRequired => Notification::error(
                "Consent Required",
                "Please agree to be contacted before submitting.",
            ),
            SubmissionError::MitigationUnavailable { .. } => Notification::error(
                "Verification Unavailable",
                "We could not verify your request. Please reload the page and try again.",
            ),
            SubmissionError::MitigationRejected(_) => Notification::error(
                "Verification Failed",
                "We could not verify that you are human. Please try again.",
            ),
            SubmissionError::NetworkFailure(_) => Notification::error(
                "Error",
                "Submission failed. Please check your internet connection.",
            ),
            SubmissionError::RelayRejected { body, .. } => Notification::error(
                "Error",
                relay_message(body).unwrap_or_else(|| GENERIC_RELAY_FAILURE.to_string()),
            ),
        }
    }

    pub fn user_message(&self) -> String {
        self.notification().description
    }
}

impl From<MitigationError> for SubmissionError {
    fn from(value: MitigationError) -> Self {
        match value {
            MitigationError::Unavailable { waited_ms } => Self::MitigationUnavailable { waited_ms },
            MitigationError::Rejected(reason) => Self::MitigationRejected(reason),
        }
    }
}

impl From<RelayError> for SubmissionError {
    fn from(value: RelayError) -> Self {
        match value {
            RelayError::Rejected { status, body } => Self::RelayRejected { status, body },
            RelayError::Network(reason) | RelayError::Client(reason) => {
                Self::NetworkFailure(reason)
            }
        }
    }
}

/// Site key and readiness bound for the bot-mitigation provider.
#[derive(Debug, Clone)]
pub struct MitigationSettings {
    pub site_key: String,
    pub ready_timeout: Duration,
}

/// Runs lead submissions for every form in the catalog.
pub struct LeadSubmissionService<T, F, L> {
    catalog: Arc<FormCatalog>,
    relay: Arc<T>,
    flags: Arc<F>,
    ledger: Arc<L>,
    notifications: Arc<dyn NotificationSink>,
    mitigation: MitigationSettings,
}

impl<T, F, L> LeadSubmissionService<T, F, L>
where
    T: RelayTransport + 'static,
    F: OneTimeFlagStore + 'static,
    L: SubmissionLedger + 'static,
{
    pub fn new(
        catalog: Arc<FormCatalog>,
        relay: Arc<T>,
        flags: Arc<F>,
        ledger: Arc<L>,
        notifications: Arc<dyn NotificationSink>,
        mitigation: MitigationSettings,
    ) -> Self {
        Self {
            catalog,
            relay,
            flags,
            ledger,
            notifications,
            mitigation,
        }
    }

    pub fn catalog(&self) -> &FormCatalog {
        &self.catalog
    }

    pub fn form(&self, form_id: &str) -> Option<&FormDefinition> {
        self.catalog.get(form_id)
    }

    /// Validate, gate on consent, fetch a token when the endpoint needs one,
    /// deliver, and settle the session. Produces one terminal result.
    ///
    /// Invoking this on a session that already finished counts as the user's
    /// explicit retry and resets it first; the entered values are kept.
    pub async fn run_submission(
        &self,
        form: &FormDefinition,
        session: &mut FormSession,
        mitigation: &dyn MitigationProvider,
        device_id: Option<&str>,
    ) -> SubmissionResult {
        if session.state().is_terminal() {
            session.reset();
        }

        let ticket = match session.begin() {
            Ok(ticket) => ticket,
            Err(SessionError::Rejected(error)) => {
                info!(form = %form.id, kind = error.kind(), "lead submission refused");
                let reason = error.user_message();
                self.notifications.notify(error.notification());
                return SubmissionResult::Failure(reason);
            }
            Err(error) => {
                warn!(form = %form.id, %error, "ignoring duplicate submit");
                return session.state().clone();
            }
        };

        info!(form = %form.id, source = %form.source, "lead submission pending");
        let outcome = self.deliver(form, &ticket, mitigation).await;
        self.settle(form, session, ticket, outcome, device_id)
    }

    /// The network half of a submission: token fetch, relay delivery, and
    /// the optional confirmation mail. Never touches session state.
    pub async fn deliver(
        &self,
        form: &FormDefinition,
        ticket: &SubmissionTicket,
        mitigation: &dyn MitigationProvider,
    ) -> Result<DeliveryReceipt, SubmissionError> {
        let token = if form.endpoint.requires_mitigation() {
            let token = request_mitigation_token(
                mitigation,
                &self.mitigation.site_key,
                &form.mitigation_action,
                self.mitigation.ready_timeout,
            )
            .await?;
            Some(token)
        } else {
            None
        };

        let payload =
            SubmissionPayload::from_fields(ticket.fields(), &form.recipient, &form.source, token);
        let receipt = self.relay.deliver(&payload, &form.endpoint).await?;

        if let Some(template) = &form.confirmation {
            self.send_confirmation(form, template, &payload).await;
        }

        Ok(receipt)
    }

    /// Apply a delivery outcome to the session that produced `ticket`.
    ///
    /// A stale ticket (session reset or cleared meanwhile) is still written to
    /// the ledger but never flips the session or notifies the user.
    pub fn settle(
        &self,
        form: &FormDefinition,
        session: &mut FormSession,
        ticket: SubmissionTicket,
        outcome: Result<DeliveryReceipt, SubmissionError>,
        device_id: Option<&str>,
    ) -> SubmissionResult {
        self.record(form, &ticket, &outcome);

        let notification = match &outcome {
            Ok(_) => form.success.clone(),
            Err(error) => error.notification(),
        };
        let delivered = outcome.is_ok();

        match session.complete(ticket, outcome) {
            Some(result) => {
                info!(form = %form.id, outcome = result.label(), "lead submission settled");
                if delivered {
                    self.mark_seen(form, device_id);
                }
                self.notifications.notify(notification);
                result
            }
            None => session.state().clone(),
        }
    }

    /// Whether the form's one-time prompt should still be shown on `device_id`.
    pub fn should_prompt(
        &self,
        form: &FormDefinition,
        device_id: &str,
    ) -> Result<bool, FlagStoreError> {
        match &form.one_time_flag {
            Some(key) => Ok(!self.flags.is_set(device_id, key)?),
            None => Ok(false),
        }
    }

    /// Record that the prompt was dismissed without subscribing.
    pub fn dismiss_prompt(
        &self,
        form: &FormDefinition,
        device_id: &str,
    ) -> Result<(), FlagStoreError> {
        if let Some(key) = &form.one_time_flag {
            self.flags.set(device_id, key)?;
        }
        Ok(())
    }

    pub fn recent_submissions(&self, limit: usize) -> Result<Vec<SubmissionRecord>, LedgerError> {
        self.ledger.recent(limit)
    }

    fn mark_seen(&self, form: &FormDefinition, device_id: Option<&str>) {
        let device_id = device_id.map(str::trim).filter(|id| !id.is_empty());
        let (Some(key), Some(device_id)) = (&form.one_time_flag, device_id) else {
            return;
        };
        if let Err(err) = self.flags.set(device_id, key) {
            warn!(form = %form.id, error = %err, "failed to persist one-time flag");
        }
    }

    async fn send_confirmation(
        &self,
        form: &FormDefinition,
        template: &ConfirmationTemplate,
        submitted: &SubmissionPayload,
    ) {
        let Some(address) = submitted.value(&template.address_field) else {
            warn!(form = %form.id, "confirmation skipped: address field absent");
            return;
        };

        let confirmation = SubmissionPayload {
            fields: vec![
                ("subject".to_string(), template.subject.clone()),
                ("message".to_string(), template.body.clone()),
            ],
            recipient: address.to_string(),
            source: form.source.clone(),
            mitigation_token: None,
        };

        // the lead is already delivered; a lost acknowledgement is only logged
        if let Err(err) = self.relay.deliver(&confirmation, &template.endpoint).await {
            warn!(form = %form.id, error = %err, "confirmation delivery failed");
        }
    }

    fn record(
        &self,
        form: &FormDefinition,
        ticket: &SubmissionTicket,
        outcome: &Result<DeliveryReceipt, SubmissionError>,
    ) {
        let outcome = match outcome {
            Ok(receipt) => RecordedOutcome::Delivered {
                reference: receipt.reference.clone(),
            },
            Err(error) => RecordedOutcome::Failed {
                reason: error.to_string(),
            },
        };

        let record = SubmissionRecord {
            id: Uuid::new_v4(),
            form_id: form.id.clone(),
            source: form.source.clone(),
            outcome,
            recorded_at: Utc::now(),
            fields: ticket
                .fields()
                .iter()
                .map(|field| (field.name.clone(), field.value.trim().to_string()))
                .collect(),
        };

        if let Err(err) = self.ledger.record(record) {
            warn!(form = %form.id, error = %err, "failed to record submission");
        }
    }
}
