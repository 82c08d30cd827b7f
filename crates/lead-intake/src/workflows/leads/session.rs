use std::collections::BTreeMap;

use tracing::debug;

use super::domain::{
    ConsentState, DeliveryReceipt, FormId, FormSchema, SubmissionField, SubmissionResult,
};
use super::service::SubmissionError;
use super::validation::validate;

/// Why a form instance refused to enter `Pending`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("a submission is already pending for this form")]
    AlreadyPending,
    #[error("form must be reset before submitting again (currently {state})")]
    NotReset { state: &'static str },
    #[error(transparent)]
    Rejected(SubmissionError),
}

/// Snapshot handed out by [`FormSession::begin`]. Results are only applied
/// back to the session that issued the ticket, and only if it has not been
/// reset or cleared since.
#[derive(Debug, Clone)]
pub struct SubmissionTicket {
    generation: u64,
    fields: Vec<SubmissionField>,
}

impl SubmissionTicket {
    pub fn fields(&self) -> &[SubmissionField] {
        &self.fields
    }
}

/// State of one mounted form: its values, consent and submission lifecycle.
#[derive(Debug, Clone)]
pub struct FormSession {
    form_id: FormId,
    fields: Vec<SubmissionField>,
    consent: ConsentState,
    state: SubmissionResult,
    generation: u64,
    last_error: Option<SubmissionError>,
}

impl FormSession {
    pub fn new(form_id: FormId, schema: &FormSchema) -> Self {
        Self {
            form_id,
            fields: schema.blank(),
            consent: ConsentState::withheld(),
            state: SubmissionResult::Idle,
            generation: 0,
            last_error: None,
        }
    }

    pub fn with_input(
        form_id: FormId,
        schema: &FormSchema,
        input: &BTreeMap<String, String>,
        consent: ConsentState,
    ) -> Self {
        Self {
            fields: schema.bind(input),
            consent,
            ..Self::new(form_id, schema)
        }
    }

    pub fn form_id(&self) -> &FormId {
        &self.form_id
    }

    pub fn fields(&self) -> &[SubmissionField] {
        &self.fields
    }

    pub fn values(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .map(|field| (field.name.clone(), field.value.clone()))
            .collect()
    }

    /// Update a field value. Returns `false` for names outside the schema.
    pub fn set_value(&mut self, name: &str, value: impl Into<String>) -> bool {
        match self.fields.iter_mut().find(|field| field.name == name) {
            Some(field) => {
                field.value = value.into();
                true
            }
            None => false,
        }
    }

    pub fn consent(&self) -> ConsentState {
        self.consent
    }

    pub fn set_consent(&mut self, consent: ConsentState) {
        self.consent = consent;
    }

    pub fn state(&self) -> &SubmissionResult {
        &self.state
    }

    /// Detail behind the most recent refusal or failure, if any.
    pub fn last_error(&self) -> Option<&SubmissionError> {
        self.last_error.as_ref()
    }

    /// Move `Idle -> Pending` once every field validates and consent is given.
    pub fn begin(&mut self) -> Result<SubmissionTicket, SessionError> {
        match self.state {
            SubmissionResult::Idle => {}
            SubmissionResult::Pending => return Err(SessionError::AlreadyPending),
            ref other => {
                return Err(SessionError::NotReset {
                    state: other.label(),
                })
            }
        }

        if let Err(report) = validate(&self.fields) {
            return Err(self.refuse(SubmissionError::Validation(report)));
        }
        if !self.consent.is_granted() {
            return Err(self.refuse(SubmissionError::ConsentRequired));
        }

        self.last_error = None;
        self.state = SubmissionResult::Pending;
        Ok(SubmissionTicket {
            generation: self.generation,
            fields: self.fields.clone(),
        })
    }

    fn refuse(&mut self, error: SubmissionError) -> SessionError {
        self.last_error = Some(error.clone());
        SessionError::Rejected(error)
    }

    /// Apply the outcome of the ticket's delivery. Returns `None` and leaves
    /// the session untouched when the ticket is stale.
    pub fn complete(
        &mut self,
        ticket: SubmissionTicket,
        outcome: Result<DeliveryReceipt, SubmissionError>,
    ) -> Option<SubmissionResult> {
        if ticket.generation != self.generation || self.state != SubmissionResult::Pending {
            debug!(form = %self.form_id, "discarding stale submission result");
            return None;
        }

        match outcome {
            Ok(_) => {
                self.clear_values();
                self.state = SubmissionResult::Success;
            }
            Err(error) => {
                self.state = SubmissionResult::Failure(error.user_message());
                self.last_error = Some(error);
            }
        }
        Some(self.state.clone())
    }

    /// Return to `Idle` keeping the entered values (e.g. popup reopened).
    pub fn reset(&mut self) {
        self.generation += 1;
        self.state = SubmissionResult::Idle;
        self.last_error = None;
    }

    /// Return to `Idle` with blank values and consent withdrawn.
    pub fn clear(&mut self) {
        self.reset();
        self.clear_values();
    }

    fn clear_values(&mut self) {
        for field in &mut self.fields {
            field.value.clear();
        }
        self.consent = ConsentState::withheld();
    }
}
