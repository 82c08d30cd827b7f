use std::fmt;

use serde::{Deserialize, Serialize};

use super::domain::SubmissionField;

/// A single field that blocks submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldError {
    #[error("{field} is required")]
    MissingField { field: String },
    #[error("{field} {message}")]
    InvalidField { field: String, message: String },
}

impl FieldError {
    pub fn field(&self) -> &str {
        match self {
            FieldError::MissingField { field } | FieldError::InvalidField { field, .. } => field,
        }
    }
}

/// Every field error found in one pass, in field order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationReport {
    errors: Vec<FieldError>,
}

impl ValidationReport {
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn names(&self, field: &str) -> bool {
        self.errors.iter().any(|error| error.field() == field)
    }

    pub fn has_missing_fields(&self) -> bool {
        self.errors
            .iter()
            .any(|error| matches!(error, FieldError::MissingField { .. }))
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        write!(f, "{}", messages.join("; "))
    }
}

/// Check required fields and per-field rules, collecting every failure.
///
/// A required field that is blank after trimming reports `MissingField` and
/// skips its rules. Optional blank fields are not checked at all.
pub fn validate(fields: &[SubmissionField]) -> Result<(), ValidationReport> {
    let mut errors = Vec::new();

    for field in fields {
        let value = field.value.trim();
        if value.is_empty() {
            if field.required {
                errors.push(FieldError::MissingField {
                    field: field.name.clone(),
                });
            }
            continue;
        }

        // first failing rule wins so each field reports at most once
        if let Some(message) = field.rules.iter().find_map(|rule| rule.check(value).err()) {
            errors.push(FieldError::InvalidField {
                field: field.name.clone(),
                message,
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationReport { errors })
    }
}
