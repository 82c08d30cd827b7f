use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Stable identifier for a configured form (e.g. `contact`, `newsletter_popup`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormId(pub String);

impl fmt::Display for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Value check applied to a non-empty field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FieldRule {
    Email,
    Phone,
    MaxLength { limit: usize },
    OneOf { values: Vec<String> },
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
    })
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\+?[0-9][0-9 ()\-]{5,19}$").expect("phone pattern compiles")
    })
}

impl FieldRule {
    /// Returns the user-facing message when `value` violates the rule.
    pub fn check(&self, value: &str) -> Result<(), String> {
        match self {
            FieldRule::Email => {
                if email_pattern().is_match(value) {
                    Ok(())
                } else {
                    Err("must be a valid email address".to_string())
                }
            }
            FieldRule::Phone => {
                if phone_pattern().is_match(value) {
                    Ok(())
                } else {
                    Err("must be a valid phone number".to_string())
                }
            }
            FieldRule::MaxLength { limit } => {
                if value.chars().count() <= *limit {
                    Ok(())
                } else {
                    Err(format!("must be at most {limit} characters"))
                }
            }
            FieldRule::OneOf { values } => {
                if values.iter().any(|allowed| allowed == value) {
                    Ok(())
                } else {
                    Err(format!("must be one of: {}", values.join(", ")))
                }
            }
        }
    }
}

/// A user-entered value paired with the rules it must satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionField {
    pub name: String,
    pub value: String,
    pub required: bool,
    pub rules: Vec<FieldRule>,
}

impl SubmissionField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            required: false,
            rules: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_rule(mut self, rule: FieldRule) -> Self {
        self.rules.push(rule);
        self
    }
}

/// Declarative description of one form input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<FieldRule>,
}

impl FieldSpec {
    pub fn optional(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            required: false,
            rules: Vec::new(),
        }
    }

    pub fn required(name: &str, label: &str) -> Self {
        Self {
            required: true,
            ..Self::optional(name, label)
        }
    }

    pub fn with_rule(mut self, rule: FieldRule) -> Self {
        self.rules.push(rule);
        self
    }
}

/// Ordered field list for a form.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FormSchema {
    pub fields: Vec<FieldSpec>,
}

impl FormSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Bind raw input to the schema. Keys outside the schema are ignored and
    /// missing keys become empty values.
    pub fn bind(&self, input: &BTreeMap<String, String>) -> Vec<SubmissionField> {
        self.fields
            .iter()
            .map(|spec| SubmissionField {
                name: spec.name.clone(),
                value: input.get(&spec.name).cloned().unwrap_or_default(),
                required: spec.required,
                rules: spec.rules.clone(),
            })
            .collect()
    }

    pub fn blank(&self) -> Vec<SubmissionField> {
        self.bind(&BTreeMap::new())
    }
}

/// Explicit opt-in from the user. Never granted by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsentState(bool);

impl ConsentState {
    pub fn granted() -> Self {
        Self(true)
    }

    pub fn withheld() -> Self {
        Self(false)
    }

    pub fn is_granted(self) -> bool {
        self.0
    }
}

impl From<bool> for ConsentState {
    fn from(value: bool) -> Self {
        Self(value)
    }
}

/// Field values plus the metadata a relay needs to route the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionPayload {
    pub fields: Vec<(String, String)>,
    pub recipient: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mitigation_token: Option<String>,
}

impl SubmissionPayload {
    /// Build a payload from validated fields, trimming each value.
    pub fn from_fields(
        fields: &[SubmissionField],
        recipient: impl Into<String>,
        source: impl Into<String>,
        mitigation_token: Option<String>,
    ) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|field| (field.name.clone(), field.value.trim().to_string()))
                .collect(),
            recipient: recipient.into(),
            source: source.into(),
            mitigation_token,
        }
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// What the relay handed back for an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Lifecycle of a single form instance's submission.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SubmissionResult {
    #[default]
    Idle,
    Pending,
    Success,
    Failure(String),
}

impl SubmissionResult {
    pub fn label(&self) -> &'static str {
        match self {
            SubmissionResult::Idle => "idle",
            SubmissionResult::Pending => "pending",
            SubmissionResult::Success => "success",
            SubmissionResult::Failure(_) => "failure",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionResult::Success | SubmissionResult::Failure(_))
    }
}
