use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::domain::FormId;

/// Terminal outcome of a delivery attempt as kept in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordedOutcome {
    Delivered {
        #[serde(skip_serializing_if = "Option::is_none")]
        reference: Option<String>,
    },
    Failed {
        reason: String,
    },
}

/// Ledger entry for one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: Uuid,
    pub form_id: FormId,
    pub source: String,
    pub outcome: RecordedOutcome,
    pub recorded_at: DateTime<Utc>,
    pub fields: Vec<(String, String)>,
}

/// Storage abstraction for submission history shown to admins.
pub trait SubmissionLedger: Send + Sync {
    fn record(&self, record: SubmissionRecord) -> Result<(), LedgerError>;
    /// Most recent first.
    fn recent(&self, limit: usize) -> Result<Vec<SubmissionRecord>, LedgerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}
