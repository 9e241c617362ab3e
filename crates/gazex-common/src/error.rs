use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Run-fatal and query-level failures.
///
/// Per-record problems never appear here: a bad row becomes a
/// [`RejectedRow`] and the stream continues. Only structural failure of
/// the payload or the store itself aborts a run.
#[derive(Debug, Error)]
pub enum GazexError {
    #[error("payload fetch failed: {0}")]
    Fetch(String),

    #[error("structural parse failure: {0}")]
    StructuralParse(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("source {source_name} timed out after {timeout_ms}ms")]
    Timeout { source_name: String, timeout_ms: u64 },

    #[error("import cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GazexError>;

/// Why a single record was rejected by an adapter or the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingRequiredField,
    UnparsableNumeric,
    MalformedStructure,
    ConstraintViolation,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingRequiredField => "missing_required_field",
            RejectReason::UnparsableNumeric    => "unparsable_numeric",
            RejectReason::MalformedStructure   => "malformed_structure",
            RejectReason::ConstraintViolation  => "constraint_violation",
        }
    }
}

/// A single rejected source row. Non-fatal: the adapter keeps producing
/// subsequent records after emitting one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedRow {
    /// External id of the row, when it could be read at all.
    pub external_id: Option<String>,
    pub reason: RejectReason,
    pub detail: String,
}

impl RejectedRow {
    pub fn new(external_id: Option<String>, reason: RejectReason, detail: impl Into<String>) -> Self {
        Self { external_id, reason, detail: detail.into() }
    }

    pub fn missing_field(external_id: Option<String>, field: &str) -> Self {
        Self::new(external_id, RejectReason::MissingRequiredField, format!("missing required field: {field}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_str_is_stable() {
        assert_eq!(RejectReason::MissingRequiredField.as_str(), "missing_required_field");
        assert_eq!(RejectReason::MalformedStructure.as_str(), "malformed_structure");
    }

    #[test]
    fn test_missing_field_detail() {
        let r = RejectedRow::missing_field(Some("42".into()), "name");
        assert_eq!(r.reason, RejectReason::MissingRequiredField);
        assert!(r.detail.contains("name"));
    }
}
