//! Error types for workflow operations

use crate::access::Action;
use crate::repository::Collection;

pub type Result<T> = std::result::Result<T, WorkflowError>;

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("{collection} document '{id}' not found")]
    NotFound { collection: Collection, id: String },
    #[error("actor '{actor}' lacks the '{capability}' capability")]
    Permission { actor: String, capability: Action },
    #[error("cannot {action} while status is {current}")]
    InvalidState {
        action: &'static str,
        current: &'static str,
    },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    // another writer changed the document between our read and write
    #[error("{collection} document '{id}' was modified concurrently")]
    Conflict { collection: Collection, id: String },
    #[error("malformed {collection} document '{id}': {reason}")]
    MalformedDocument {
        collection: Collection,
        id: String,
        reason: String,
    },
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("encoding error: {0}")]
    Encoding(String),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("required field '{0}' is missing")]
    MissingField(&'static str),
    #[error("'{0}' is not a valid amount")]
    InvalidAmount(String),
    #[error("amount must be greater than zero")]
    NonPositiveAmount,
    #[error("sum of amounts exceeds the representable range")]
    AmountOverflow,
    #[error("'{0}' is not a valid date (expected YYYY-MM-DD or DD/MM/YYYY)")]
    InvalidDate(String),
    #[error("work period ends before it starts")]
    InvertedPeriod,
    #[error("unknown {kind} code '{value}'")]
    UnknownCode { kind: &'static str, value: String },
    #[error("expense '{0}' is already attached to another report")]
    ExpenseAlreadyAttached(String),
    #[error("expense '{0}' is not part of this report")]
    ExpenseNotInReport(String),
    #[error("advance '{0}' is already reconciled by another report")]
    AdvanceAlreadyLinked(String),
    #[error("a report needs at least one expense")]
    EmptyReport,
    #[error("'{value}' is not a valid {field}")]
    InvalidDetail { field: &'static str, value: String },
}

impl WorkflowError {
    /// Stable code for programmatic handling by callers.
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::NotFound { .. } => "NOT_FOUND",
            WorkflowError::Permission { .. } => "PERMISSION_DENIED",
            WorkflowError::InvalidState { .. } => "INVALID_STATE",
            WorkflowError::Validation(_) => "VALIDATION",
            WorkflowError::Conflict { .. } => "CONFLICT",
            WorkflowError::MalformedDocument { .. } => "MALFORMED_DOCUMENT",
            WorkflowError::Storage(_) => "STORAGE",
            WorkflowError::Encoding(_) => "ENCODING",
        }
    }

    pub fn not_found(collection: Collection, id: impl Into<String>) -> Self {
        WorkflowError::NotFound {
            collection,
            id: id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        let err = WorkflowError::not_found(Collection::ExpenseReports, "report_1");
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(err.to_string().contains("expense_reports"));
        assert!(err.to_string().contains("report_1"));

        let err = WorkflowError::Permission {
            actor: "ana".into(),
            capability: Action::ApproveReport,
        };
        assert_eq!(err.code(), "PERMISSION_DENIED");
        assert!(err.to_string().contains("report:approve"));

        let err: WorkflowError = ValidationError::NonPositiveAmount.into();
        assert_eq!(err.code(), "VALIDATION");
    }
}
