//! Typed error hierarchy for the issue board.
//!
//! `BoardError` covers every failure the store, the move/undo protocol and
//! the simulated backend can report. Configuration, file I/O and CLI
//! plumbing use `anyhow` with context instead.

use thiserror::Error;

use crate::board::fault::Operation;
use crate::board::models::Role;

/// Coarse classification used by callers to decide how to surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Simulated backend failure. Re-invoking the same operation may succeed.
    Transient,
    /// The referenced issue does not exist. Not retried.
    NotFound,
    /// The undo window elapsed. Informational, not retried.
    Expired,
    /// The configured role is not allowed to perform the action.
    Forbidden,
    /// Malformed input from a caller.
    Invalid,
    Internal,
}

/// Errors from the issue store, move/undo protocol and backend.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Issue {id} not found")]
    IssueNotFound { id: String },

    #[error("Undo window expired: last move was {elapsed_ms} ms ago (limit {window_ms} ms)")]
    UndoExpired { elapsed_ms: i64, window_ms: i64 },

    #[error("Backend unavailable during {operation}, please retry")]
    Transient { operation: Operation },

    #[error("Role '{role}' is not allowed to {action}")]
    Forbidden { role: Role, action: &'static str },

    #[error("Duplicate issue id '{id}' in seed data")]
    DuplicateIssue { id: String },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Issue store lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BoardError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::IssueNotFound { id: id.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IssueNotFound { .. } => ErrorKind::NotFound,
            Self::UndoExpired { .. } => ErrorKind::Expired,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::DuplicateIssue { .. } | Self::BadRequest(_) => ErrorKind::Invalid,
            Self::LockPoisoned | Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// Only simulated backend failures are worth retrying verbatim.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

pub type BoardResult<T> = Result<T, BoardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_not_found_carries_id() {
        let err = BoardError::not_found("X-1");
        match &err {
            BoardError::IssueNotFound { id } => assert_eq!(id, "X-1"),
            _ => panic!("Expected IssueNotFound"),
        }
        assert!(err.to_string().contains("X-1"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_undo_expired_reports_elapsed_and_window() {
        let err = BoardError::UndoExpired {
            elapsed_ms: 6000,
            window_ms: 5000,
        };
        let msg = err.to_string();
        assert!(msg.contains("6000"));
        assert!(msg.contains("5000"));
        assert_eq!(err.kind(), ErrorKind::Expired);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_only_transient_is_retryable() {
        let transient = BoardError::Transient {
            operation: Operation::MoveIssue,
        };
        assert!(transient.is_retryable());
        assert!(transient.to_string().contains("move issue"));
        assert!(!BoardError::not_found("a").is_retryable());
        assert!(!BoardError::LockPoisoned.is_retryable());
    }

    #[test]
    fn test_forbidden_names_role_and_action() {
        let err = BoardError::Forbidden {
            role: Role::Contributor,
            action: "move issues",
        };
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(
            err.to_string(),
            "Role 'contributor' is not allowed to move issues"
        );
    }

    #[test]
    fn test_anyhow_errors_convert_to_internal() {
        let err: BoardError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, BoardError::Other(_)));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_board_error_implements_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&BoardError::LockPoisoned);
    }
}
