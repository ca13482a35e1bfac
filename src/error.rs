use thiserror::Error;

use crate::model::{Account, TickId};

/// Fatal clock-level failures. These abort the whole `advance_clock` call;
/// nothing about the tick in flight is retried until the operator intervenes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockError {
    #[error("world clock row is missing")]
    Missing,

    #[error("world clock version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },
}

/// A post-condition the commit layer refused to apply. The whole handler
/// output is rejected — mutations are never partially applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConsistencyViolation {
    #[error("balance of {account} would fall to {result} (delta {delta})")]
    NegativeBalance {
        account: Account,
        delta: i64,
        result: i64,
    },

    #[error("{entity}: illegal status transition {from} -> {to}")]
    IllegalTransition {
        entity: String,
        from: String,
        to: String,
    },

    #[error("duplicate salary payment for role {role_id} in period {period}")]
    DuplicateSalary { role_id: u64, period: TickId },

    #[error("world date would regress: {from} -> {to}")]
    DateRegression { from: String, to: String },

    #[error("{0}")]
    UnknownEntity(String),

    #[error("{0}")]
    InvalidMutation(String),
}

/// Failure writing to the durable audit journal. Transient failures are
/// retried a bounded number of times before escalating to a handler failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("journal write failed: {message}")]
pub struct JournalError {
    pub transient: bool,
    pub message: String,
}

impl JournalError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            transient: true,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            transient: false,
            message: message.into(),
        }
    }
}

/// Why a single handler's run of a single tick did not commit.
///
/// Recorded on the handler's `TickRecord`, halts the tick (later handlers may
/// depend on this one), and is retried on the next `advance_clock` call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HandlerError {
    /// The handler's own domain logic failed.
    #[error("{0}")]
    Logic(String),

    /// The commit layer rejected the handler's mutations.
    #[error(transparent)]
    Consistency(#[from] ConsistencyViolation),

    /// The handler ran past its budget; its output is discarded so the retry
    /// starts from a clean slate.
    #[error("handler exceeded {budget_ms}ms budget (took {elapsed_ms}ms)")]
    Timeout { budget_ms: u64, elapsed_ms: u64 },

    /// Journal writes kept failing after exhausting local retries.
    #[error(transparent)]
    Infra(#[from] JournalError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LocationRef;

    #[test]
    fn negative_balance_message_names_account() {
        let err = ConsistencyViolation::NegativeBalance {
            account: Account::Treasury {
                location: LocationRef::Barony(7),
            },
            delta: -500,
            result: -120,
        };
        let msg = err.to_string();
        assert!(msg.contains("barony:7"), "got: {msg}");
        assert!(msg.contains("-120"));
    }

    #[test]
    fn consistency_converts_to_handler_error() {
        let violation = ConsistencyViolation::DuplicateSalary {
            role_id: 3,
            period: 12,
        };
        let err: HandlerError = violation.clone().into();
        assert_eq!(err, HandlerError::Consistency(violation));
    }

    #[test]
    fn journal_error_transience() {
        assert!(JournalError::transient("io").transient);
        assert!(!JournalError::permanent("corrupt").transient);
    }
}
