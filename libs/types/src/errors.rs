//! Error taxonomy for the matcher core
//!
//! Every error surfaced to a caller carries a short, stable English
//! message; the API edge maps kinds to transport status codes.

use thiserror::Error;

use crate::order::OrderId;

/// Top-level matcher error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatcherError {
    /// Placement rejected by the validator; the book is untouched.
    #[error("{0}")]
    Validation(String),

    /// Cancel request rejected.
    #[error("{0}")]
    CancelRejected(String),

    /// An account or asset script returned false.
    #[error("Transaction is not allowed by script of {context}")]
    ScriptRejected {
        context: String,
        is_asset_script: bool,
    },

    /// An account or asset script failed to evaluate.
    #[error("Error while executing script of {context}: {reason}")]
    ScriptExecutionError {
        context: String,
        reason: String,
        is_asset_script: bool,
    },

    /// The UTX pool refused an emitted exchange transaction; the
    /// submitted order was removed and its counter restored.
    #[error("Order {order_id} was rolled back: {cause}")]
    MatchingRolledBack { order_id: OrderId, cause: String },

    /// An operation did not complete within its deadline.
    #[error("Operation timed out")]
    Timeout,

    /// Persistence or other internal failure; fatal to the pair actor.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MatcherError {
    pub fn validation(reason: impl Into<String>) -> Self {
        MatcherError::Validation(reason.into())
    }

    pub fn cancel_rejected(reason: impl Into<String>) -> Self {
        MatcherError::CancelRejected(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = MatcherError::validation("Incorrect matcher public key");
        assert_eq!(err.to_string(), "Incorrect matcher public key");
    }

    #[test]
    fn test_script_rejection_message() {
        let err = MatcherError::ScriptRejected {
            context: "account deadbeef".to_string(),
            is_asset_script: false,
        };
        assert!(err.to_string().contains("not allowed by script"));
    }

    #[test]
    fn test_timeout_message_is_stable() {
        assert_eq!(MatcherError::Timeout.to_string(), "Operation timed out");
    }
}
