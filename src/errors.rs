//! Typed error hierarchy for the marketplace.
//!
//! `MarketError` carries the domain failures that callers are expected to
//! match on (missing records, invalid input, lifecycle violations, auth
//! failures). Plumbing failures travel as `anyhow::Error` and are wrapped in
//! `MarketError::Other` when they need to cross a typed boundary.

use thiserror::Error;

/// Errors from the marketplace domain layer.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("User not found")]
    UserNotFound { id: i64 },

    #[error("Job not found")]
    JobNotFound { id: i64 },

    #[error("Payment not found")]
    PaymentNotFound { id: i64 },

    #[error("Email already exists")]
    EmailTaken { email: String },

    #[error("Already applied to this job")]
    AlreadyApplied { job_id: i64, freelancer_id: i64 },

    #[error("User {user_id} is not a {expected}")]
    WrongRole { user_id: i64, expected: String },

    #[error("Cannot {action} a job that is {status}")]
    InvalidTransition { action: String, status: String },

    #[error("Job {job_id} is assigned to a different freelancer")]
    AssignedElsewhere { job_id: i64 },

    #[error("Unknown payment type: {0}")]
    UnknownPaymentType(String),

    #[error("Unknown notification type: {0}")]
    UnknownNotificationType(String),

    #[error("Notification strategy not set")]
    StrategyNotSet,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Invalid or expired reset token")]
    InvalidResetToken,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MarketError {
    /// Shorthand for a validation failure with a static message.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for the "record does not exist" family of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UserNotFound { .. } | Self::JobNotFound { .. } | Self::PaymentNotFound { .. }
        )
    }
}
