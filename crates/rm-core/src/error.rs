//! # MarketError
//!
//! Centralized error handling for the Rusty-Market services.
//! Every variant's `Display` is a short message fit to show a user.

use thiserror::Error;

/// The primary error type for all service operations.
#[derive(Error, Debug)]
pub enum MarketError {
    /// Unknown username or password mismatch (deliberately indistinguishable)
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("account is banned, {days_remaining} day(s) remaining")]
    Banned { days_remaining: i64 },

    #[error("username '{0}' is already taken")]
    UsernameTaken(String),

    /// Operation needs a logged-in identity
    #[error("you must be logged in")]
    NotAuthenticated,

    #[error("old password does not match")]
    WrongOldPassword,

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} must be at least {min} characters")]
    TooShort { field: &'static str, min: usize },

    #[error("amount must not be negative")]
    Negative,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{0}")]
    OutOfRange(String),

    /// Resource not found (e.g., user, product, report)
    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),

    #[error("this item has already been sold")]
    AlreadySold,

    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: u64, available: u64 },

    /// The listing's author no longer exists, so the sale cannot be credited
    #[error("seller '{0}' no longer exists")]
    SellerMissing(String),

    #[error("invalid {field}: {reason}")]
    ValidationFailed { field: &'static str, reason: String },

    /// A concurrent writer got there first; nothing was changed
    #[error("the record was modified concurrently, please retry")]
    Conflict,

    /// Infrastructure failure (store, hasher, session storage)
    #[error("internal service error: {0}")]
    Internal(String),
}

/// Coarse classes used for logging decisions and presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    Conflict,
    Storage,
}

impl MarketError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        MarketError::ValidationFailed {
            field,
            reason: reason.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        MarketError::Forbidden(reason.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MarketError::TooLong { .. }
            | MarketError::TooShort { .. }
            | MarketError::Negative
            | MarketError::OutOfRange(_)
            | MarketError::ValidationFailed { .. }
            | MarketError::WrongOldPassword => ErrorKind::Validation,
            MarketError::InvalidCredentials
            | MarketError::Banned { .. }
            | MarketError::NotAuthenticated
            | MarketError::Forbidden(_) => ErrorKind::Authorization,
            MarketError::UsernameTaken(_)
            | MarketError::NotFound(..)
            | MarketError::AlreadySold
            | MarketError::InsufficientBalance { .. }
            | MarketError::SellerMissing(_)
            | MarketError::Conflict => ErrorKind::Conflict,
            MarketError::Internal(_) => ErrorKind::Storage,
        }
    }
}

impl From<anyhow::Error> for MarketError {
    fn from(err: anyhow::Error) -> Self {
        MarketError::Internal(format!("{err:#}"))
    }
}

/// A specialized Result type for Rusty-Market logic.
pub type Result<T> = std::result::Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banned_message_names_days() {
        let err = MarketError::Banned { days_remaining: 6 };
        assert_eq!(err.to_string(), "account is banned, 6 day(s) remaining");
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn anyhow_maps_to_storage() {
        let err: MarketError = anyhow::anyhow!("disk gone").into();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }
}
