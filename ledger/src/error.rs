//! # Ledger Errors
//!
//! One error enum for every user-visible failure in the credit core. Each
//! variant carries the identifiers needed to render a precise message (which
//! holder, which denom, how much was available) and maps onto a flat
//! [`ErrorKind`] for callers that only branch on the classification.
//!
//! Storage failures arrive as [`StoreError`] and are folded in through
//! `From`: missing and duplicate rows keep their meaning, everything else
//! becomes `Internal` after being logged. Backend details never leak into
//! the message a caller sees.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::math::Dec;
use crate::store::StoreError;

/// Errors produced by ledger, marketplace, and basket operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity type, e.g. "sell order".
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// A tradable pool (or bank balance) is smaller than the requested debit.
    #[error("insufficient funds: {holder} has {available} {denom}, requested {requested}")]
    InsufficientFunds {
        holder: String,
        denom: String,
        available: Dec,
        requested: Dec,
    },

    /// An escrowed pool is smaller than the requested release.
    #[error("insufficient escrow: {holder} has {available} {denom} escrowed, requested {requested}")]
    InsufficientEscrow {
        holder: String,
        denom: String,
        available: Dec,
        requested: Dec,
    },

    /// A basket holds less of a batch than the requested take.
    #[error("insufficient basket balance: {basket} holds {available} {denom}, requested {requested}")]
    InsufficientBalance {
        basket: String,
        denom: String,
        available: Dec,
        requested: Dec,
    },

    /// The payment denomination is not on the allow-list.
    #[error("denom {0} is not allowed as a payment denomination")]
    DenomNotAllowed(String),

    /// A row with the same unique key already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// The actor is not permitted to perform the operation.
    #[error("unauthorized: {actor} {reason}")]
    Unauthorized { actor: String, reason: String },

    /// A quantity or price is malformed or out of policy.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// An expiration is not strictly after the current block time.
    #[error("expiration {expiration} must be after block time {block_time}")]
    InvalidExpiration {
        expiration: DateTime<Utc>,
        block_time: DateTime<Utc>,
    },

    /// A malformed identifier or an otherwise invalid request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Storage or encoding failure.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Flat classification of [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InsufficientFunds,
    InsufficientEscrow,
    InsufficientBalance,
    DenomNotAllowed,
    AlreadyExists,
    Unauthorized,
    InvalidAmount,
    InvalidExpiration,
    InvalidRequest,
    Internal,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::InsufficientEscrow { .. } => ErrorKind::InsufficientEscrow,
            LedgerError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            LedgerError::DenomNotAllowed(_) => ErrorKind::DenomNotAllowed,
            LedgerError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            LedgerError::Unauthorized { .. } => ErrorKind::Unauthorized,
            LedgerError::InvalidAmount(_) => ErrorKind::InvalidAmount,
            LedgerError::InvalidExpiration { .. } => ErrorKind::InvalidExpiration,
            LedgerError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            LedgerError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn unauthorized(actor: &str, reason: impl Into<String>) -> Self {
        LedgerError::Unauthorized {
            actor: actor.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { table, key } => LedgerError::NotFound {
                entity: table,
                id: key,
            },
            StoreError::AlreadyExists { table, key } => LedgerError::AlreadyExists {
                entity: table,
                id: key,
            },
            StoreError::Backend(e) => {
                tracing::error!(error = %e, "storage backend failure");
                LedgerError::Internal("storage backend failure".into())
            }
            StoreError::Serialization(e) => {
                tracing::error!(error = %e, "record encoding failure");
                LedgerError::Internal("record encoding failure".into())
            }
        }
    }
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_keeps_identifier() {
        let err: LedgerError = StoreError::NotFound {
            table: "market",
            key: "7".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "market not found: 7");
    }

    #[test]
    fn backend_failures_are_opaque() {
        let err: LedgerError = StoreError::Serialization("unexpected end of file".into()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!err.to_string().contains("end of file"));
    }
}
