//! Error type shared by every service module.
//!
//! Validation and stock failures are raised before any write. Store
//! failures abort the surrounding transaction, so callers never observe a
//! partially applied order, edit, payment or stock movement.

use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PosError {
    #[error("{0}")]
    Validation(String),

    #[error("{item}: Only {available} in stock. Reduce quantity or remove from cart.")]
    InsufficientStock { item: String, available: f64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Customer not found: {0}")]
    CustomerNotFound(i64),

    #[error("Order not found: {0}")]
    OrderNotFound(i64),

    #[error("Stock item not found: {0}")]
    StockItemNotFound(i64),

    #[error("Clear outstanding balance ({balance:.2}) before removing customer {customer_id}")]
    OutstandingBalance { customer_id: i64, balance: f64 },

    #[error("Invalid username or PIN")]
    InvalidCredentials,

    #[error("Role {role} has no access to {section}")]
    Forbidden { role: String, section: String },

    #[error("store: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("lock poisoned: {0}")]
    Lock(String),
}

pub type PosResult<T> = Result<T, PosError>;

impl PosError {
    pub fn validation(msg: impl Into<String>) -> Self {
        PosError::Validation(msg.into())
    }

    /// True when the error is a UNIQUE constraint violation from SQLite.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            PosError::Store(rusqlite::Error::SqliteFailure(err, _)) => {
                err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            }
            _ => false,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for PosError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        PosError::Lock(e.to_string())
    }
}

// Host IPC layers hand errors to the UI as plain messages.
impl Serialize for PosError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
