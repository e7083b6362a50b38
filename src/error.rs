//! Error types for the transactional engine

use crate::concurrency::TxId;
use crate::types::value::Value;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Storage errors
    #[error("Store not found: {0}")]
    StoreNotFound(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists with a different schema: {0}")]
    DuplicateTable(String),

    #[error("Duplicate primary key {key} in table {table}")]
    DuplicatePrimaryKey { table: String, key: Value },

    #[error("Unique constraint violation on {table}.{column}")]
    UniqueViolation { table: String, column: String },

    #[error("NULL constraint violation on column: {0}")]
    NullConstraintViolation(String),

    #[error("Row {key} not found in table {table}")]
    RowNotFound { table: String, key: Value },

    // Type errors
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    // Concurrency errors
    #[error("Timestamp order violation: transaction ts {ts} conflicts with ts {conflict_ts}")]
    TimestampOrder { ts: u64, conflict_ts: u64 },

    #[error("Transaction {victim} aborted as deadlock victim")]
    Deadlock { victim: TxId },

    #[error("Wait exceeded the configured timeout")]
    WaitTimeout,

    #[error("Prepare vetoed by participant store {store}")]
    PrepareFailed { store: String },

    #[error("Transaction cancelled")]
    Cancelled,

    // Transaction lifecycle errors
    #[error("Transaction not active: {0}")]
    TransactionNotActive(TxId),

    #[error("Transaction aborted: {cause} (exhausted: {exhausted})")]
    TransactionAborted { cause: AbortCause, exhausted: bool },

    // Workload constraint errors
    #[error("Insufficient funds in account {account}")]
    InsufficientFunds { account: Value },

    #[error("Insufficient stock for product {product}")]
    InsufficientStock { product: Value },
}

impl Error {
    /// The abort cause this error maps to when it terminates a transaction.
    pub fn abort_cause(&self) -> AbortCause {
        match self {
            Error::TimestampOrder { .. } => AbortCause::TimestampOrder,
            Error::Deadlock { .. } => AbortCause::Deadlock,
            Error::PrepareFailed { .. } => AbortCause::PrepareFail,
            Error::WaitTimeout => AbortCause::WaitTimeout,
            Error::TypeMismatch { .. } | Error::InvalidValue(_) => AbortCause::TypeMismatch,
            Error::Cancelled => AbortCause::UserAbort,
            Error::TransactionAborted { cause, .. } => *cause,
            _ => AbortCause::Constraint,
        }
    }
}

/// Why a transaction aborted. Restartable causes are absorbed by the
/// coordinator's retry loop; the rest surface to the caller immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortCause {
    TimestampOrder,
    Deadlock,
    PrepareFail,
    WaitTimeout,
    Constraint,
    TypeMismatch,
    UserAbort,
}

impl AbortCause {
    pub fn is_restartable(&self) -> bool {
        matches!(
            self,
            AbortCause::TimestampOrder
                | AbortCause::Deadlock
                | AbortCause::PrepareFail
                | AbortCause::WaitTimeout
        )
    }
}

impl std::fmt::Display for AbortCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AbortCause::TimestampOrder => "timestamp order violation",
            AbortCause::Deadlock => "deadlock victim",
            AbortCause::PrepareFail => "prepare vetoed",
            AbortCause::WaitTimeout => "wait timeout",
            AbortCause::Constraint => "constraint violation",
            AbortCause::TypeMismatch => "type mismatch",
            AbortCause::UserAbort => "user abort",
        };
        write!(f, "{}", name)
    }
}
