use std::time::Duration;

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::PoolError;
use shared::UnknownOrderStatus;
use thiserror::Error;

/// Coarse classification that callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InsufficientStock,
    AlreadyExists,
    InvalidArgument,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum ShopError {
    #[error("product {0} not found")]
    ProductNotFound(i64),

    #[error("order {0} not found")]
    OrderNotFound(i64),

    /// Expected business outcome, not a fault.
    #[error(
        "insufficient stock for product {product_id}: \
         requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: i64,
        requested: i32,
        available: i32,
    },

    #[error("order already exists")]
    AlreadyExists,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("transaction did not finish within {0:?}")]
    DeadlineExceeded(Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ShopError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShopError::ProductNotFound(_) | ShopError::OrderNotFound(_) => ErrorKind::NotFound,
            ShopError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            ShopError::AlreadyExists => ErrorKind::AlreadyExists,
            ShopError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ShopError::DeadlineExceeded(_) | ShopError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.kind() == ErrorKind::Internal
    }
}

impl From<DieselError> for ShopError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                ShopError::AlreadyExists
            }
            other => ShopError::Internal(other.to_string()),
        }
    }
}

impl From<bb8::RunError<PoolError>> for ShopError {
    fn from(err: bb8::RunError<PoolError>) -> Self {
        ShopError::Internal(format!("connection pool: {}", err))
    }
}

impl From<UnknownOrderStatus> for ShopError {
    fn from(err: UnknownOrderStatus) -> Self {
        ShopError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ShopError>;
