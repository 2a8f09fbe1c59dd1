use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One short line inside an `InsufficientStock` rejection.
///
/// `available` is the balance the line was checked against at its position
/// in staging order, so two lines for the same product report a running
/// balance rather than the same starting figure twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockShortfall {
    pub product_name: String,
    pub requested: i32,
    pub available: i32,
}

impl fmt::Display for StockShortfall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: requested {}, available {}",
            self.product_name, self.requested, self.available
        )
    }
}

/// Terminal cart state observed by an operation that required `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartPhase {
    Completed,
    Expired,
}

impl fmt::Display for CartPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CartPhase::Completed => write!(f, "completed"),
            CartPhase::Expired => write!(f, "expired"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cart is already {0}")]
    InvalidState(CartPhase),

    #[error("Unresolved product: {0}")]
    UnresolvedProduct(String),

    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("Insufficient stock for {} line(s)", .0.len())]
    InsufficientStock(Vec<StockShortfall>),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}

impl ServiceError {
    /// True for infrastructure faults as opposed to the domain taxonomy;
    /// callers treat these as retriable at their own discretion.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, ServiceError::DatabaseError(_))
    }
}
