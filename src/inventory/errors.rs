//! Inventory errors

use thiserror::Error;

use super::model::{HerdId, InstanceId, ServerId};

/// Result type for inventory operations
pub type InventoryResult<T> = Result<T, InventoryError>;

/// Inventory lookup and persistence errors
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("herd {0} not found")]
    HerdNotFound(HerdId),

    #[error("server {0} not found")]
    ServerNotFound(ServerId),

    #[error("instance {0} not found")]
    InstanceNotFound(InstanceId),

    #[error("inventory I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("inventory document is invalid: {0}")]
    Format(#[from] serde_json::Error),

    #[error("inventory lock poisoned")]
    Poisoned,
}
