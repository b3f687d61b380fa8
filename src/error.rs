//! Error types for CornellChain

use crate::blockchain::Rejection;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Invalid block: {0}")]
    InvalidBlock(#[from] Rejection),
    #[error("Block already exists: {0}")]
    BlockAlreadyExists(String),
    #[error("Invalid input reference: {0}")]
    InvalidInputRef(String),
    #[error("Cryptographic error: {0}")]
    CryptoError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Mining cancelled")]
    MiningCancelled,
    #[error("Mining failed: {0}")]
    MiningFailed(String),
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::SerializationError(err.to_string())
    }
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::DatabaseError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_message_is_preserved() {
        let err = ChainError::from(Rejection::DoubleSpentInput);
        assert_eq!(err.to_string(), "Invalid block: Double-spent input");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(ChainError::from(io), ChainError::IoError(msg) if msg == "missing"));
    }
}
