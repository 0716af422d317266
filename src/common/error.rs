//! Common Error Types for the kBTC Custody Backend
//!
//! All entry-point failures are synchronous, atomic rejections with zero
//! side effects; the variants below are the full rejection taxonomy.

use thiserror::Error;

/// Root error type for the custody backend
#[derive(Debug, Error)]
pub enum CustodyError {
    /// Wrong caller or role, or the system is paused
    #[error("unauthorized: {0}")]
    Authorization(String),

    /// Operation invalid for the current receipt/group status (including
    /// nonce mismatch)
    #[error("invalid state: {0}")]
    State(String),

    /// Action attempted before a required interval elapsed
    #[error("too early: {0}")]
    Timing(String),

    /// Insufficient collateral or capacity
    #[error("capacity exceeded: {0}")]
    Capacity(String),

    /// Duplicate or non-member signer, bad signature, stale epoch
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// Group or receipt does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Rejected by the external pegged-token ledger
    #[error("token ledger error: {0}")]
    Token(String),

    /// Persistence errors
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl CustodyError {
    /// Create an authorization error
    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    /// Create a state error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Create a timing error
    pub fn timing(msg: impl Into<String>) -> Self {
        Self::Timing(msg.into())
    }

    /// Create a capacity error
    pub fn capacity(msg: impl Into<String>) -> Self {
        Self::Capacity(msg.into())
    }

    /// Create an integrity error
    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a token ledger error
    pub fn token(msg: impl Into<String>) -> Self {
        Self::Token(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            CustodyError::Authorization(_) => "AUTHORIZATION_ERROR",
            CustodyError::State(_) => "STATE_ERROR",
            CustodyError::Timing(_) => "TIMING_ERROR",
            CustodyError::Capacity(_) => "CAPACITY_ERROR",
            CustodyError::Integrity(_) => "INTEGRITY_ERROR",
            CustodyError::NotFound(_) => "NOT_FOUND",
            CustodyError::Token(_) => "TOKEN_ERROR",
            CustodyError::Storage(_) => "STORAGE_ERROR",
            CustodyError::Config(_) => "CONFIG_ERROR",
        }
    }
}

/// Result type alias using CustodyError
pub type Result<T> = std::result::Result<T, CustodyError>;
