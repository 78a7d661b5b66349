use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalletError {
    // Key handling errors
    KeyDerivation(String),
    SigningError(String),
    KeyCleared,

    // Backend errors
    BackendError(String),
    NetworkError(String),
    NetworkRestricted(String),

    // Precondition errors
    NotInitialized(String),
    NotConnected(String),
    NoActiveWallet,

    // Storage errors
    StorageError(String),

    // Validation errors
    ValidationError(String),
    InvalidAddress(String),

    // Application errors
    NotFound(String),

    // Generic errors
    Unknown(String),
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WalletError::KeyDerivation(msg) => write!(f, "Key derivation error: {}", msg),
            WalletError::SigningError(msg) => write!(f, "Signing error: {}", msg),
            WalletError::KeyCleared => write!(f, "Key cleared: secure container no longer holds key material"),

            WalletError::BackendError(msg) => write!(f, "Backend error: {}", msg),
            WalletError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            WalletError::NetworkRestricted(msg) => write!(f, "Network restricted: {}", msg),

            WalletError::NotInitialized(msg) => write!(f, "Not initialized: {}", msg),
            WalletError::NotConnected(msg) => write!(f, "Not connected: {}", msg),
            WalletError::NoActiveWallet => write!(f, "No active wallet"),

            WalletError::StorageError(msg) => write!(f, "Storage error: {}", msg),

            WalletError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            WalletError::InvalidAddress(msg) => write!(f, "Invalid address: {}", msg),

            WalletError::NotFound(msg) => write!(f, "Not found: {}", msg),

            WalletError::Unknown(msg) => write!(f, "Unknown error: {}", msg),
        }
    }
}

impl std::error::Error for WalletError {}

pub type WalletResult<T> = Result<T, WalletError>;

impl From<std::io::Error> for WalletError {
    fn from(error: std::io::Error) -> Self {
        WalletError::StorageError(error.to_string())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(error: serde_json::Error) -> Self {
        WalletError::ValidationError(format!("JSON error: {}", error))
    }
}
