//! Error types for the signing side of the pool
//!
//! Signing failures are terminal for the batch being built: the pool store
//! turns them into an initialization error, the refill scheduler into a
//! non-fatal refill notice.

use thiserror::Error;

/// Error type for building and signing pre-authorized operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransactionBuilderError {
    /// Failed to sign the transaction
    ///
    /// This can indicate:
    /// - Malformed request fields (fee/gas combination rejected by the builder)
    /// - Signing identity unavailable or invalid
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Configuration or validation error
    ///
    /// Invalid private key material, empty destination, zero gas limit.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TransactionBuilderError {
    /// Check if this error is potentially retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Signing(_) => false,
            Self::Configuration(_) => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::Signing(_) => "signing",
            Self::Configuration(_) => "config",
        }
    }

    pub fn signing_failed(reason: impl Into<String>) -> Self {
        Self::Signing(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransactionBuilderError::Signing("gas limit is zero".to_string());
        assert_eq!(err.to_string(), "Signing failed: gas limit is zero");

        let err = TransactionBuilderError::Configuration("invalid key".to_string());
        assert_eq!(err.to_string(), "Configuration error: invalid key");
    }

    #[test]
    fn test_signing_errors_are_not_retryable() {
        assert!(!TransactionBuilderError::signing_failed("x").is_retryable());
        assert_eq!(TransactionBuilderError::signing_failed("x").category(), "signing");
        assert_eq!(
            TransactionBuilderError::Configuration("x".to_string()).category(),
            "config"
        );
    }
}
