use crate::types::NetworkId;
use thiserror::Error;

/// Error taxonomy of the pre-signed pool
///
/// Transport and signing errors never cross a component boundary raw: they
/// are folded into one of these kinds where they were issued. Live-price
/// failures are absorbed by the pricing policy and have no variant here.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PoolError {
    /// Dispatch or refill requested with the sentinel network selected
    #[error("No network selected")]
    NoNetworkSelected,

    /// Sequence acquisition or initial signing failed; no pool installed
    #[error("Failed to initialize {network}: {reason}")]
    Initialization { network: NetworkId, reason: String },

    /// Background extension failed; existing entries keep serving
    #[error("Failed to extend pool for {network}: {reason}")]
    Refill { network: NetworkId, reason: String },

    /// No unconsumed entry left
    #[error("No pre-signed transactions available ({consumed} of {total} used)")]
    Exhausted { consumed: usize, total: usize },

    /// The endpoint rejected or failed the submission; the sequence is spent
    #[error("Submission failed on {network} at sequence {sequence}: {reason}")]
    Submission {
        network: NetworkId,
        sequence: u64,
        reason: String,
    },

    /// Entries offered for append do not continue the pool's sequence range
    #[error("Sequence gap: expected {expected}, got {actual}")]
    SequenceGap { expected: u64, actual: u64 },
}

impl PoolError {
    /// Errors the user must act on (re-select the network)
    pub fn is_fatal(&self) -> bool {
        matches!(self, PoolError::Initialization { .. })
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            PoolError::NoNetworkSelected => "no_network",
            PoolError::Initialization { .. } => "initialization",
            PoolError::Refill { .. } => "refill",
            PoolError::Exhausted { .. } => "exhausted",
            PoolError::Submission { .. } => "submission",
            PoolError::SequenceGap { .. } => "sequence_gap",
        }
    }

    pub fn initialization(network: NetworkId, reason: impl ToString) -> Self {
        PoolError::Initialization {
            network,
            reason: reason.to_string(),
        }
    }

    pub fn refill(network: NetworkId, reason: impl ToString) -> Self {
        PoolError::Refill {
            network,
            reason: reason.to_string(),
        }
    }
}

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PoolError::Exhausted {
            consumed: 10,
            total: 10,
        };
        assert_eq!(
            err.to_string(),
            "No pre-signed transactions available (10 of 10 used)"
        );

        let err = PoolError::initialization(NetworkId::Rise, "nonce query failed");
        assert_eq!(err.to_string(), "Failed to initialize rise: nonce query failed");
    }

    #[test]
    fn test_only_initialization_is_fatal() {
        assert!(PoolError::initialization(NetworkId::MegaEth, "x").is_fatal());
        assert!(!PoolError::refill(NetworkId::MegaEth, "x").is_fatal());
        assert!(!PoolError::NoNetworkSelected.is_fatal());
        assert!(!PoolError::Submission {
            network: NetworkId::Abstract,
            sequence: 7,
            reason: "nonce too low".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_categories() {
        assert_eq!(PoolError::refill(NetworkId::Rise, "x").category(), "refill");
        assert_eq!(
            PoolError::SequenceGap {
                expected: 5,
                actual: 6
            }
            .category(),
            "sequence_gap"
        );
    }
}
