use thiserror::Error;

/// Transport-level errors raised by the JSON-RPC collaborator
///
/// These never leave the component that issued the call: the pricing policy,
/// pool store and dispatcher convert them into their own error kinds.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RpcManagerError {
    /// Transport-level errors (network, connection, HTTP status)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// Timeout errors
    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// JSON-RPC error object returned by the node
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    /// Well-formed response with an unusable result
    #[error("Invalid response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RpcManagerError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcManagerError::Transport { .. } => true,
            RpcManagerError::Timeout { .. } => true,
            RpcManagerError::RpcResponse { code, .. } => {
                // JSON-RPC internal errors and 5xx-style codes
                matches!(code, Some(c) if *c == -32603 || (500..600).contains(c))
            }
            RpcManagerError::InvalidResponse { .. } => false,
            RpcManagerError::Configuration(_) => false,
        }
    }

    /// Get the error category for metrics labels
    pub fn category(&self) -> &'static str {
        match self {
            RpcManagerError::Transport { .. } => "transport",
            RpcManagerError::Timeout { .. } => "timeout",
            RpcManagerError::RpcResponse { .. } => "rpc_response",
            RpcManagerError::InvalidResponse { .. } => "invalid_response",
            RpcManagerError::Configuration(_) => "config",
        }
    }

    /// Convert a reqwest error, classifying timeouts
    pub fn from_reqwest(err: reqwest::Error, endpoint: &str, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            RpcManagerError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms,
            }
        } else {
            RpcManagerError::Transport {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Result type for RPC operations
pub type RpcResult<T> = Result<T, RpcManagerError>;
