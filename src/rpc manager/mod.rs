//! RPC Manager Module
//!
//! Per-network JSON-RPC access for the pre-signed pool:
//! - `ChainRpc`: the sequence query, price query and submission capabilities
//! - `JsonRpcClient`: reqwest-backed implementation of `ChainRpc`
//! - `ClientRegistry`: lazily built, epoch-scoped cache of per-network clients

use alloy::primitives::Address;
use async_trait::async_trait;

use crate::tx_builder::SignedPayload;

// Submodules
pub mod client_registry;
pub mod rpc_client;
pub mod rpc_errors;

// Re-exports for convenience
pub use client_registry::{Client, ClientFactory, ClientRegistry, HttpClientFactory};
pub use rpc_client::JsonRpcClient;
pub use rpc_errors::{RpcManagerError, RpcResult};

/// Network-facing capabilities consumed by the pool
#[async_trait]
pub trait ChainRpc: Send + Sync + std::fmt::Debug {
    /// Endpoint label used in errors and logs
    fn endpoint(&self) -> &str;

    /// Next unused sequence number (account nonce) for `address`
    async fn next_sequence(&self, address: Address) -> RpcResult<u64>;

    /// Current network fee rate in wei per gas
    async fn live_fee_rate(&self) -> RpcResult<u128>;

    /// Submit a signed payload through `method`, returning the transaction identifier
    async fn submit(&self, method: &str, payload: &SignedPayload) -> RpcResult<String>;
}
