//! Epoch-scoped per-network client cache
//!
//! A `Client` bakes in the network's chain parameters when it is built, so no
//! handle may outlive a network switch: `invalidate()` clears the whole cache
//! and bumps the epoch, and every client records the epoch it was built in.

use super::rpc_client::JsonRpcClient;
use super::rpc_errors::{RpcManagerError, RpcResult};
use super::ChainRpc;
use crate::tx_builder::{
    FeeSchedule, OperationRequest, OperationSigner, SignedPayload, TransactionBuilderError,
};
use crate::types::{NetworkDescriptor, NetworkId};
use alloy::primitives::Address;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Connection handle for one network: transport plus signing identity
#[derive(Debug)]
pub struct Client {
    descriptor: &'static NetworkDescriptor,
    rpc: Arc<dyn ChainRpc>,
    signer: Arc<dyn OperationSigner>,
    epoch: u64,
}

impl Client {
    pub fn new(
        descriptor: &'static NetworkDescriptor,
        rpc: Arc<dyn ChainRpc>,
        signer: Arc<dyn OperationSigner>,
        epoch: u64,
    ) -> Self {
        Self {
            descriptor,
            rpc,
            signer,
            epoch,
        }
    }

    pub fn network(&self) -> NetworkId {
        self.descriptor.id
    }

    pub fn descriptor(&self) -> &'static NetworkDescriptor {
        self.descriptor
    }

    /// Registry epoch this client was built in
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Address of the signing identity
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn endpoint(&self) -> &str {
        self.rpc.endpoint()
    }

    pub async fn next_sequence(&self) -> RpcResult<u64> {
        self.rpc.next_sequence(self.signer.address()).await
    }

    pub async fn live_fee_rate(&self) -> RpcResult<u128> {
        self.rpc.live_fee_rate().await
    }

    /// Sign the network's benchmark call at `sequence`
    pub async fn sign(
        &self,
        sequence: u64,
        fees: &FeeSchedule,
    ) -> Result<SignedPayload, TransactionBuilderError> {
        let request = OperationRequest {
            chain_id: self.descriptor.chain_id,
            destination: self.descriptor.destination,
            selector: self.descriptor.payload_selector,
            sequence,
            fees: *fees,
        };
        self.signer.sign(&request).await
    }

    /// Submit through the network's low-latency endpoint method
    pub async fn submit(&self, payload: &SignedPayload) -> RpcResult<String> {
        self.rpc
            .submit(self.descriptor.endpoint_method, payload)
            .await
    }
}

/// Builds clients for the registry
pub trait ClientFactory: Send + Sync {
    fn connect(&self, descriptor: &'static NetworkDescriptor, epoch: u64) -> RpcResult<Client>;
}

/// Production factory: JSON-RPC over HTTP plus a shared signer
pub struct HttpClientFactory {
    signer: Arc<dyn OperationSigner>,
    rpc_overrides: HashMap<NetworkId, String>,
    timeout: Duration,
}

impl HttpClientFactory {
    pub fn new(signer: Arc<dyn OperationSigner>, timeout: Duration) -> Self {
        Self {
            signer,
            rpc_overrides: HashMap::new(),
            timeout,
        }
    }

    /// Replace the built-in RPC URL for a network
    pub fn with_rpc_override(mut self, network: NetworkId, url: impl Into<String>) -> Self {
        self.rpc_overrides.insert(network, url.into());
        self
    }

    pub fn rpc_url_for(&self, descriptor: &NetworkDescriptor) -> String {
        self.rpc_overrides
            .get(&descriptor.id)
            .cloned()
            .unwrap_or_else(|| descriptor.rpc_url.to_string())
    }
}

impl ClientFactory for HttpClientFactory {
    fn connect(&self, descriptor: &'static NetworkDescriptor, epoch: u64) -> RpcResult<Client> {
        let url = self.rpc_url_for(descriptor);
        let rpc = JsonRpcClient::new(url, self.timeout)?;
        Ok(Client::new(
            descriptor,
            Arc::new(rpc),
            Arc::clone(&self.signer),
            epoch,
        ))
    }
}

/// Lazily populated client cache, cleared on every network switch
pub struct ClientRegistry {
    factory: Arc<dyn ClientFactory>,
    cache: DashMap<NetworkId, Arc<Client>>,
    epoch: AtomicU64,
}

impl ClientRegistry {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            cache: DashMap::new(),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Cached client for `network`, building one on first use
    ///
    /// Returns `Ok(None)` for the "no network selected" sentinel.
    pub fn get_client(&self, network: NetworkId) -> RpcResult<Option<Arc<Client>>> {
        if network.is_sentinel() {
            return Ok(None);
        }

        let epoch = self.epoch();
        if let Some(client) = self.cache.get(&network) {
            if client.epoch() == epoch {
                return Ok(Some(Arc::clone(client.value())));
            }
        }

        let descriptor = network.descriptor();
        if descriptor.endpoint_method.is_empty() {
            return Err(RpcManagerError::Configuration(format!(
                "network {} has no submission endpoint",
                network
            )));
        }

        let client = Arc::new(self.factory.connect(descriptor, epoch)?);
        debug!(network = %network, epoch = epoch, endpoint = %client.endpoint(), "Client created");
        self.cache.insert(network, Arc::clone(&client));
        Ok(Some(client))
    }

    /// Drop every cached client and start a new epoch
    pub fn invalidate(&self) -> u64 {
        let dropped = self.cache.len();
        self.cache.clear();
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        info!(epoch = epoch, dropped = dropped, "Client cache invalidated");
        epoch
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}
