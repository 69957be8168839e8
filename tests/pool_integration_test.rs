//! Integration tests: real EIP-1559 signing through the public dispatcher API
//!
//! The transport is an in-process fake that decodes every submitted envelope
//! and enforces the node's nonce ordering, so a duplicate or skipped sequence
//! number surfaces as a rejected submission.

use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use parking_lot::Mutex;
use realtime_bench::dispatcher::{Dispatcher, DispatcherSettings};
use realtime_bench::pool_manager::RefillOutcome;
use realtime_bench::rpc_manager::{ChainRpc, Client, ClientFactory, RpcManagerError, RpcResult};
use realtime_bench::tx_builder::{Eip1559Signer, OperationSigner, SignedPayload};
use realtime_bench::types::{NetworkDescriptor, NetworkId, GWEI, UPDATE_SELECTOR};
use realtime_bench::PoolError;
use std::sync::Arc;

const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Node stand-in: accepts a transaction only at the account's next nonce
#[derive(Debug)]
struct FakeChain {
    chain_id: u64,
    next_nonce: Mutex<u64>,
    methods: Mutex<Vec<String>>,
}

impl FakeChain {
    fn new(chain_id: u64, nonce: u64) -> Self {
        Self {
            chain_id,
            next_nonce: Mutex::new(nonce),
            methods: Mutex::new(Vec::new()),
        }
    }

    fn reject(&self, message: impl Into<String>) -> RpcManagerError {
        RpcManagerError::RpcResponse {
            endpoint: "fake".to_string(),
            message: message.into(),
            code: Some(-32000),
        }
    }
}

#[async_trait]
impl ChainRpc for FakeChain {
    fn endpoint(&self) -> &str {
        "fake"
    }

    async fn next_sequence(&self, _address: Address) -> RpcResult<u64> {
        Ok(*self.next_nonce.lock())
    }

    async fn live_fee_rate(&self) -> RpcResult<u128> {
        Ok(3 * GWEI)
    }

    async fn submit(&self, method: &str, payload: &SignedPayload) -> RpcResult<String> {
        self.methods.lock().push(method.to_string());
        let mut raw = payload.as_bytes();
        let envelope = TxEnvelope::decode_2718(&mut raw).map_err(|e| self.reject(e.to_string()))?;
        if envelope.chain_id() != Some(self.chain_id) {
            return Err(self.reject("wrong chain id"));
        }
        if envelope.input().as_ref() != &UPDATE_SELECTOR[..] {
            return Err(self.reject("unexpected calldata"));
        }
        let mut next = self.next_nonce.lock();
        if envelope.nonce() != *next {
            return Err(self.reject(format!(
                "nonce mismatch: expected {}, got {}",
                *next,
                envelope.nonce()
            )));
        }
        *next += 1;
        Ok(format!("{:#x}", envelope.tx_hash()))
    }
}

struct FakeFactory {
    chain: Arc<FakeChain>,
    signer: Arc<Eip1559Signer>,
}

impl ClientFactory for FakeFactory {
    fn connect(&self, descriptor: &'static NetworkDescriptor, epoch: u64) -> RpcResult<Client> {
        Ok(Client::new(
            descriptor,
            Arc::clone(&self.chain) as Arc<dyn ChainRpc>,
            Arc::clone(&self.signer) as Arc<dyn OperationSigner>,
            epoch,
        ))
    }
}

fn setup(network: NetworkId, nonce: u64) -> (Dispatcher, Arc<FakeChain>) {
    let key: PrivateKeySigner = TEST_KEY.parse().unwrap();
    let chain = Arc::new(FakeChain::new(network.descriptor().chain_id, nonce));
    let factory = FakeFactory {
        chain: Arc::clone(&chain),
        signer: Arc::new(Eip1559Signer::new(key)),
    };
    let dispatcher = Dispatcher::new(Arc::new(factory), DispatcherSettings::default());
    (dispatcher, chain)
}

#[tokio::test]
async fn test_signed_pool_submits_in_nonce_order_across_refills() {
    let (mut dispatcher, chain) = setup(NetworkId::MegaEth, 42);
    dispatcher.select_network(NetworkId::MegaEth).await.unwrap();

    let mut sequences = Vec::new();
    for i in 0..25 {
        let record = dispatcher.dispatch().await.unwrap();
        assert!(record.identifier.starts_with("0x"));
        assert_eq!(record.identifier.len(), 66);
        sequences.push(record.sequence);
        if i % 5 == 4 {
            dispatcher.wait_for_refill().await;
        }
    }

    assert_eq!(sequences, (42..67).collect::<Vec<_>>());
    assert_eq!(*chain.next_nonce.lock(), 67);
    assert!(chain
        .methods
        .lock()
        .iter()
        .all(|m| m == "realtime_sendRawTransaction"));
    assert!(dispatcher.take_notices().is_empty());
}

#[tokio::test]
async fn test_refill_batch_is_priced_by_network_rule() {
    let (mut dispatcher, _) = setup(NetworkId::Rise, 0);
    dispatcher.select_network(NetworkId::Rise).await.unwrap();
    for _ in 0..5 {
        dispatcher.dispatch().await.unwrap();
    }
    let outcome = dispatcher.wait_for_refill().await.unwrap().unwrap();
    assert!(matches!(outcome, RefillOutcome::Appended { first_sequence: 10, .. }));

    let pool = dispatcher.pool_handle().unwrap();
    let entry = pool.lock().entry(15).cloned().unwrap();
    let mut raw = entry.payload.as_bytes();
    let envelope = TxEnvelope::decode_2718(&mut raw).unwrap();
    assert_eq!(envelope.nonce(), 15);
    // rise: live quote / 10
    assert_eq!(envelope.max_fee_per_gas(), 3 * GWEI / 10);
    assert_eq!(envelope.gas_limit(), 50_000);
    assert_eq!(envelope.to(), Some(NetworkId::Rise.descriptor().destination));
}

#[tokio::test]
async fn test_history_carries_explorer_links() {
    let (mut dispatcher, _) = setup(NetworkId::Abstract, 3);
    dispatcher.select_network(NetworkId::Abstract).await.unwrap();
    let record = dispatcher.dispatch().await.unwrap();

    let link = record.explorer_link().unwrap();
    assert!(link.ends_with(&record.identifier));
    assert!(record.to_string().starts_with("Hash: 0x"));
    assert_eq!(dispatcher.history().latest().unwrap().sequence, 3);
}

#[tokio::test]
async fn test_sentinel_selection_refuses_dispatch() {
    let (mut dispatcher, _) = setup(NetworkId::MegaEth, 0);
    assert!(dispatcher
        .select_network(NetworkId::Select)
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        dispatcher.dispatch().await.unwrap_err(),
        PoolError::NoNetworkSelected
    );
}
