//! Test Utilities Module
//!
//! In-memory stand-ins for the network collaborators so the pool, refill
//! scheduler and dispatcher can be driven deterministically without a node.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use alloy::primitives::Address;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::rpc_manager::{ChainRpc, Client, ClientFactory, RpcManagerError, RpcResult};
use crate::tx_builder::{OperationRequest, OperationSigner, SignedPayload, TransactionBuilderError};
use crate::types::{NetworkDescriptor, NetworkId, GWEI};

/// Deterministic payload: chain id then sequence, both big-endian
pub fn mock_payload(chain_id: u64, sequence: u64) -> SignedPayload {
    let mut bytes = Vec::with_capacity(16);
    bytes.extend_from_slice(&chain_id.to_be_bytes());
    bytes.extend_from_slice(&sequence.to_be_bytes());
    SignedPayload::new(bytes)
}

/// Inverse of `mock_payload`
pub fn decode_mock_payload(payload: &SignedPayload) -> Option<(u64, u64)> {
    let bytes = payload.as_bytes();
    if bytes.len() != 16 {
        return None;
    }
    let chain_id = u64::from_be_bytes(bytes[..8].try_into().ok()?);
    let sequence = u64::from_be_bytes(bytes[8..].try_into().ok()?);
    Some((chain_id, sequence))
}

/// Mock JSON-RPC transport
///
/// Submissions succeed with a hash derived from the payload's sequence unless
/// that sequence was marked as failing.
#[derive(Debug)]
pub struct MockRpc {
    next_sequence: u64,
    fee_rate: Option<u128>,
    fail_sequence: bool,
    failing_submits: Mutex<HashSet<u64>>,
    submitted: Mutex<Vec<u64>>,
}

impl MockRpc {
    /// Transport whose account nonce starts at `next_sequence`, quoting 1 gwei
    pub fn new(next_sequence: u64) -> Self {
        Self {
            next_sequence,
            fee_rate: Some(GWEI),
            fail_sequence: false,
            failing_submits: Mutex::new(HashSet::new()),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fee_rate(mut self, fee_rate: u128) -> Self {
        self.fee_rate = Some(fee_rate);
        self
    }

    /// Every `eth_gasPrice` call fails
    pub fn with_failing_fee_rate(mut self) -> Self {
        self.fee_rate = None;
        self
    }

    /// Every `eth_getTransactionCount` call fails
    pub fn with_failing_sequence(mut self) -> Self {
        self.fail_sequence = true;
        self
    }

    /// Reject the submission carrying `sequence`
    pub fn with_failing_submit(self, sequence: u64) -> Self {
        self.failing_submits.lock().insert(sequence);
        self
    }

    /// Sequences seen by `submit`, in call order
    pub fn submitted_sequences(&self) -> Vec<u64> {
        self.submitted.lock().clone()
    }

    pub fn identifier_for(sequence: u64) -> String {
        format!("0x{:064x}", sequence)
    }
}

#[async_trait]
impl ChainRpc for MockRpc {
    fn endpoint(&self) -> &str {
        "mock://rpc"
    }

    async fn next_sequence(&self, _address: Address) -> RpcResult<u64> {
        if self.fail_sequence {
            return Err(RpcManagerError::Transport {
                endpoint: self.endpoint().to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(self.next_sequence)
    }

    async fn live_fee_rate(&self) -> RpcResult<u128> {
        self.fee_rate.ok_or_else(|| RpcManagerError::Timeout {
            endpoint: self.endpoint().to_string(),
            timeout_ms: 10_000,
        })
    }

    async fn submit(&self, _method: &str, payload: &SignedPayload) -> RpcResult<String> {
        let (_, sequence) = decode_mock_payload(payload).ok_or_else(|| {
            RpcManagerError::InvalidResponse {
                endpoint: self.endpoint().to_string(),
                message: "unrecognized payload".to_string(),
            }
        })?;
        self.submitted.lock().push(sequence);
        if self.failing_submits.lock().contains(&sequence) {
            return Err(RpcManagerError::RpcResponse {
                endpoint: self.endpoint().to_string(),
                message: "nonce too low".to_string(),
                code: Some(-32000),
            });
        }
        Ok(Self::identifier_for(sequence))
    }
}

/// Mock signer
///
/// Records every sequence it is asked to sign. Can hold signing calls for
/// sequences at or above a threshold until `release` is called, and can fail
/// calls at or above another threshold.
#[derive(Debug)]
pub struct MockSigner {
    address: Address,
    signed: Mutex<Vec<u64>>,
    gate_from: Option<u64>,
    gate: watch::Sender<bool>,
    blocked: watch::Sender<usize>,
    fail_from: AtomicU64,
}

impl MockSigner {
    pub fn new() -> Self {
        Self {
            address: Address::repeat_byte(0x11),
            signed: Mutex::new(Vec::new()),
            gate_from: None,
            gate: watch::Sender::new(true),
            blocked: watch::Sender::new(0),
            fail_from: AtomicU64::new(u64::MAX),
        }
    }

    /// Signer that holds sequences `>= sequence` until released
    pub fn gated_from(sequence: u64) -> Self {
        Self {
            gate_from: Some(sequence),
            gate: watch::Sender::new(false),
            ..Self::new()
        }
    }

    /// Signer that fails sequences `>= sequence`
    pub fn failing_from(sequence: u64) -> Self {
        let signer = Self::new();
        signer.set_fail_from(Some(sequence));
        signer
    }

    pub fn set_fail_from(&self, sequence: Option<u64>) {
        self.fail_from
            .store(sequence.unwrap_or(u64::MAX), Ordering::SeqCst);
    }

    /// Open the gate for every held and future call
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Resolve once at least one signing call is held at the gate
    pub async fn wait_until_blocked(&self) {
        let mut rx = self.blocked.subscribe();
        let _ = rx.wait_for(|held| *held > 0).await;
    }

    /// Sequences passed to `sign`, in call order
    pub fn signed_sequences(&self) -> Vec<u64> {
        self.signed.lock().clone()
    }
}

impl Default for MockSigner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OperationSigner for MockSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, request: &OperationRequest) -> Result<SignedPayload, TransactionBuilderError> {
        self.signed.lock().push(request.sequence);

        if self.gate_from.is_some_and(|from| request.sequence >= from) {
            let mut rx = self.gate.subscribe();
            self.blocked.send_modify(|held| *held += 1);
            let _ = rx.wait_for(|open| *open).await;
        }

        if request.sequence >= self.fail_from.load(Ordering::SeqCst) {
            return Err(TransactionBuilderError::signing_failed(format!(
                "identity locked at sequence {}",
                request.sequence
            )));
        }
        Ok(mock_payload(request.chain_id, request.sequence))
    }
}

/// Factory handing out clients over mock transports
pub struct MockClientFactory {
    signer: Arc<MockSigner>,
    networks: HashMap<NetworkId, Arc<MockRpc>>,
    connects: Mutex<HashMap<NetworkId, usize>>,
}

impl MockClientFactory {
    pub fn new(signer: Arc<MockSigner>) -> Self {
        Self {
            signer,
            networks: HashMap::new(),
            connects: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_network(mut self, network: NetworkId, rpc: Arc<MockRpc>) -> Self {
        self.networks.insert(network, rpc);
        self
    }

    /// Number of clients built for `network`
    pub fn connect_count(&self, network: NetworkId) -> usize {
        self.connects.lock().get(&network).copied().unwrap_or(0)
    }
}

impl ClientFactory for MockClientFactory {
    fn connect(&self, descriptor: &'static NetworkDescriptor, epoch: u64) -> RpcResult<Client> {
        let rpc = self.networks.get(&descriptor.id).ok_or_else(|| {
            RpcManagerError::Configuration(format!("no mock transport for {}", descriptor.id))
        })?;
        *self.connects.lock().entry(descriptor.id).or_insert(0) += 1;
        Ok(Client::new(
            descriptor,
            Arc::clone(rpc) as Arc<dyn ChainRpc>,
            Arc::clone(&self.signer) as Arc<dyn OperationSigner>,
            epoch,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_payload_decodes() {
        let payload = mock_payload(6342, 42);
        assert_eq!(decode_mock_payload(&payload), Some((6342, 42)));
        assert_eq!(decode_mock_payload(&SignedPayload::new(vec![1u8, 2])), None);
    }

    #[tokio::test]
    async fn test_mock_rpc_failing_submit() {
        let rpc = MockRpc::new(0).with_failing_submit(3);
        assert!(rpc.submit("m", &mock_payload(1, 2)).await.is_ok());
        let err = rpc.submit("m", &mock_payload(1, 3)).await.unwrap_err();
        assert_eq!(err.category(), "rpc_response");
        assert_eq!(rpc.submitted_sequences(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_gated_signer_holds_until_release() {
        let signer = Arc::new(MockSigner::gated_from(5));
        let request = |sequence| OperationRequest {
            chain_id: 1,
            destination: Address::repeat_byte(0x22),
            selector: crate::types::UPDATE_SELECTOR,
            sequence,
            fees: crate::tx_builder::PricingPolicy::fallback_schedule(NetworkId::Rise),
        };

        // Below the gate signs immediately
        signer.sign(&request(4)).await.unwrap();

        let held = {
            let signer = Arc::clone(&signer);
            tokio::spawn(async move { signer.sign(&request(5)).await })
        };
        signer.wait_until_blocked().await;
        assert!(!held.is_finished());
        signer.release();
        assert!(held.await.unwrap().is_ok());
        assert_eq!(signer.signed_sequences(), vec![4, 5]);
    }
}
