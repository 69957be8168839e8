//! EIP-1559 signing of pre-authorized operations
//!
//! Every pooled operation is the same zero-value call to the network's
//! benchmark contract; only the sequence number and the fee schedule vary.

use super::errors::TransactionBuilderError;
use super::fee::FeeSchedule;
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use std::fmt;

/// Everything the signer needs for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationRequest {
    pub chain_id: u64,
    pub destination: Address,
    pub selector: [u8; 4],
    pub sequence: u64,
    pub fees: FeeSchedule,
}

/// Opaque ready-to-send payload (EIP-2718 encoded signed transaction)
#[derive(Clone, PartialEq, Eq)]
pub struct SignedPayload(Bytes);

impl SignedPayload {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 0x-prefixed hex, as expected by the raw-transaction endpoints
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for SignedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignedPayload({} bytes)", self.0.len())
    }
}

/// Signing capability
#[async_trait]
pub trait OperationSigner: Send + Sync + fmt::Debug {
    /// Address of the signing identity
    fn address(&self) -> Address;

    async fn sign(
        &self,
        request: &OperationRequest,
    ) -> Result<SignedPayload, TransactionBuilderError>;
}

/// Local-key EIP-1559 signer
pub struct Eip1559Signer {
    address: Address,
    wallet: EthereumWallet,
}

impl Eip1559Signer {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self {
            address: signer.address(),
            wallet: EthereumWallet::from(signer),
        }
    }
}

impl fmt::Debug for Eip1559Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Eip1559Signer")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl OperationSigner for Eip1559Signer {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(
        &self,
        request: &OperationRequest,
    ) -> Result<SignedPayload, TransactionBuilderError> {
        if request.fees.gas_limit == 0 {
            return Err(TransactionBuilderError::signing_failed("gas limit is zero"));
        }
        if request.destination == Address::ZERO {
            return Err(TransactionBuilderError::Configuration(
                "destination address is zero".to_string(),
            ));
        }

        let tx = TransactionRequest::default()
            .with_from(self.address)
            .with_to(request.destination)
            .with_input(Bytes::copy_from_slice(&request.selector))
            .with_chain_id(request.chain_id)
            .with_nonce(request.sequence)
            .with_gas_limit(request.fees.gas_limit)
            .with_max_fee_per_gas(request.fees.max_fee_per_gas)
            .with_max_priority_fee_per_gas(request.fees.max_priority_fee_per_gas)
            .with_value(U256::ZERO);

        let envelope = tx.build(&self.wallet).await.map_err(|err| {
            TransactionBuilderError::signing_failed(format!(
                "sequence {} on chain {}: {}",
                request.sequence, request.chain_id, err
            ))
        })?;

        Ok(SignedPayload::new(envelope.encoded_2718()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx_builder::fee::PriceSource;
    use crate::types::{NetworkId, GWEI};
    use alloy::consensus::{Transaction, TxEnvelope};
    use alloy::eips::eip2718::Decodable2718;

    // Foundry's first default account; public test key only.
    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn request(sequence: u64) -> OperationRequest {
        let descriptor = NetworkId::MegaEth.descriptor();
        OperationRequest {
            chain_id: descriptor.chain_id,
            destination: descriptor.destination,
            selector: descriptor.payload_selector,
            sequence,
            fees: FeeSchedule::new(20 * GWEI, 100_000, PriceSource::Fallback),
        }
    }

    fn signer() -> Eip1559Signer {
        Eip1559Signer::new(TEST_KEY.parse().unwrap())
    }

    #[test]
    fn test_signer_address() {
        assert_eq!(
            format!("{:#x}", signer().address()),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[tokio::test]
    async fn test_signed_payload_decodes_to_request() {
        let payload = signer().sign(&request(42)).await.unwrap();
        assert!(payload.to_hex().starts_with("0x02"));

        let mut raw = payload.as_bytes();
        let envelope = TxEnvelope::decode_2718(&mut raw).unwrap();
        assert_eq!(envelope.nonce(), 42);
        assert_eq!(envelope.chain_id(), Some(6342));
        assert_eq!(envelope.gas_limit(), 100_000);
        assert_eq!(envelope.max_fee_per_gas(), 20 * GWEI);
        assert_eq!(envelope.max_priority_fee_per_gas(), Some(2 * GWEI));
        assert_eq!(envelope.input().as_ref(), &[0xa2, 0xe6, 0x20, 0x45]);
    }

    #[tokio::test]
    async fn test_distinct_sequences_give_distinct_payloads() {
        let s = signer();
        let a = s.sign(&request(1)).await.unwrap();
        let b = s.sign(&request(2)).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_zero_gas_limit_rejected() {
        let mut req = request(1);
        req.fees.gas_limit = 0;
        let err = signer().sign(&req).await.unwrap_err();
        assert!(matches!(err, TransactionBuilderError::Signing(_)));
    }

    #[test]
    fn test_payload_debug_hides_bytes() {
        let payload = SignedPayload::new(vec![1u8, 2, 3]);
        assert_eq!(format!("{:?}", payload), "SignedPayload(3 bytes)");
        assert_eq!(payload.to_hex(), "0x010203");
    }
}
