//! Transaction builder for pre-authorized operations
//!
//! ## Architecture
//!
//! - **errors**: signing error taxonomy
//! - **fee**: per-network pricing policy (live quote with static fallback)
//! - **signer**: `OperationSigner` capability and the local-key EIP-1559 signer
//!
//! Every pooled operation is a zero-value EIP-1559 call to the network's
//! benchmark contract with the `update()` selector. Signing happens ahead of
//! time, so the only thing left on the measured path is the raw submission.

// Public API - Error types
pub mod errors;
pub use errors::TransactionBuilderError;

pub mod fee;
pub mod signer;

pub use fee::{FeeSchedule, PriceSource, PricingPolicy};
pub use signer::{Eip1559Signer, OperationRequest, OperationSigner, SignedPayload};
