//! Pool Manager Module
//!
//! Pre-signed operation pool for one active network:
//! - `pool_store`: the append-only entry run, cursor and refill flags
//! - `pool_refill`: half-batch trigger, single-flight extend, outcome channel
//! - `pool_errors`: pool error taxonomy

// Submodules
pub mod pool_errors;
pub mod pool_refill;
pub mod pool_store;

// Re-exports for convenience
pub use pool_errors::{PoolError, PoolResult};
pub use pool_refill::{extend, RefillEvent, RefillOutcome, RefillScheduler};
pub use pool_store::{init_pool, sign_batch, Pool, PoolEntry, PoolStatus, SharedPool};
