//! Realtime Bench - pre-signed transaction pool for low-latency endpoint benchmarks
//!
//! Signs batches of EIP-1559 operations ahead of time so that a measured
//! submission only covers the raw send, and refills the batch in the
//! background as it is consumed.

pub mod config;
pub mod dispatcher;
pub mod endpoints;
pub mod metrics;
pub mod observability;
pub mod structured_logging;
pub mod test_utils;
pub mod tx_builder;
pub mod types;
pub mod wallet;

// Component modules with non-standard paths (directories with spaces)
#[path = "rpc manager/mod.rs"]
pub mod rpc_manager;

#[path = "pool manager/mod.rs"]
pub mod pool_manager;

// Re-export commonly used types
pub use dispatcher::{Dispatcher, DispatcherSettings};
pub use pool_manager::{PoolError, PoolStatus};
pub use types::{ExecutionRecord, NetworkId};
