//! Per-network pricing policy
//!
//! Live path: `eth_gasPrice` through the network client, transformed by the
//! network's fee rule. Fallback path: the network's constant schedule. The
//! policy never fails; initialization and refill both price through
//! `price_for` so batches signed at different times follow the same rules.

use crate::metrics::metrics;
use crate::rpc_manager::Client;
use crate::types::NetworkId;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Where a fee schedule came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    /// Derived from a live quote (wei per gas)
    Live { quoted: u128 },
    /// Static fallback table
    Fallback,
}

/// Fees every operation of one batch is signed with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub gas_limit: u64,
    pub source: PriceSource,
}

impl FeeSchedule {
    /// Schedule with a 10% priority tip
    pub fn new(fee_rate: u128, gas_limit: u64, source: PriceSource) -> Self {
        Self {
            max_fee_per_gas: fee_rate,
            max_priority_fee_per_gas: fee_rate / 10,
            gas_limit,
            source,
        }
    }

    pub fn fee_rate(&self) -> u128 {
        self.max_fee_per_gas
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.source, PriceSource::Fallback)
    }

    /// Upper bound on the cost of `count` operations, in wei
    pub fn max_cost_wei(&self, count: usize) -> u128 {
        (self.gas_limit as u128)
            .saturating_mul(self.max_fee_per_gas)
            .saturating_mul(count as u128)
    }
}

/// Pricing policy over the static network tables
#[derive(Debug, Default)]
pub struct PricingPolicy {
    fallbacks: AtomicU64,
}

impl PricingPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule derived from a live quote
    pub fn live_schedule(network: NetworkId, live_fee_rate: u128) -> FeeSchedule {
        let rule = network.descriptor().fee_rule;
        FeeSchedule::new(
            rule.apply(live_fee_rate),
            rule.gas_limit,
            PriceSource::Live {
                quoted: live_fee_rate,
            },
        )
    }

    /// Constant schedule used when the live quote is unavailable
    pub fn fallback_schedule(network: NetworkId) -> FeeSchedule {
        let fallback = network.descriptor().fee_fallback;
        FeeSchedule::new(fallback.fee_rate, fallback.gas_limit, PriceSource::Fallback)
    }

    /// Price a batch for `client`'s network
    pub async fn price_for(&self, client: &Client) -> FeeSchedule {
        let network = client.network();
        match client.live_fee_rate().await {
            Ok(live) => {
                let schedule = Self::live_schedule(network, live);
                debug!(
                    network = %network,
                    quoted = live,
                    fee_rate = schedule.fee_rate(),
                    gas_limit = schedule.gas_limit,
                    "Live fee schedule"
                );
                schedule
            }
            Err(e) => {
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                metrics().price_fallbacks.inc();
                let schedule = Self::fallback_schedule(network);
                warn!(
                    network = %network,
                    error = %e,
                    fee_rate = schedule.fee_rate(),
                    gas_limit = schedule.gas_limit,
                    "⚠️ Failed to get gas price, using fallback"
                );
                schedule
            }
        }
    }

    /// Number of times the fallback table was used
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }
}
