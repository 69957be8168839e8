//! Common types used throughout the application
//!
//! Holds the static network table, the fee rules attached to each network and
//! the execution records produced by the dispatcher.

use alloy::primitives::{address, Address};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use crate::observability::CorrelationId;

/// 1 gwei in wei
pub const GWEI: u128 = 1_000_000_000;

/// Selector of the `update()` function on the benchmark contracts
pub const UPDATE_SELECTOR: [u8; 4] = [0xa2, 0xe6, 0x20, 0x45];

/// Network identifier
///
/// `Select` is the "no network selected" sentinel: it has a descriptor (so the
/// CLI can list it) but never gets a client or a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    Select,
    MegaEth,
    Rise,
    Abstract,
}

impl NetworkId {
    /// All networks, sentinel first
    pub const ALL: [NetworkId; 4] = [
        NetworkId::Select,
        NetworkId::MegaEth,
        NetworkId::Rise,
        NetworkId::Abstract,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkId::Select => "select",
            NetworkId::MegaEth => "megaeth",
            NetworkId::Rise => "rise",
            NetworkId::Abstract => "abstract",
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, NetworkId::Select)
    }

    /// Static descriptor for this network
    pub fn descriptor(&self) -> &'static NetworkDescriptor {
        match self {
            NetworkId::Select => &NETWORKS[0],
            NetworkId::MegaEth => &NETWORKS[1],
            NetworkId::Rise => &NETWORKS[2],
            NetworkId::Abstract => &NETWORKS[3],
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "select" | "none" => Ok(NetworkId::Select),
            "megaeth" => Ok(NetworkId::MegaEth),
            "rise" => Ok(NetworkId::Rise),
            "abstract" => Ok(NetworkId::Abstract),
            other => Err(format!(
                "unknown network '{}' (expected one of: megaeth, rise, abstract)",
                other
            )),
        }
    }
}

/// Transformation applied to a live fee rate
///
/// `fee_rate = live * numerator / denominator`, signed with `gas_limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeRule {
    pub numerator: u128,
    pub denominator: u128,
    pub gas_limit: u64,
}

impl FeeRule {
    pub const fn new(numerator: u128, denominator: u128, gas_limit: u64) -> Self {
        Self {
            numerator,
            denominator,
            gas_limit,
        }
    }

    /// Apply the rule to a live fee rate
    pub fn apply(&self, live_fee_rate: u128) -> u128 {
        if self.denominator == 0 {
            return live_fee_rate;
        }
        live_fee_rate.saturating_mul(self.numerator) / self.denominator
    }
}

/// Constant fee schedule used when the live query fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackFee {
    pub fee_rate: u128,
    pub gas_limit: u64,
}

/// Immutable description of a benchmark network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDescriptor {
    pub id: NetworkId,
    pub name: &'static str,
    pub chain_id: u64,
    /// JSON-RPC method of the low-latency submission endpoint
    pub endpoint_method: &'static str,
    pub rpc_url: &'static str,
    /// Prefix of the explorer transaction page; the identifier is appended
    pub explorer_tx_url: &'static str,
    /// Benchmark contract receiving every pre-signed operation
    pub destination: Address,
    pub payload_selector: [u8; 4],
    pub fee_rule: FeeRule,
    pub fee_fallback: FallbackFee,
}

impl NetworkDescriptor {
    /// Explorer link for a transaction identifier, if the network has an explorer
    pub fn explorer_link(&self, identifier: &str) -> Option<String> {
        if self.explorer_tx_url.is_empty() {
            return None;
        }
        Some(format!("{}{}", self.explorer_tx_url, identifier))
    }
}

/// Static network table
pub static NETWORKS: [NetworkDescriptor; 4] = [
    NetworkDescriptor {
        id: NetworkId::Select,
        name: "Select Network",
        chain_id: 0,
        endpoint_method: "",
        rpc_url: "",
        explorer_tx_url: "",
        destination: Address::ZERO,
        payload_selector: UPDATE_SELECTOR,
        fee_rule: FeeRule::new(1, 2, 50_000),
        fee_fallback: FallbackFee {
            fee_rate: GWEI,
            gas_limit: 50_000,
        },
    },
    NetworkDescriptor {
        id: NetworkId::MegaEth,
        name: "MegaETH",
        chain_id: 6342,
        endpoint_method: "realtime_sendRawTransaction",
        rpc_url: "https://carrot.megaeth.com/rpc",
        explorer_tx_url: "https://www.megaexplorer.xyz/tx/",
        destination: address!("0D0ba0Ea8d031d093eA36c1A1176B066Fd08fadB"),
        payload_selector: UPDATE_SELECTOR,
        fee_rule: FeeRule::new(1, 1, 100_000),
        fee_fallback: FallbackFee {
            fee_rate: GWEI,
            gas_limit: 50_000,
        },
    },
    NetworkDescriptor {
        id: NetworkId::Rise,
        name: "RISE",
        chain_id: 11_155_931,
        endpoint_method: "eth_sendRawTransactionSync",
        rpc_url: "https://testnet.riselabs.xyz/",
        explorer_tx_url: "https://explorer.testnet.riselabs.xyz/tx/",
        destination: address!("06dA3169CfEA164E8308b5977D89E296e75FB62D"),
        payload_selector: UPDATE_SELECTOR,
        fee_rule: FeeRule::new(1, 10, 50_000),
        fee_fallback: FallbackFee {
            fee_rate: GWEI / 10,
            gas_limit: 50_000,
        },
    },
    NetworkDescriptor {
        id: NetworkId::Abstract,
        name: "Abstract",
        chain_id: 11_124,
        endpoint_method: "zks_sendRawTransactionWithDetailedOutput",
        rpc_url: "https://api.testnet.abs.xyz",
        explorer_tx_url: "https://explorer.testnet.abs.xyz/tx/",
        destination: address!("67106EaCAf99c93DB14921b9577098eB24369592"),
        payload_selector: UPDATE_SELECTOR,
        fee_rule: FeeRule::new(1, 1, 200_000),
        fee_fallback: FallbackFee {
            fee_rate: 50 * GWEI,
            gas_limit: 200_000,
        },
    },
];

/// Result of one successful dispatch
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub network: NetworkId,
    /// Identifier returned by the submission endpoint (transaction hash)
    pub identifier: String,
    pub sequence: u64,
    pub elapsed_ms: u64,
    pub correlation_id: CorrelationId,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn explorer_link(&self) -> Option<String> {
        self.network.descriptor().explorer_link(&self.identifier)
    }
}

impl fmt::Display for ExecutionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Hash: {}\nTime: {}ms",
            self.identifier, self.elapsed_ms
        )
    }
}

/// Bounded execution history, newest last
#[derive(Debug, Clone)]
pub struct ExecutionHistory {
    records: VecDeque<ExecutionRecord>,
    capacity: usize,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Append a record, evicting the oldest beyond capacity
    pub fn push(&mut self, record: ExecutionRecord) {
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.records.iter()
    }

    pub fn latest(&self) -> Option<&ExecutionRecord> {
        self.records.back()
    }

    /// Mean elapsed time per network over the retained records
    pub fn mean_elapsed_ms(&self, network: NetworkId) -> Option<f64> {
        let (sum, count) = self
            .records
            .iter()
            .filter(|r| r.network == network)
            .fold((0u64, 0u64), |(s, c), r| (s + r.elapsed_ms, c + 1));
        if count == 0 {
            None
        } else {
            Some(sum as f64 / count as f64)
        }
    }
}
