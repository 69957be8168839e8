//! Structured logging for pool lifecycle and dispatch events

use crate::types::NetworkId;

/// Structured logger for pool events
///
/// Every event carries the session context id so that a run against one
/// network can be followed across the dispatcher and the refill task.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    context_id: String,
}

impl StructuredLogger {
    pub fn new(context_id: String) -> Self {
        Self { context_id }
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn log_network_switch(&self, from: NetworkId, to: NetworkId, epoch: u64) {
        tracing::info!(
            context_id = %self.context_id,
            from = %from,
            to = %to,
            epoch = epoch,
            "Network switched"
        );
    }

    pub fn log_pool_initialized(
        &self,
        network: NetworkId,
        base_sequence: u64,
        count: usize,
        fee_rate: u128,
        max_cost_wei: u128,
    ) {
        tracing::info!(
            context_id = %self.context_id,
            network = %network,
            base_sequence = base_sequence,
            count = count,
            fee_rate = %fee_rate,
            max_cost_wei = %max_cost_wei,
            "✅ Pre-signed pool initialized"
        );
    }

    pub fn log_refill_triggered(&self, network: NetworkId, cursor: usize, length: usize) {
        tracing::info!(
            context_id = %self.context_id,
            network = %network,
            cursor = cursor,
            length = length,
            "🔔 Triggering refill"
        );
    }

    pub fn log_refill_completed(&self, network: NetworkId, first_sequence: u64, count: usize, total: usize) {
        tracing::info!(
            context_id = %self.context_id,
            network = %network,
            first_sequence = first_sequence,
            count = count,
            total = total,
            "✅ Extended pool"
        );
    }

    pub fn log_refill_failed(&self, network: NetworkId, error: &str) {
        tracing::warn!(
            context_id = %self.context_id,
            network = %network,
            error = %error,
            "❌ Failed to extend pool"
        );
    }

    pub fn log_dispatch_success(&self, network: NetworkId, sequence: u64, identifier: &str, latency_ms: u64, correlation_id: &str) {
        tracing::info!(
            context_id = %self.context_id,
            correlation_id = %correlation_id,
            network = %network,
            sequence = sequence,
            identifier = %identifier,
            latency_ms = latency_ms,
            "Dispatch successful"
        );
    }

    pub fn log_dispatch_failure(&self, network: NetworkId, sequence: u64, error: &str, latency_ms: u64, correlation_id: &str) {
        tracing::warn!(
            context_id = %self.context_id,
            correlation_id = %correlation_id,
            network = %network,
            sequence = sequence,
            error = %error,
            latency_ms = latency_ms,
            "Dispatch failed"
        );
    }
}
