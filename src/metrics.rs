//! Metrics collection and export module

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Dispatch counters
    pub dispatch_total: IntCounter,
    pub dispatch_success: IntCounter,
    pub dispatch_failed: IntCounter,
    pub dispatch_exhausted: IntCounter,

    // Refill counters
    pub refill_triggered: IntCounter,
    pub refill_completed: IntCounter,
    pub refill_failed: IntCounter,
    pub refill_discarded: IntCounter,

    // Signing / pricing
    pub operations_signed: IntCounter,
    pub price_fallbacks: IntCounter,

    // Gauges
    pub pool_length: IntGauge,
    pub pool_available: IntGauge,

    // Histograms
    pub submit_latency: Histogram,
    pub sign_batch_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let dispatch_total = IntCounter::with_opts(Opts::new(
            "dispatch_total",
            "Total number of dispatch attempts",
        ))?;
        let dispatch_success = IntCounter::with_opts(Opts::new(
            "dispatch_success",
            "Number of pre-signed operations accepted by the endpoint",
        ))?;
        let dispatch_failed = IntCounter::with_opts(Opts::new(
            "dispatch_failed",
            "Number of submissions rejected or failed (sequence spent)",
        ))?;
        let dispatch_exhausted = IntCounter::with_opts(Opts::new(
            "dispatch_exhausted",
            "Dispatches refused because the pool was empty",
        ))?;

        let refill_triggered = IntCounter::with_opts(Opts::new(
            "refill_triggered",
            "Refills scheduled at a half-batch boundary",
        ))?;
        let refill_completed = IntCounter::with_opts(Opts::new(
            "refill_completed",
            "Refills appended to the pool",
        ))?;
        let refill_failed =
            IntCounter::with_opts(Opts::new("refill_failed", "Refills that failed to sign"))?;
        let refill_discarded = IntCounter::with_opts(Opts::new(
            "refill_discarded",
            "Refill results dropped because the pool was retired",
        ))?;

        let operations_signed = IntCounter::with_opts(Opts::new(
            "operations_signed",
            "Number of operations pre-signed",
        ))?;
        let price_fallbacks = IntCounter::with_opts(Opts::new(
            "price_fallbacks",
            "Fee schedules taken from the static fallback table",
        ))?;

        let pool_length = IntGauge::with_opts(Opts::new(
            "pool_length",
            "Entries in the active pool (consumed and unconsumed)",
        ))?;
        let pool_available = IntGauge::with_opts(Opts::new(
            "pool_available",
            "Unconsumed entries in the active pool",
        ))?;

        let submit_latency = Histogram::with_opts(
            HistogramOpts::new("submit_latency_seconds", "Raw submission latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0]),
        )?;
        let sign_batch_latency = Histogram::with_opts(
            HistogramOpts::new("sign_batch_latency_seconds", "Time to sign one batch")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(dispatch_total.clone()))?;
        registry.register(Box::new(dispatch_success.clone()))?;
        registry.register(Box::new(dispatch_failed.clone()))?;
        registry.register(Box::new(dispatch_exhausted.clone()))?;
        registry.register(Box::new(refill_triggered.clone()))?;
        registry.register(Box::new(refill_completed.clone()))?;
        registry.register(Box::new(refill_failed.clone()))?;
        registry.register(Box::new(refill_discarded.clone()))?;
        registry.register(Box::new(operations_signed.clone()))?;
        registry.register(Box::new(price_fallbacks.clone()))?;
        registry.register(Box::new(pool_length.clone()))?;
        registry.register(Box::new(pool_available.clone()))?;
        registry.register(Box::new(submit_latency.clone()))?;
        registry.register(Box::new(sign_batch_latency.clone()))?;

        Ok(Self {
            registry,
            dispatch_total,
            dispatch_success,
            dispatch_failed,
            dispatch_exhausted,
            refill_triggered,
            refill_completed,
            refill_failed,
            refill_discarded,
            operations_signed,
            price_fallbacks,
            pool_length,
            pool_available,
            submit_latency,
            sign_batch_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition of every registered metric
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Update the pool gauges
    pub fn set_pool(&self, length: usize, available: usize) {
        self.pool_length.set(length as i64);
        self.pool_available.set(available as i64);
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.start.elapsed().as_secs_f64());
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_render_contains_registered_names() {
        let m = Metrics::new().unwrap();
        m.dispatch_total.inc();
        m.set_pool(20, 15);
        let text = m.render();
        assert!(text.contains("dispatch_total 1"));
        assert!(text.contains("pool_available 15"));
        assert!(text.contains("refill_triggered"));
    }

    #[test]
    fn test_timer_observes() {
        let m = Metrics::new().unwrap();
        let timer = Timer::new();
        timer.observe_duration(&m.submit_latency);
        assert_eq!(m.submit_latency.get_sample_count(), 1);
    }
}
