//! Pre-signed pool store
//!
//! The pool is an append-only run of signed operations with contiguous
//! sequence numbers (`entries[i].sequence == base_sequence + i`) and a
//! consumption cursor that only moves forward. Refill state lives next to the
//! entries so that the arm/begin/finish transitions happen under the same lock
//! as the reads they depend on.

use super::pool_errors::{PoolError, PoolResult};
use crate::metrics::{metrics, Timer};
use crate::rpc_manager::Client;
use crate::tx_builder::{FeeSchedule, PricingPolicy, SignedPayload, TransactionBuilderError};
use crate::types::NetworkId;
use futures::future::try_join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// One signed, ready-to-submit operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEntry {
    pub sequence: u64,
    pub payload: SignedPayload,
}

/// Point-in-time view of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub network: NetworkId,
    pub epoch: u64,
    pub base_sequence: u64,
    pub length: usize,
    pub cursor: usize,
    pub available: usize,
    pub refilling: bool,
    pub refill_armed: bool,
    pub retired: bool,
}

/// Pool shared between the dispatcher and its refill task
pub type SharedPool = Arc<Mutex<Pool>>;

/// Pre-signed operations for one network selection
#[derive(Debug)]
pub struct Pool {
    network: NetworkId,
    epoch: u64,
    batch_size: usize,
    base_sequence: u64,
    entries: Vec<PoolEntry>,
    cursor: usize,
    refilling: bool,
    refill_armed: bool,
    retired: bool,
}

impl Pool {
    /// Build a pool from an initial batch, checking contiguity
    pub fn new(
        network: NetworkId,
        epoch: u64,
        base_sequence: u64,
        batch_size: usize,
        entries: Vec<PoolEntry>,
    ) -> PoolResult<Self> {
        check_contiguous(base_sequence, &entries)?;
        Ok(Self {
            network,
            epoch,
            batch_size,
            base_sequence,
            entries,
            cursor: 0,
            refilling: false,
            refill_armed: false,
            retired: false,
        })
    }

    pub fn into_shared(self) -> SharedPool {
        Arc::new(Mutex::new(self))
    }

    pub fn network(&self) -> NetworkId {
        self.network
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn base_sequence(&self) -> u64 {
        self.base_sequence
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Unconsumed entries
    pub fn available(&self) -> usize {
        self.entries.len() - self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor == self.entries.len()
    }

    pub fn is_refilling(&self) -> bool {
        self.refilling
    }

    pub fn is_refill_armed(&self) -> bool {
        self.refill_armed
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Sequence number the next appended entry must carry
    pub fn next_sequence(&self) -> u64 {
        self.base_sequence + self.entries.len() as u64
    }

    /// Cursor distance between refill triggers
    pub fn refill_threshold(&self) -> usize {
        (self.batch_size / 2).max(1)
    }

    pub fn entry(&self, index: usize) -> Option<&PoolEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            network: self.network,
            epoch: self.epoch,
            base_sequence: self.base_sequence,
            length: self.entries.len(),
            cursor: self.cursor,
            available: self.available(),
            refilling: self.refilling,
            refill_armed: self.refill_armed,
            retired: self.retired,
        }
    }

    /// Take the entry at the cursor and advance past it
    ///
    /// `None` when every entry has been consumed. No I/O, never fails.
    pub fn consume(&mut self) -> Option<PoolEntry> {
        let entry = self.entries.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(entry)
    }

    /// Append a contiguous batch
    pub fn append(&mut self, batch: Vec<PoolEntry>) -> PoolResult<usize> {
        check_contiguous(self.next_sequence(), &batch)?;
        let count = batch.len();
        self.entries.extend(batch);
        Ok(count)
    }

    /// Arm a refill if the cursor sits on a half-batch boundary
    ///
    /// A drained pool also arms, so a refill that failed after the last
    /// boundary is retried on the next dispatch attempt. Returns `true`
    /// exactly when the caller must schedule an extend.
    pub fn arm_refill(&mut self) -> bool {
        if self.retired || self.refill_armed || self.cursor == 0 {
            return false;
        }
        if self.cursor % self.refill_threshold() != 0 && !self.is_exhausted() {
            return false;
        }
        self.refill_armed = true;
        true
    }

    /// Enter the single-flight section, returning the next sequence base
    ///
    /// `None` if a refill is already running or the pool was retired.
    pub fn begin_refill(&mut self) -> Option<u64> {
        if self.refilling || self.retired {
            return None;
        }
        self.refilling = true;
        Some(self.next_sequence())
    }

    /// Leave the single-flight section after a successful signing round
    pub fn finish_refill(&mut self, batch: Vec<PoolEntry>) -> PoolResult<usize> {
        self.refilling = false;
        self.refill_armed = false;
        self.append(batch)
    }

    /// Leave the single-flight section after a failure; a later boundary may retry
    pub fn abort_refill(&mut self) {
        self.refilling = false;
        self.refill_armed = false;
    }

    /// Mark the pool as replaced; it accepts no further appends or refills
    pub fn retire(&mut self) {
        self.retired = true;
    }
}

fn check_contiguous(first: u64, batch: &[PoolEntry]) -> PoolResult<()> {
    for (offset, entry) in batch.iter().enumerate() {
        let expected = first + offset as u64;
        if entry.sequence != expected {
            return Err(PoolError::SequenceGap {
                expected,
                actual: entry.sequence,
            });
        }
    }
    Ok(())
}

/// Sign `count` operations at `base..base+count`, order preserved
pub async fn sign_batch(
    client: &Client,
    fees: &FeeSchedule,
    base: u64,
    count: usize,
) -> Result<Vec<PoolEntry>, TransactionBuilderError> {
    let timer = Timer::new();
    let signing = (0..count as u64).map(|offset| {
        let sequence = base + offset;
        async move {
            let payload = client.sign(sequence, fees).await?;
            Ok::<_, TransactionBuilderError>(PoolEntry { sequence, payload })
        }
    });
    let entries = try_join_all(signing).await?;

    timer.observe_duration(&metrics().sign_batch_latency);
    metrics().operations_signed.inc_by(entries.len() as u64);
    debug!(
        network = %client.network(),
        base = base,
        count = entries.len(),
        elapsed_ms = timer.elapsed_ms(),
        "Signed batch"
    );
    Ok(entries)
}

/// Build a fresh pool for `client`'s network
///
/// Acquires the next unused sequence number, prices the batch and signs
/// `batch_size` operations. Any failure leaves no pool behind.
pub async fn init_pool(
    client: &Client,
    pricing: &PricingPolicy,
    batch_size: usize,
) -> PoolResult<(Pool, FeeSchedule)> {
    let network = client.network();
    let base = client
        .next_sequence()
        .await
        .map_err(|e| PoolError::initialization(network, e))?;

    let fees = pricing.price_for(client).await;
    let entries = sign_batch(client, &fees, base, batch_size)
        .await
        .map_err(|e| PoolError::initialization(network, e))?;

    let pool = Pool::new(network, client.epoch(), base, batch_size, entries)?;
    metrics().set_pool(pool.len(), pool.available());
    Ok((pool, fees))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entries(base: u64, count: usize) -> Vec<PoolEntry> {
        (0..count as u64)
            .map(|i| PoolEntry {
                sequence: base + i,
                payload: SignedPayload::new((base + i).to_be_bytes().to_vec()),
            })
            .collect()
    }

    fn pool(base: u64, count: usize) -> Pool {
        Pool::new(NetworkId::MegaEth, 0, base, 10, entries(base, count)).unwrap()
    }

    #[test]
    fn test_new_pool_state() {
        let p = pool(42, 10);
        assert_eq!(p.cursor(), 0);
        assert_eq!(p.len(), 10);
        assert_eq!(p.available(), 10);
        assert_eq!(p.next_sequence(), 52);
        assert!(!p.is_refilling());
        assert!(!p.is_refill_armed());
    }

    #[test]
    fn test_new_rejects_gap() {
        let mut batch = entries(0, 3);
        batch[2].sequence = 5;
        let err = Pool::new(NetworkId::Rise, 0, 0, 10, batch).unwrap_err();
        assert_eq!(err, PoolError::SequenceGap { expected: 2, actual: 5 });
    }

    #[test]
    fn test_consume_until_empty() {
        let mut p = pool(7, 3);
        assert_eq!(p.consume().unwrap().sequence, 7);
        assert_eq!(p.consume().unwrap().sequence, 8);
        assert_eq!(p.consume().unwrap().sequence, 9);
        assert!(p.consume().is_none());
        assert_eq!(p.cursor(), 3);
        assert!(p.is_exhausted());
        // Consumed entries stay inspectable
        assert_eq!(p.entry(0).unwrap().sequence, 7);
    }

    #[test]
    fn test_append_must_continue_range() {
        let mut p = pool(100, 10);
        assert_eq!(
            p.append(entries(111, 2)).unwrap_err(),
            PoolError::SequenceGap { expected: 110, actual: 111 }
        );
        assert_eq!(p.append(entries(110, 10)).unwrap(), 10);
        assert_eq!(p.len(), 20);
        assert_eq!(p.next_sequence(), 120);
    }

    #[test]
    fn test_arm_refill_on_half_batch_boundaries() {
        let mut p = pool(0, 10);
        let mut armed_at = Vec::new();
        for _ in 0..10 {
            p.consume();
            if p.arm_refill() {
                armed_at.push(p.cursor());
            }
        }
        // Armed once at 5; stays armed (no completion) so 10 does not re-arm
        assert_eq!(armed_at, vec![5]);

        p.abort_refill();
        assert!(p.arm_refill());
        assert!(!p.arm_refill());
    }

    #[test]
    fn test_drained_pool_arms_off_boundary() {
        // K=10 with 7 entries: cursor 7 is not a multiple of 5
        let mut p = pool(0, 7);
        for _ in 0..7 {
            p.consume();
            if p.cursor() == 5 {
                assert!(p.arm_refill());
                p.abort_refill();
            }
        }
        assert!(p.is_exhausted());
        assert!(p.arm_refill());
        assert!(!p.arm_refill());
    }

    #[test]
    fn test_single_flight_section() {
        let mut p = pool(0, 10);
        assert_eq!(p.begin_refill(), Some(10));
        assert_eq!(p.begin_refill(), None);
        p.finish_refill(entries(10, 10)).unwrap();
        assert!(!p.is_refilling());
        assert_eq!(p.begin_refill(), Some(20));
        p.abort_refill();
        assert!(!p.is_refilling());
    }

    #[test]
    fn test_retired_pool_refuses_refills() {
        let mut p = pool(0, 10);
        for _ in 0..5 {
            p.consume();
        }
        p.retire();
        assert!(!p.arm_refill());
        assert_eq!(p.begin_refill(), None);
        assert!(p.status().retired);
    }

    proptest! {
        #[test]
        fn prop_sequences_stay_contiguous(ops in proptest::collection::vec(0u8..3, 1..200), base in 0u64..1_000_000) {
            let mut p = pool(base, 10);
            let mut last_cursor = 0;
            for op in ops {
                match op {
                    0 | 1 => { p.consume(); }
                    _ => {
                        if let Some(next) = p.begin_refill() {
                            p.finish_refill(entries(next, 10)).unwrap();
                        }
                    }
                }
                prop_assert!(p.cursor() >= last_cursor);
                prop_assert!(p.cursor() <= p.len());
                last_cursor = p.cursor();
                for (i, e) in p.entries().iter().enumerate() {
                    prop_assert_eq!(e.sequence, base + i as u64);
                }
            }
        }
    }
}
