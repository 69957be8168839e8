//! Background pool extension
//!
//! `RefillScheduler::maybe_refill` runs on the dispatch path right after the
//! cursor advances. It only arms the pool and spawns a task; the signing round
//! happens in `extend`, off the measured path. Outcomes travel back over an
//! mpsc channel tagged with the pool's epoch so a result that lands after a
//! network switch can be told apart and dropped.

use super::pool_errors::{PoolError, PoolResult};
use super::pool_store::{sign_batch, SharedPool};
use crate::metrics::metrics;
use crate::rpc_manager::Client;
use crate::structured_logging::StructuredLogger;
use crate::tx_builder::PricingPolicy;
use crate::types::NetworkId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// What one `extend` call did to the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefillOutcome {
    /// A batch was signed and appended
    Appended {
        first_sequence: u64,
        count: usize,
        total: usize,
    },
    /// Another extend held the guard
    Skipped,
    /// The pool was retired while signing; nothing appended
    Discarded,
}

/// Completion message from a refill task
#[derive(Debug, Clone)]
pub struct RefillEvent {
    pub network: NetworkId,
    pub epoch: u64,
    pub result: PoolResult<RefillOutcome>,
}

/// Extend `pool` by `batch_size` entries
///
/// The next sequence base is read from the pool under its lock when the
/// single-flight section is entered, never captured earlier. The lock is not
/// held across the pricing or signing awaits.
pub async fn extend(
    pool: &SharedPool,
    client: &Client,
    pricing: &PricingPolicy,
    batch_size: usize,
) -> PoolResult<RefillOutcome> {
    let network = client.network();
    let next = pool.lock().begin_refill();
    let base = match next {
        Some(base) => base,
        None => {
            debug!(network = %network, "Refill already in flight, skipping");
            return Ok(RefillOutcome::Skipped);
        }
    };

    let fees = pricing.price_for(client).await;
    let signed = sign_batch(client, &fees, base, batch_size).await;

    let mut guard = pool.lock();
    let batch = match signed {
        Ok(batch) => batch,
        Err(e) => {
            guard.abort_refill();
            return Err(PoolError::refill(network, e));
        }
    };

    if guard.is_retired() {
        guard.abort_refill();
        return Ok(RefillOutcome::Discarded);
    }

    let count = guard.finish_refill(batch)?;
    metrics().set_pool(guard.len(), guard.available());
    Ok(RefillOutcome::Appended {
        first_sequence: base,
        count,
        total: guard.len(),
    })
}

/// Arms and spawns refills for one pool
pub struct RefillScheduler {
    pool: SharedPool,
    client: Arc<Client>,
    pricing: Arc<PricingPolicy>,
    batch_size: usize,
    events: mpsc::UnboundedSender<RefillEvent>,
    in_flight: Option<JoinHandle<()>>,
    triggered: u64,
    logger: StructuredLogger,
}

impl RefillScheduler {
    pub fn new(
        pool: SharedPool,
        client: Arc<Client>,
        pricing: Arc<PricingPolicy>,
        batch_size: usize,
        events: mpsc::UnboundedSender<RefillEvent>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            pool,
            client,
            pricing,
            batch_size,
            events,
            in_flight: None,
            triggered: 0,
            logger,
        }
    }

    /// Schedule an extend if the cursor just reached a half-batch boundary
    ///
    /// Returns `true` when a refill task was spawned. Never blocks on I/O.
    pub fn maybe_refill(&mut self) -> bool {
        let (armed, cursor, length, epoch) = {
            let mut pool = self.pool.lock();
            (pool.arm_refill(), pool.cursor(), pool.len(), pool.epoch())
        };
        if !armed {
            return false;
        }

        self.triggered += 1;
        metrics().refill_triggered.inc();
        let network = self.client.network();
        self.logger.log_refill_triggered(network, cursor, length);

        let pool = Arc::clone(&self.pool);
        let client = Arc::clone(&self.client);
        let pricing = Arc::clone(&self.pricing);
        let events = self.events.clone();
        let logger = self.logger.clone();
        let batch_size = self.batch_size;

        self.in_flight = Some(tokio::spawn(async move {
            let result = extend(&pool, &client, &pricing, batch_size).await;
            match &result {
                Ok(RefillOutcome::Appended {
                    first_sequence,
                    count,
                    total,
                }) => {
                    metrics().refill_completed.inc();
                    logger.log_refill_completed(network, *first_sequence, *count, *total);
                }
                Ok(RefillOutcome::Discarded) => {
                    metrics().refill_discarded.inc();
                    debug!(network = %network, epoch = epoch, "Refill result discarded, pool retired");
                }
                Ok(RefillOutcome::Skipped) => {}
                Err(e) => {
                    metrics().refill_failed.inc();
                    logger.log_refill_failed(network, &e.to_string());
                }
            }
            // Receiver gone means the dispatcher was dropped
            let _ = events.send(RefillEvent {
                network,
                epoch,
                result,
            });
        }));
        true
    }

    /// Await the most recently spawned refill task
    pub async fn wait(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::error!(network = %self.client.network(), "Refill task panicked: {}", e);
                }
            }
        }
    }

    /// Abort the in-flight task and release the pool's refill flags
    pub fn cancel(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
            self.pool.lock().abort_refill();
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Refills spawned by this scheduler
    pub fn triggered(&self) -> u64 {
        self.triggered
    }

    pub fn pool(&self) -> &SharedPool {
        &self.pool
    }
}

impl Drop for RefillScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for RefillScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefillScheduler")
            .field("network", &self.client.network())
            .field("batch_size", &self.batch_size)
            .field("triggered", &self.triggered)
            .field("in_flight", &self.is_in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool_manager::pool_store::init_pool;
    use crate::rpc_manager::ClientFactory;
    use crate::test_utils::{MockClientFactory, MockRpc, MockSigner};

    fn client(signer: Arc<MockSigner>, base: u64) -> Arc<Client> {
        Arc::new(
            MockClientFactory::new(signer)
                .with_network(NetworkId::MegaEth, Arc::new(MockRpc::new(base)))
                .connect(NetworkId::MegaEth.descriptor(), 0)
                .unwrap(),
        )
    }

    async fn shared_pool(client: &Client) -> SharedPool {
        let (pool, _) = init_pool(client, &PricingPolicy::new(), 10).await.unwrap();
        pool.into_shared()
    }

    #[tokio::test]
    async fn test_extend_appends_contiguous_batch() {
        let client = client(Arc::new(MockSigner::new()), 100);
        let pool = shared_pool(&client).await;

        let outcome = extend(&pool, &client, &PricingPolicy::new(), 10)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RefillOutcome::Appended {
                first_sequence: 110,
                count: 10,
                total: 20
            }
        );
        let guard = pool.lock();
        assert!(!guard.is_refilling());
        assert_eq!(guard.entry(19).unwrap().sequence, 119);
    }

    #[tokio::test]
    async fn test_concurrent_extends_are_single_flight() {
        let signer = Arc::new(MockSigner::gated_from(10));
        let client = client(signer.clone(), 0);
        let pool = shared_pool(&client).await;
        let pricing = PricingPolicy::new();

        let first = extend(&pool, &client, &pricing, 10);
        let second = async {
            signer.wait_until_blocked().await;
            let outcome = extend(&pool, &client, &pricing, 10).await;
            signer.release();
            outcome
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(second.unwrap(), RefillOutcome::Skipped);
        assert!(matches!(first.unwrap(), RefillOutcome::Appended { count: 10, .. }));

        let signed = signer.signed_sequences();
        let mut deduped = signed.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(signed.len(), deduped.len(), "duplicate sequence signed");
        assert_eq!(pool.lock().len(), 20);
    }

    #[tokio::test]
    async fn test_failed_extend_releases_guard() {
        let signer = Arc::new(MockSigner::failing_from(10));
        let client = client(signer.clone(), 0);
        let pool = shared_pool(&client).await;

        let err = extend(&pool, &client, &PricingPolicy::new(), 10)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "refill");
        let guard = pool.lock();
        assert!(!guard.is_refilling());
        assert!(!guard.is_refill_armed());
        assert_eq!(guard.len(), 10);
    }

    #[tokio::test]
    async fn test_retired_pool_discards_batch() {
        let signer = Arc::new(MockSigner::gated_from(10));
        let client = client(signer.clone(), 0);
        let pool = shared_pool(&client).await;
        let pricing = PricingPolicy::new();

        let refill = extend(&pool, &client, &pricing, 10);
        let retire = async {
            signer.wait_until_blocked().await;
            pool.lock().retire();
            signer.release();
        };
        let (outcome, _) = tokio::join!(refill, retire);

        assert_eq!(outcome.unwrap(), RefillOutcome::Discarded);
        assert_eq!(pool.lock().len(), 10);
    }

    #[tokio::test]
    async fn test_scheduler_spawns_once_per_boundary() {
        let client = client(Arc::new(MockSigner::new()), 0);
        let pool = shared_pool(&client).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = RefillScheduler::new(
            Arc::clone(&pool),
            Arc::clone(&client),
            Arc::new(PricingPolicy::new()),
            10,
            tx,
            StructuredLogger::new("test".to_string()),
        );

        for _ in 0..4 {
            pool.lock().consume();
            assert!(!scheduler.maybe_refill());
        }
        pool.lock().consume();
        assert!(scheduler.maybe_refill());
        assert!(!scheduler.maybe_refill());
        scheduler.wait().await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.network, NetworkId::MegaEth);
        assert_eq!(event.epoch, 0);
        assert!(matches!(event.result, Ok(RefillOutcome::Appended { total: 20, .. })));
        assert_eq!(scheduler.triggered(), 1);
    }
}
