//! Dispatcher: the per-session context that owns every piece of pool state
//!
//! One `Dispatcher` holds the client registry, the active network session
//! (client, pool handle, refill scheduler) and the execution history. Nothing
//! is ambient: a test builds a dispatcher over an in-memory `ClientFactory` and
//! drives it exactly the way the binary does.
//!
//! Dispatch path:
//! 1. drain refill outcomes that arrived since the last call
//! 2. consume the entry at the cursor (no I/O); a drained pool retries its refill
//! 3. submit it and time only the submission
//! 4. let the refill scheduler check the half-batch boundary
//! 5. record the result

use crate::metrics::{metrics, Timer};
use crate::observability::CorrelationId;
use crate::pool_manager::{
    init_pool, PoolError, PoolResult, PoolStatus, RefillEvent, RefillOutcome, RefillScheduler,
    SharedPool,
};
use crate::rpc_manager::{Client, ClientFactory, ClientRegistry};
use crate::structured_logging::StructuredLogger;
use crate::tx_builder::{FeeSchedule, PricingPolicy};
use crate::types::{ExecutionHistory, ExecutionRecord, NetworkId};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Smallest batch that still has a half-batch boundary inside it
pub const MIN_BATCH_SIZE: usize = 2;

/// Dispatcher tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// Operations signed per batch (K)
    pub batch_size: usize,
    /// Execution records kept in history
    pub history_capacity: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            history_capacity: 50,
        }
    }
}

impl DispatcherSettings {
    /// Raise `batch_size` to `MIN_BATCH_SIZE`; signing and triggering both read this value
    pub fn normalized(self) -> Self {
        Self {
            batch_size: self.batch_size.max(MIN_BATCH_SIZE),
            ..self
        }
    }
}

/// State bound to one network selection
#[derive(Debug)]
struct NetworkSession {
    network: NetworkId,
    client: Arc<Client>,
    pool: SharedPool,
    scheduler: RefillScheduler,
    fees: FeeSchedule,
}

impl NetworkSession {
    fn epoch(&self) -> u64 {
        self.client.epoch()
    }
}

pub struct Dispatcher {
    registry: ClientRegistry,
    pricing: Arc<PricingPolicy>,
    settings: DispatcherSettings,
    selected: NetworkId,
    session: Option<NetworkSession>,
    history: ExecutionHistory,
    events_tx: mpsc::UnboundedSender<RefillEvent>,
    events_rx: mpsc::UnboundedReceiver<RefillEvent>,
    notices: Vec<PoolError>,
    refills_triggered: u64,
    successes: u64,
    logger: StructuredLogger,
}

impl Dispatcher {
    pub fn new(factory: Arc<dyn ClientFactory>, settings: DispatcherSettings) -> Self {
        let settings = settings.normalized();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let logger = StructuredLogger::new(CorrelationId::new().short().to_string());
        Self {
            registry: ClientRegistry::new(factory),
            pricing: Arc::new(PricingPolicy::new()),
            settings,
            selected: NetworkId::Select,
            session: None,
            history: ExecutionHistory::new(settings.history_capacity),
            events_tx,
            events_rx,
            notices: Vec::new(),
            refills_triggered: 0,
            successes: 0,
            logger,
        }
    }

    pub fn settings(&self) -> DispatcherSettings {
        self.settings
    }

    pub fn selected_network(&self) -> NetworkId {
        self.selected
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub fn pricing(&self) -> &PricingPolicy {
        &self.pricing
    }

    /// Switch to `network` and build its pool
    ///
    /// The previous pool is retired and its refill task aborted before the
    /// client cache is cleared, so nothing from the old selection can land in
    /// the new one. Selecting the sentinel leaves no pool and returns `None`.
    /// On initialization failure no pool is installed; select again to retry.
    pub async fn select_network(&mut self, network: NetworkId) -> PoolResult<Option<PoolStatus>> {
        let previous = self.selected;
        if let Some(mut session) = self.session.take() {
            session.pool.lock().retire();
            session.scheduler.cancel();
            self.refills_triggered += session.scheduler.triggered();
        }
        let epoch = self.registry.invalidate();
        self.selected = network;
        metrics().set_pool(0, 0);
        self.logger.log_network_switch(previous, network, epoch);

        let client = match self
            .registry
            .get_client(network)
            .map_err(|e| PoolError::initialization(network, e))?
        {
            Some(client) => client,
            None => return Ok(None),
        };

        let (pool, fees) = init_pool(&client, &self.pricing, self.settings.batch_size).await?;
        self.logger.log_pool_initialized(
            network,
            pool.base_sequence(),
            pool.len(),
            fees.fee_rate(),
            fees.max_cost_wei(pool.len()),
        );
        let status = pool.status();
        let pool = pool.into_shared();
        let scheduler = RefillScheduler::new(
            Arc::clone(&pool),
            Arc::clone(&client),
            Arc::clone(&self.pricing),
            self.settings.batch_size,
            self.events_tx.clone(),
            self.logger.clone(),
        );
        self.session = Some(NetworkSession {
            network,
            client,
            pool,
            scheduler,
            fees,
        });
        Ok(Some(status))
    }

    /// Submit the next pre-signed operation
    pub async fn dispatch(&mut self) -> PoolResult<ExecutionRecord> {
        self.drain_events();
        metrics().dispatch_total.inc();

        let session = match self.session.as_mut() {
            Some(session) => session,
            None if self.selected.is_sentinel() => return Err(PoolError::NoNetworkSelected),
            None => {
                metrics().dispatch_exhausted.inc();
                return Err(PoolError::Exhausted {
                    consumed: 0,
                    total: 0,
                });
            }
        };

        let consumed = {
            let mut pool = session.pool.lock();
            let entry = pool.consume();
            (entry, pool.cursor(), pool.len())
        };
        let entry = match consumed {
            (Some(entry), _, _) => entry,
            (None, cursor, total) => {
                metrics().dispatch_exhausted.inc();
                if session.scheduler.maybe_refill() {
                    debug!(network = %session.network, cursor, "Pool drained, refill retried");
                }
                return Err(PoolError::Exhausted {
                    consumed: cursor,
                    total,
                });
            }
        };

        let network = session.network;
        let correlation_id = CorrelationId::new();
        let timer = Timer::new();
        let submitted = session.client.submit(&entry.payload).await;
        timer.observe_duration(&metrics().submit_latency);
        let elapsed_ms = timer.elapsed_ms();

        session.scheduler.maybe_refill();
        {
            let pool = session.pool.lock();
            metrics().set_pool(pool.len(), pool.available());
        }

        match submitted {
            Ok(identifier) => {
                metrics().dispatch_success.inc();
                self.successes += 1;
                self.logger.log_dispatch_success(
                    network,
                    entry.sequence,
                    &identifier,
                    elapsed_ms,
                    correlation_id.as_str(),
                );
                let record = ExecutionRecord {
                    network,
                    identifier,
                    sequence: entry.sequence,
                    elapsed_ms,
                    correlation_id,
                    completed_at: Utc::now(),
                };
                self.history.push(record.clone());
                Ok(record)
            }
            Err(e) => {
                metrics().dispatch_failed.inc();
                self.logger.log_dispatch_failure(
                    network,
                    entry.sequence,
                    &e.to_string(),
                    elapsed_ms,
                    correlation_id.as_str(),
                );
                Err(PoolError::Submission {
                    network,
                    sequence: entry.sequence,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Await the in-flight refill, then drain its outcome
    ///
    /// Returns the last outcome for the current selection, if any arrived.
    pub async fn wait_for_refill(&mut self) -> Option<PoolResult<RefillOutcome>> {
        if let Some(session) = self.session.as_mut() {
            session.scheduler.wait().await;
        }
        self.drain_events()
    }

    /// Apply pending refill outcomes; stale ones are dropped
    fn drain_events(&mut self) -> Option<PoolResult<RefillOutcome>> {
        let current_epoch = self.session.as_ref().map(NetworkSession::epoch);
        let mut latest = None;
        while let Ok(event) = self.events_rx.try_recv() {
            if Some(event.epoch) != current_epoch {
                debug!(
                    network = %event.network,
                    epoch = event.epoch,
                    "Dropping refill outcome from a previous selection"
                );
                continue;
            }
            if let Err(e) = &event.result {
                self.notices.push(e.clone());
            }
            latest = Some(event.result);
        }
        latest
    }

    /// Non-fatal refill failures since the last call
    pub fn take_notices(&mut self) -> Vec<PoolError> {
        self.drain_events();
        std::mem::take(&mut self.notices)
    }

    pub fn pool_status(&self) -> Option<PoolStatus> {
        self.session.as_ref().map(|s| s.pool.lock().status())
    }

    /// Shared handle to the active pool
    pub fn pool_handle(&self) -> Option<SharedPool> {
        self.session.as_ref().map(|s| Arc::clone(&s.pool))
    }

    /// Fee schedule the initial batch was signed with
    pub fn initial_fees(&self) -> Option<FeeSchedule> {
        self.session.as_ref().map(|s| s.fees)
    }

    pub fn is_refill_in_flight(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.scheduler.is_in_flight())
            .unwrap_or(false)
    }

    /// Refills triggered across every selection so far
    pub fn refills_triggered(&self) -> u64 {
        self.refills_triggered
            + self
                .session
                .as_ref()
                .map(|s| s.scheduler.triggered())
                .unwrap_or(0)
    }

    /// Successful submissions across every selection; unlike `history`, never truncated
    pub fn successful_dispatches(&self) -> u64 {
        self.successes
    }

    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    pub fn context_id(&self) -> &str {
        self.logger.context_id()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if let Some(session) = self.session.as_ref() {
            session.pool.lock().retire();
            info!(network = %session.network, "Dispatcher dropped, pool retired");
        }
    }
}
