// Settlement Scheduler - simulated cross-chain settlement
//
// Per transfer: Queued -> Settled (timer fired) or Queued -> Failed.
// - enqueue emits the queued record and arms a one-shot timer
// - each pending transfer is an independent tracked task
// - the pending table is the single arbiter of who terminates a transfer,
//   so exactly one terminal record is emitted per enqueue

use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::adapters::{MetricsSink, Publisher};
use crate::clock::Clock;
use crate::error::SettlementError;
use crate::ledger::models::{
    ArrivalNotice, EnqueueReceipt, PendingSettlement, Quote, RecordMeta, SettlementEvent,
    SettlementRecord, SettlementStatus, TransferRequest, TxId,
};
use crate::quote_engine::round_native;
use crate::settlement::jitter::JitterSource;

/// Deadline used when the planned delay does not fit the runtime clock
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Settlement timing and cost parameters
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Lower bound for the planned delay before jitter
    pub min_delay_ms: u64,
    /// Symmetric jitter range (+/-)
    pub jitter_range_ms: u64,
    /// Final delay never drops below this
    pub delay_floor_ms: u64,
    /// Placeholder destination gas for the settled record's cost
    pub destination_gas_units: u64,
    pub destination_gas_price_native: Decimal,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 2000,
            jitter_range_ms: 1000,
            delay_floor_ms: 1000,
            destination_gas_units: 21_000,
            // 1 gwei
            destination_gas_price_native: dec!(0.000000001),
        }
    }
}

impl SchedulerConfig {
    pub fn destination_cost_native(&self) -> Decimal {
        round_native(Decimal::from(self.destination_gas_units) * self.destination_gas_price_native)
    }
}

/// What happens to transfers still pending when the scheduler shuts down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
    /// Settle every pending transfer immediately
    #[default]
    Flush,
    /// Emit a Failed record with reason `shutdown`
    Fail,
    /// Abandon without a terminal record (lost on restart)
    Drop,
}

impl FromStr for ShutdownPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flush" => Ok(ShutdownPolicy::Flush),
            "fail" => Ok(ShutdownPolicy::Fail),
            "drop" => Ok(ShutdownPolicy::Drop),
            other => Err(format!(
                "unknown shutdown policy '{}', expected flush, fail or drop",
                other
            )),
        }
    }
}

/// Command delivered to a pending task when something other than its timer
/// terminates it
#[derive(Debug)]
enum Termination {
    Settle,
    Fail(String),
    Abandon,
}

struct PendingEntry {
    settlement: PendingSettlement,
    control: oneshot::Sender<Termination>,
}

/// Emission side shared by all settlement tasks
#[derive(Clone)]
struct Emitter {
    sink: Arc<dyn MetricsSink>,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,
    destination_cost_native: Decimal,
}

impl Emitter {
    async fn write(&self, record: SettlementRecord) {
        let tx_id = record.tx_id.clone();
        let status = record.status;
        if let Err(e) = self.sink.record(record).await {
            error!("❌ Metrics write for {} ({:?}) failed: {}", tx_id, status, e);
        }
    }

    fn publish(&self, event: SettlementEvent) {
        let name = event.name();
        let tx_id = event.tx_id().clone();
        if let Err(e) = self.publisher.publish(event) {
            warn!("⚠️ Publishing {} for {} failed: {}", name, tx_id, e);
        }
    }

    async fn settle(&self, transfer: &PendingSettlement) {
        let settled_at = self.clock.now();
        let latency_ms = (settled_at - transfer.enqueued_at).num_milliseconds();

        let record = SettlementRecord {
            tx_id: transfer.id.clone(),
            chain: transfer.to_chain.clone(),
            sent_at: transfer.enqueued_at,
            settled_at: Some(settled_at),
            latency_ms: Some(latency_ms),
            status: SettlementStatus::Settled,
            amount_native: transfer.amount_native,
            bridge_cost_native: self.destination_cost_native,
            meta: RecordMeta::Settled {
                from_chain: transfer.from_chain.clone(),
            },
        };

        self.write(record.clone()).await;
        self.publish(SettlementEvent::Settled(record));
        self.publish(SettlementEvent::Arrived(ArrivalNotice {
            tx_id: transfer.id.clone(),
            from_chain: transfer.from_chain.clone(),
            to_chain: transfer.to_chain.clone(),
            amount_native: transfer.amount_native,
            settled_at,
        }));

        info!(
            "✅ Settled {} {} -> {} in {}ms (planned {}ms)",
            transfer.id, transfer.from_chain, transfer.to_chain, latency_ms, transfer.scheduled_delay_ms
        );
    }

    async fn fail(&self, transfer: &PendingSettlement, reason: String) {
        let failed_at = self.clock.now();

        let record = SettlementRecord {
            tx_id: transfer.id.clone(),
            chain: transfer.from_chain.clone(),
            sent_at: transfer.enqueued_at,
            settled_at: Some(failed_at),
            latency_ms: Some((failed_at - transfer.enqueued_at).num_milliseconds()),
            status: SettlementStatus::Failed,
            amount_native: transfer.amount_native,
            bridge_cost_native: Decimal::ZERO,
            meta: RecordMeta::Failed {
                to_chain: transfer.to_chain.clone(),
                reason: reason.clone(),
            },
        };

        self.write(record.clone()).await;
        self.publish(SettlementEvent::Failed(record));

        warn!("❌ Settlement {} failed: {}", transfer.id, reason);
    }
}

/// Settlement scheduler.
///
/// `enqueue` is synchronous: it publishes the queued event, arms a timer
/// task and returns the planned delay. The timer task writes the queued
/// record, sleeps until its deadline and then emits the settled record and
/// the arrival notice. Sink and publisher failures are logged and never
/// stop a transfer from reaching a terminal state.
pub struct SettlementScheduler {
    config: SchedulerConfig,
    emitter: Emitter,
    jitter: Arc<dyn JitterSource>,
    pending: Arc<DashMap<TxId, PendingEntry>>,
    tasks: TaskTracker,
    accepting: AtomicBool,
}

impl SettlementScheduler {
    pub fn new(
        config: SchedulerConfig,
        sink: Arc<dyn MetricsSink>,
        publisher: Arc<dyn Publisher>,
        clock: Arc<dyn Clock>,
        jitter: Arc<dyn JitterSource>,
    ) -> Self {
        let emitter = Emitter {
            sink,
            publisher,
            clock,
            destination_cost_native: config.destination_cost_native(),
        };

        Self {
            config,
            emitter,
            jitter,
            pending: Arc::new(DashMap::new()),
            tasks: TaskTracker::new(),
            accepting: AtomicBool::new(true),
        }
    }

    /// Queue a transfer for simulated settlement.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, request: TransferRequest, quote: &Quote) -> Result<EnqueueReceipt, SettlementError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(SettlementError::ShuttingDown);
        }
        validate_request(&request, quote)?;

        let id = TxId::generate();
        let sent_at = self.emitter.clock.now();

        let queued = SettlementRecord {
            tx_id: id.clone(),
            chain: request.from_chain.clone(),
            sent_at,
            settled_at: None,
            latency_ms: None,
            status: SettlementStatus::Queued,
            amount_native: round_native(request.amount_native),
            bridge_cost_native: quote.bridge_fee_native,
            meta: RecordMeta::Queued {
                recipient: request.recipient.clone(),
                to_chain: request.to_chain.clone(),
                route: quote.route.clone(),
                estimated_latency_seconds: quote.estimated_latency_seconds,
            },
        };
        self.emitter.publish(SettlementEvent::Queued(queued.clone()));

        let delay_ms = self.plan_delay_ms(quote);
        let now = Instant::now();
        let deadline = now
            .checked_add(Duration::from_millis(delay_ms))
            .unwrap_or_else(|| now + FAR_FUTURE);

        let settlement = PendingSettlement {
            id: id.clone(),
            from_chain: request.from_chain,
            to_chain: request.to_chain,
            amount_native: queued.amount_native,
            recipient: request.recipient,
            enqueued_at: sent_at,
            scheduled_delay_ms: delay_ms,
        };

        info!(
            "📥 Queued {} {} -> {} ({} native), settling in {}ms",
            id, settlement.from_chain, settlement.to_chain, settlement.amount_native, delay_ms
        );

        let (control, commands) = oneshot::channel();
        self.pending.insert(
            id.clone(),
            PendingEntry {
                settlement: settlement.clone(),
                control,
            },
        );

        self.tasks.spawn(run_settlement(
            self.emitter.clone(),
            self.pending.clone(),
            settlement,
            queued,
            deadline,
            commands,
        ));

        Ok(EnqueueReceipt {
            tx_id: id,
            estimated_delay_seconds: delay_ms.saturating_add(500) / 1000,
        })
    }

    /// Planned delay: the quote's latency (at least the minimum) plus jitter,
    /// never below the floor
    pub fn plan_delay_ms(&self, quote: &Quote) -> u64 {
        let base = self
            .config
            .min_delay_ms
            .max(quote.estimated_latency_seconds.saturating_mul(1000));
        let jitter = self.jitter.sample_ms(self.config.jitter_range_ms);
        let delayed = i64::try_from(base).unwrap_or(i64::MAX).saturating_add(jitter);
        let floor = i64::try_from(self.config.delay_floor_ms).unwrap_or(i64::MAX);

        u64::try_from(delayed.max(floor)).unwrap_or(self.config.delay_floor_ms)
    }

    /// Move a pending transfer to Failed
    pub fn fail(&self, id: &TxId, reason: impl Into<String>) -> Result<(), SettlementError> {
        let (_, entry) = self
            .pending
            .remove(id)
            .ok_or_else(|| SettlementError::NotPending(id.clone()))?;

        if entry.control.send(Termination::Fail(reason.into())).is_err() {
            debug!("Settlement task for {} already gone", id);
        }
        Ok(())
    }

    /// Snapshot of pending transfers, oldest first
    pub fn pending(&self) -> Vec<PendingSettlement> {
        let mut pending: Vec<PendingSettlement> = self
            .pending
            .iter()
            .map(|entry| entry.value().settlement.clone())
            .collect();
        pending.sort_by_key(|p| p.enqueued_at);
        pending
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Stop accepting transfers, resolve pending ones per `policy` and wait
    /// until every settlement task has finished emitting
    pub async fn shutdown(&self, policy: ShutdownPolicy) {
        self.accepting.store(false, Ordering::Release);

        let ids: Vec<TxId> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        info!("🛑 Settlement scheduler shutting down ({:?}, {} pending)", policy, ids.len());

        for id in ids {
            let Some((_, entry)) = self.pending.remove(&id) else {
                continue;
            };

            let command = match policy {
                ShutdownPolicy::Flush => Termination::Settle,
                ShutdownPolicy::Fail => Termination::Fail("shutdown".to_string()),
                ShutdownPolicy::Drop => {
                    warn!(
                        "⚠️ Dropping pending settlement {} {} -> {} ({} native)",
                        id,
                        entry.settlement.from_chain,
                        entry.settlement.to_chain,
                        entry.settlement.amount_native
                    );
                    Termination::Abandon
                }
            };

            if entry.control.send(command).is_err() {
                debug!("Settlement task for {} already gone", id);
            }
        }

        self.tasks.close();
        self.tasks.wait().await;
        info!("✓ Settlement scheduler stopped");
    }
}

/// Reject requests that would create a transfer the quote does not describe
fn validate_request(request: &TransferRequest, quote: &Quote) -> Result<(), SettlementError> {
    if request.amount_native <= Decimal::ZERO {
        return Err(SettlementError::InvalidAmount(format!(
            "amount must be positive, got {}",
            request.amount_native
        )));
    }
    if round_native(request.amount_native).is_zero() {
        return Err(SettlementError::InvalidAmount(format!(
            "{} is below native precision",
            request.amount_native
        )));
    }

    if quote.route.source() != &request.from_chain || quote.route.destination() != &request.to_chain {
        return Err(SettlementError::QuoteMismatch(format!(
            "quote routes {} -> {}, transfer is {} -> {}",
            quote.route.source(),
            quote.route.destination(),
            request.from_chain,
            request.to_chain
        )));
    }
    if quote.amount_native != round_native(request.amount_native) {
        return Err(SettlementError::QuoteMismatch(format!(
            "quote is for {}, transfer is for {}",
            quote.amount_native, request.amount_native
        )));
    }

    Ok(())
}

/// Body of one pending transfer's task
async fn run_settlement(
    emitter: Emitter,
    pending: Arc<DashMap<TxId, PendingEntry>>,
    transfer: PendingSettlement,
    queued: SettlementRecord,
    deadline: Instant,
    mut commands: oneshot::Receiver<Termination>,
) {
    emitter.write(queued).await;

    let command = tokio::select! {
        biased;
        command = &mut commands => Some(command),
        _ = tokio::time::sleep_until(deadline) => None,
    };

    let termination = match command {
        Some(Ok(termination)) => termination,
        Some(Err(_)) => Termination::Abandon,
        // Timer fired; whoever removes the entry owns the outcome
        None => match pending.remove(&transfer.id) {
            Some(_) => Termination::Settle,
            None => commands.await.unwrap_or(Termination::Abandon),
        },
    };

    match termination {
        Termination::Settle => emitter.settle(&transfer).await,
        Termination::Fail(reason) => emitter.fail(&transfer, reason).await,
        Termination::Abandon => debug!("Settlement {} abandoned", transfer.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MonotonicClock;
    use crate::error::{PublishError, SinkError};
    use crate::ledger::models::{ChainId, Route};
    use crate::ledger::MetricsRepository;
    use crate::settlement::jitter::{FixedJitter, RandomJitter};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<SettlementEvent>>,
    }

    impl RecordingPublisher {
        fn names_for(&self, id: &TxId) -> Vec<&'static str> {
            self.events
                .lock()
                .iter()
                .filter(|e| e.tx_id() == id)
                .map(|e| e.name())
                .collect()
        }
    }

    impl Publisher for RecordingPublisher {
        fn publish(&self, event: SettlementEvent) -> Result<usize, PublishError> {
            self.events.lock().push(event);
            Ok(1)
        }
    }

    #[derive(Default)]
    struct FailingPublisher {
        attempts: AtomicUsize,
    }

    impl Publisher for FailingPublisher {
        fn publish(&self, _event: SettlementEvent) -> Result<usize, PublishError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(PublishError::Delivery("subscriber crashed".to_string()))
        }
    }

    #[derive(Default)]
    struct FailingSink {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl MetricsSink for FailingSink {
        async fn record(&self, _record: SettlementRecord) -> Result<(), SinkError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(SinkError::WriteFailed("disk full".to_string()))
        }
    }

    struct Harness {
        scheduler: Arc<SettlementScheduler>,
        repo: Arc<MetricsRepository>,
        events: Arc<RecordingPublisher>,
    }

    fn harness(jitter: Arc<dyn JitterSource>) -> Harness {
        let repo = Arc::new(MetricsRepository::new());
        let events = Arc::new(RecordingPublisher::default());
        let scheduler = Arc::new(SettlementScheduler::new(
            SchedulerConfig::default(),
            repo.clone(),
            events.clone(),
            Arc::new(MonotonicClock::new()),
            jitter,
        ));
        Harness { scheduler, repo, events }
    }

    fn request(from: &str, to: &str, amount: Decimal) -> TransferRequest {
        TransferRequest {
            from_chain: from.into(),
            to_chain: to.into(),
            amount_native: amount,
            recipient: "0xabc0000000000000000000000000000000000001".to_string(),
        }
    }

    fn quote_for(request: &TransferRequest, latency_seconds: u64) -> Quote {
        let route = if request.from_chain == request.to_chain {
            Route::direct(request.from_chain.clone())
        } else {
            Route::via_hub(request.from_chain.clone(), ChainId::from("sepolia"), request.to_chain.clone())
        };
        Quote {
            route,
            amount_native: round_native(request.amount_native),
            bridge_fee_native: dec!(0.0031),
            local_send_cost_native: dec!(0.00001),
            total_fee_native: dec!(0.00311),
            estimated_latency_seconds: latency_seconds,
            fiat_currency: "usd".to_string(),
            fx_rate: dec!(3000),
            total_cost_fiat: dec!(3009.33),
            breakdown: vec![],
        }
    }

    fn records_for(repo: &MetricsRepository, id: &TxId) -> Vec<SettlementRecord> {
        let mut records: Vec<_> = repo.all(usize::MAX).into_iter().filter(|r| &r.tx_id == id).collect();
        records.reverse();
        records
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_returns_before_settlement() {
        let h = harness(Arc::new(FixedJitter(0)));
        let req = request("zksync", "optimism", dec!(0.5));
        let quote = quote_for(&req, 5);

        let receipt = h.scheduler.enqueue(req, &quote).unwrap();

        assert_eq!(receipt.estimated_delay_seconds, 5);
        assert_eq!(h.scheduler.pending_count(), 1);
        assert_eq!(h.events.names_for(&receipt.tx_id), vec!["tx.queued"]);

        tokio::time::sleep(Duration::from_millis(4900)).await;
        let records = records_for(&h.repo, &receipt.tx_id);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, SettlementStatus::Queued);
        assert_eq!(records[0].chain.as_str(), "zksync");
        assert_eq!(records[0].bridge_cost_native, dec!(0.0031));
        assert!(records[0].settled_at.is_none());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let records = records_for(&h.repo, &receipt.tx_id);
        assert_eq!(records.len(), 2);

        let settled = &records[1];
        assert_eq!(settled.status, SettlementStatus::Settled);
        assert_eq!(settled.chain.as_str(), "optimism");
        assert_eq!(settled.latency_ms, Some(5000));
        assert_eq!(settled.bridge_cost_native, dec!(0.000021));
        assert_eq!(settled.sent_at, records[0].sent_at);

        assert_eq!(
            h.events.names_for(&receipt.tx_id),
            vec!["tx.queued", "tx.settled", "tx.arrived"]
        );
        assert_eq!(h.scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_planned_delay_bounds() {
        let req = request("sepolia", "sepolia", dec!(1));

        // Zero-latency quote still waits the minimum
        let zero = quote_for(&req, 0);
        assert_eq!(harness(Arc::new(FixedJitter(0))).scheduler.plan_delay_ms(&zero), 2000);
        assert_eq!(harness(Arc::new(FixedJitter(-1000))).scheduler.plan_delay_ms(&zero), 1000);
        assert_eq!(harness(Arc::new(FixedJitter(1000))).scheduler.plan_delay_ms(&zero), 3000);

        let floored = SettlementScheduler::new(
            SchedulerConfig {
                delay_floor_ms: 1500,
                ..SchedulerConfig::default()
            },
            Arc::new(MetricsRepository::new()),
            Arc::new(RecordingPublisher::default()),
            Arc::new(MonotonicClock::new()),
            Arc::new(FixedJitter(-1000)),
        );
        assert_eq!(floored.plan_delay_ms(&zero), 1500);

        let random = harness(Arc::new(RandomJitter));
        let slow = quote_for(&req, 31);
        for _ in 0..200 {
            let delay = random.scheduler.plan_delay_ms(&slow);
            assert!((30_000..=32_000).contains(&delay));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_quoted_latency_keeps_transfer_pending() {
        let h = harness(Arc::new(FixedJitter(-1000)));
        let req = request("zksync", "optimism", dec!(0.5));
        let quote = quote_for(&req, 10_000_000_000_000_000);

        assert_eq!(h.scheduler.plan_delay_ms(&quote), i64::MAX as u64 - 1000);
        assert_eq!(
            harness(Arc::new(FixedJitter(1000))).scheduler.plan_delay_ms(&quote),
            i64::MAX as u64
        );

        let receipt = h.scheduler.enqueue(req, &quote).unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let statuses: Vec<_> = records_for(&h.repo, &receipt.tx_id).iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![SettlementStatus::Queued]);
        assert_eq!(h.scheduler.pending_count(), 1);

        h.scheduler.shutdown(ShutdownPolicy::Fail).await;
        assert_eq!(records_for(&h.repo, &receipt.tx_id)[1].status, SettlementStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_latency_within_envelope() {
        let h = harness(Arc::new(RandomJitter));
        let mut ids = Vec::new();
        for _ in 0..20 {
            let req = request("optimism", "polygonAmoy", dec!(0.01));
            let quote = quote_for(&req, 3);
            ids.push(h.scheduler.enqueue(req, &quote).unwrap().tx_id);
        }

        tokio::time::sleep(Duration::from_secs(10)).await;

        for id in &ids {
            let settled = records_for(&h.repo, id)
                .into_iter()
                .find(|r| r.status == SettlementStatus::Settled)
                .unwrap();
            let latency = settled.latency_ms.unwrap();
            // base 3000ms, jitter +/-1000ms
            assert!((2000..=4000).contains(&latency), "latency {latency}ms");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_transfers_each_settle_once() {
        let h = harness(Arc::new(RandomJitter));

        let handles: Vec<_> = (0..100)
            .map(|i| {
                let scheduler = h.scheduler.clone();
                tokio::spawn(async move {
                    let chains = ChainId::known();
                    let from = chains[i % chains.len()].clone();
                    let to = chains[(i + 1) % chains.len()].clone();
                    let req = request(from.as_str(), to.as_str(), dec!(0.001));
                    let quote = quote_for(&req, (i % 7) as u64);
                    scheduler.enqueue(req, &quote).unwrap().tx_id
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }
        assert_eq!(ids.len(), 100);

        tokio::time::sleep(Duration::from_secs(60)).await;

        let mut per_tx: HashMap<TxId, Vec<SettlementStatus>> = HashMap::new();
        for record in h.repo.all(usize::MAX) {
            per_tx.entry(record.tx_id).or_default().push(record.status);
        }
        assert_eq!(per_tx.len(), 100);
        for statuses in per_tx.values() {
            assert_eq!(statuses.len(), 2);
            assert!(statuses.contains(&SettlementStatus::Queued));
            assert!(statuses.contains(&SettlementStatus::Settled));
        }

        for id in &ids {
            assert_eq!(h.events.names_for(id), vec!["tx.queued", "tx.settled", "tx.arrived"]);
        }
        assert_eq!(h.scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_and_publisher_failures_do_not_block() {
        let sink = Arc::new(FailingSink::default());
        let publisher = Arc::new(FailingPublisher::default());
        let scheduler = SettlementScheduler::new(
            SchedulerConfig::default(),
            sink.clone(),
            publisher.clone(),
            Arc::new(MonotonicClock::new()),
            Arc::new(FixedJitter(0)),
        );

        let req = request("sepolia", "zksync", dec!(2));
        let quote = quote_for(&req, 2);
        scheduler.enqueue(req, &quote).unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(scheduler.pending_count(), 0);
        // queued + settled
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
        // queued, settled, arrived
        assert_eq!(publisher.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_pending_transfer() {
        let h = harness(Arc::new(FixedJitter(0)));
        let req = request("polygonAmoy", "optimism", dec!(0.2));
        let quote = quote_for(&req, 10);
        let id = h.scheduler.enqueue(req, &quote).unwrap().tx_id;

        h.scheduler.fail(&id, "signer rejected").unwrap();
        assert_eq!(
            h.scheduler.fail(&id, "again"),
            Err(SettlementError::NotPending(id.clone()))
        );

        tokio::time::sleep(Duration::from_secs(30)).await;

        let records = records_for(&h.repo, &id);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].status, SettlementStatus::Failed);
        assert_eq!(records[1].chain.as_str(), "polygonAmoy");
        match &records[1].meta {
            RecordMeta::Failed { reason, to_chain } => {
                assert_eq!(reason, "signer rejected");
                assert_eq!(to_chain.as_str(), "optimism");
            }
            other => panic!("unexpected meta {other:?}"),
        }
        assert_eq!(h.events.names_for(&id), vec!["tx.queued", "tx.failed"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flush_settles_immediately() {
        let h = harness(Arc::new(FixedJitter(0)));
        let started = Instant::now();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let req = request("zksync", "polygonAmoy", dec!(1));
            let quote = quote_for(&req, 31);
            ids.push(h.scheduler.enqueue(req, &quote).unwrap().tx_id);
        }

        h.scheduler.shutdown(ShutdownPolicy::Flush).await;

        assert!(started.elapsed() < Duration::from_secs(1));
        for id in &ids {
            let records = records_for(&h.repo, id);
            assert_eq!(records.len(), 2);
            assert_eq!(records[1].status, SettlementStatus::Settled);
        }

        let req = request("zksync", "polygonAmoy", dec!(1));
        let quote = quote_for(&req, 1);
        assert_eq!(h.scheduler.enqueue(req, &quote), Err(SettlementError::ShuttingDown));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_fail_and_drop() {
        let failing = harness(Arc::new(FixedJitter(0)));
        let req = request("sepolia", "optimism", dec!(1));
        let quote = quote_for(&req, 20);
        let failed_id = failing.scheduler.enqueue(req.clone(), &quote).unwrap().tx_id;

        failing.scheduler.shutdown(ShutdownPolicy::Fail).await;
        let records = records_for(&failing.repo, &failed_id);
        assert_eq!(records.len(), 2);
        assert!(matches!(&records[1].meta, RecordMeta::Failed { reason, .. } if reason == "shutdown"));

        let dropping = harness(Arc::new(FixedJitter(0)));
        let dropped_id = dropping.scheduler.enqueue(req, &quote).unwrap().tx_id;

        dropping.scheduler.shutdown(ShutdownPolicy::Drop).await;
        let records = records_for(&dropping.repo, &dropped_id);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, SettlementStatus::Queued);
        assert_eq!(dropping.scheduler.pending_count(), 0);
        assert_eq!(dropping.events.names_for(&dropped_id), vec!["tx.queued"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_request_creates_nothing() {
        let h = harness(Arc::new(FixedJitter(0)));

        for amount in [Decimal::ZERO, dec!(-0.5)] {
            let req = request("sepolia", "optimism", amount);
            let quote = quote_for(&request("sepolia", "optimism", dec!(1)), 3);
            assert!(matches!(
                h.scheduler.enqueue(req, &quote),
                Err(SettlementError::InvalidAmount(_))
            ));
        }

        let req = request("sepolia", "zksync", dec!(1));
        let other_route = quote_for(&request("sepolia", "optimism", dec!(1)), 3);
        assert!(matches!(
            h.scheduler.enqueue(req.clone(), &other_route),
            Err(SettlementError::QuoteMismatch(_))
        ));
        let other_amount = quote_for(&request("sepolia", "zksync", dec!(2)), 3);
        assert!(matches!(
            h.scheduler.enqueue(req, &other_amount),
            Err(SettlementError::QuoteMismatch(_))
        ));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.repo.len(), 0);
        assert!(h.events.events.lock().is_empty());
        assert_eq!(h.scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_snapshot() {
        let h = harness(Arc::new(FixedJitter(0)));
        let req = request("optimism", "zksync", dec!(0.75));
        let quote = quote_for(&req, 4);
        let id = h.scheduler.enqueue(req, &quote).unwrap().tx_id;

        let pending = h.scheduler.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].scheduled_delay_ms, 4000);
        assert_eq!(pending[0].amount_native, dec!(0.75));
    }

    #[test]
    fn test_shutdown_policy_parsing() {
        assert_eq!("flush".parse::<ShutdownPolicy>(), Ok(ShutdownPolicy::Flush));
        assert_eq!(" FAIL ".parse::<ShutdownPolicy>(), Ok(ShutdownPolicy::Fail));
        assert_eq!("drop".parse::<ShutdownPolicy>(), Ok(ShutdownPolicy::Drop));
        assert!("later".parse::<ShutdownPolicy>().is_err());
        assert_eq!(ShutdownPolicy::default(), ShutdownPolicy::Flush);
    }
}
