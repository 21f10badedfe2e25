// Load simulator - synthetic settled transfers for dashboard stress tests

use rand::Rng;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::adapters::{MetricsSink, Publisher};
use crate::clock::Clock;
use crate::ledger::models::{ChainId, RecordMeta, SettlementEvent, SettlementRecord, SettlementStatus, TxId};

/// Runs used when the caller does not say how many
pub const DEFAULT_SIMULATION_COUNT: usize = 200;
/// Upper bound for one run
pub const MAX_SIMULATION_COUNT: usize = 10_000;

const MAX_LATENCY_MS: i64 = 1500;
// 0.01 native, in 1e-12 units
const MAX_AMOUNT_PICO: i64 = 10_000_000_000;
// 0.0001 native, in 1e-12 units
const MAX_COST_PICO: i64 = 100_000_000;

pub struct LoadSimulator {
    sink: Arc<dyn MetricsSink>,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,
    chains: Vec<ChainId>,
}

impl LoadSimulator {
    pub fn new(sink: Arc<dyn MetricsSink>, publisher: Arc<dyn Publisher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sink,
            publisher,
            clock,
            chains: ChainId::known(),
        }
    }

    /// Write `count` synthetic settled records and publish each as `tx.settled`.
    /// Returns how many were generated.
    pub async fn simulate(&self, count: usize) -> usize {
        let count = count.min(MAX_SIMULATION_COUNT);
        let records = self.generate(count);

        for record in records {
            if let Err(e) = self.sink.record(record.clone()).await {
                error!("❌ Metrics write for simulated {} failed: {}", record.tx_id, e);
            }
            let tx_id = record.tx_id.clone();
            if let Err(e) = self.publisher.publish(SettlementEvent::Settled(record)) {
                warn!("⚠️ Publishing simulated {} failed: {}", tx_id, e);
            }
        }

        info!("🧪 Simulated {} settled transfers", count);
        count
    }

    fn generate(&self, count: usize) -> Vec<SettlementRecord> {
        let mut rng = rand::rng();
        let now = self.clock.now();

        (0..count)
            .map(|_| {
                let chain = self.chains[rng.random_range(0..self.chains.len())].clone();
                let latency_ms = rng.random_range(0..MAX_LATENCY_MS);

                SettlementRecord {
                    tx_id: TxId::generate(),
                    chain: chain.clone(),
                    sent_at: now - chrono::Duration::milliseconds(latency_ms),
                    settled_at: Some(now),
                    latency_ms: Some(latency_ms),
                    status: SettlementStatus::Settled,
                    amount_native: Decimal::new(rng.random_range(1..=MAX_AMOUNT_PICO), 12),
                    bridge_cost_native: Decimal::new(rng.random_range(0..=MAX_COST_PICO), 12),
                    meta: RecordMeta::Settled { from_chain: chain },
                }
            })
            .collect()
    }
}
