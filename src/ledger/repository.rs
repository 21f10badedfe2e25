use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::adapters::MetricsSink;
use crate::error::SinkError;
use crate::ledger::models::{ChainId, SettlementRecord};

/// Default number of records returned by `all`
pub const DEFAULT_LIST_LIMIT: usize = 500;

/// Records kept before the oldest are evicted
const DEFAULT_RETENTION: usize = 50_000;

/// Per-chain aggregate over stored records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainSummary {
    pub chain: ChainId,
    pub count: usize,
    /// Average over records that carry a latency (terminal ones)
    pub avg_latency_ms: Option<f64>,
    pub avg_cost_native: Decimal,
}

/// In-memory metrics repository.
///
/// Satisfies the metrics sink contract for the simulation and answers the
/// dashboard queries (summary, latest records, clear).
pub struct MetricsRepository {
    records: RwLock<VecDeque<SettlementRecord>>,
    retention: usize,
}

impl MetricsRepository {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            retention: retention.max(1),
        }
    }

    pub fn insert(&self, record: SettlementRecord) {
        let mut records = self.records.write();
        if records.len() == self.retention {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Latest records first, capped to `limit`
    pub fn all(&self, limit: usize) -> Vec<SettlementRecord> {
        let records = self.records.read();
        records.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Count, average latency and average cost per chain, ordered by chain
    pub fn summary(&self) -> Vec<ChainSummary> {
        #[derive(Default)]
        struct Acc {
            count: usize,
            latency_total: i64,
            latency_samples: usize,
            cost_total: Decimal,
        }

        let records = self.records.read();
        let mut per_chain: BTreeMap<ChainId, Acc> = BTreeMap::new();

        for record in records.iter() {
            let acc = per_chain.entry(record.chain.clone()).or_default();
            acc.count += 1;
            acc.cost_total = acc.cost_total.saturating_add(record.bridge_cost_native);
            if let Some(latency) = record.latency_ms {
                acc.latency_total = acc.latency_total.saturating_add(latency);
                acc.latency_samples += 1;
            }
        }

        per_chain
            .into_iter()
            .map(|(chain, acc)| ChainSummary {
                chain,
                count: acc.count,
                avg_latency_ms: (acc.latency_samples > 0)
                    .then(|| acc.latency_total as f64 / acc.latency_samples as f64),
                avg_cost_native: (acc.cost_total / Decimal::from(acc.count)).round_dp(12),
            })
            .collect()
    }

    /// Drop every record, returning how many were removed
    pub fn clear(&self) -> usize {
        let mut records = self.records.write();
        let removed = records.len();
        records.clear();
        info!("🔄 Metrics cleared ({} records)", removed);
        removed
    }
}

impl Default for MetricsRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsSink for MetricsRepository {
    async fn record(&self, record: SettlementRecord) -> Result<(), SinkError> {
        debug!("💾 Metric {} {:?} on {}", record.tx_id, record.status, record.chain);
        self.insert(record);
        Ok(())
    }
}
