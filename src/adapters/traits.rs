use async_trait::async_trait;

use crate::error::{PublishError, SinkError};
use crate::ledger::models::{SettlementEvent, SettlementRecord};

/// Destination for one record per settlement state transition.
///
/// Writes are fire-and-forget from the scheduler's point of view: an error
/// is logged by the caller and never retried.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record(&self, record: SettlementRecord) -> Result<(), SinkError>;
}

/// Narrow publish capability the scheduler depends on.
///
/// Implementations fan events out to zero or more subscribers and return
/// how many received the event. Having no subscribers is not an error.
pub trait Publisher: Send + Sync {
    fn publish(&self, event: SettlementEvent) -> Result<usize, PublishError>;
}
