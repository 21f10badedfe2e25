use tokio::sync::broadcast;
use tracing::debug;

use crate::adapters::Publisher;
use crate::error::PublishError;
use crate::ledger::models::SettlementEvent;

/// Event bus broadcast channel capacity
const BROADCAST_CAPACITY: usize = 1000;

/// Settlement event broadcaster.
/// Fans `tx.*` events out to every live subscriber (websocket clients, tests).
pub struct SettlementEventBus {
    tx: broadcast::Sender<SettlementEvent>,
}

impl SettlementEventBus {
    pub fn new() -> Self {
        Self::with_capacity(BROADCAST_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to settlement events
    pub fn subscribe(&self) -> broadcast::Receiver<SettlementEvent> {
        self.tx.subscribe()
    }

    /// Get number of event subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SettlementEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for SettlementEventBus {
    fn publish(&self, event: SettlementEvent) -> Result<usize, PublishError> {
        let name = event.name();
        let tx_id = event.tx_id().clone();

        match self.tx.send(event) {
            Ok(receivers) => {
                debug!("📡 Broadcast {} for {} to {} subscriber(s)", name, tx_id, receivers);
                Ok(receivers)
            }
            // Only fails when nobody is listening
            Err(_) => {
                debug!("📡 {} for {} dropped: no subscribers", name, tx_id);
                Ok(0)
            }
        }
    }
}
