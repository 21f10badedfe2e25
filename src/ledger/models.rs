use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque ledger/network identifier ("sepolia", "optimism", ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(String);

impl ChainId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Chains the simulation knows latency classes for
    pub fn known() -> Vec<ChainId> {
        ["sepolia", "optimism", "zksync", "polygonAmoy"]
            .into_iter()
            .map(ChainId::from)
            .collect()
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChainId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Ordered chain path for a transfer.
///
/// Either `[chain]` (source and destination are the same chain, no bridge
/// hop) or `[from, hub, to]` with `from != to`. The hub may coincide with
/// one endpoint, in which case that leg is a priced self-hop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ChainId>", into = "Vec<ChainId>")]
pub struct Route(Vec<ChainId>);

impl Route {
    pub fn direct(chain: ChainId) -> Self {
        Self(vec![chain])
    }

    pub fn via_hub(from: ChainId, hub: ChainId, to: ChainId) -> Self {
        Self(vec![from, hub, to])
    }

    pub fn chains(&self) -> &[ChainId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn source(&self) -> &ChainId {
        &self.0[0]
    }

    pub fn destination(&self) -> &ChainId {
        &self.0[self.0.len() - 1]
    }

    /// Adjacent (from, to) pairs, empty for a single-chain route
    pub fn hops(&self) -> impl Iterator<Item = (&ChainId, &ChainId)> {
        self.0.windows(2).map(|pair| (&pair[0], &pair[1]))
    }
}

impl TryFrom<Vec<ChainId>> for Route {
    type Error = String;

    fn try_from(chains: Vec<ChainId>) -> Result<Self, Self::Error> {
        let rejected = match chains.as_slice() {
            [] => Some("route must contain at least one chain".to_string()),
            [_] => None,
            [from, _, to] if from != to => None,
            [from, _, _] => Some(format!("route starts and ends on {}", from)),
            other => Some(format!(
                "route must be [chain] or [from, hub, to], got {} chains",
                other.len()
            )),
        };

        match rejected {
            Some(reason) => Err(reason),
            None => Ok(Self(chains)),
        }
    }
}

impl From<Route> for Vec<ChainId> {
    fn from(route: Route) -> Self {
        route.0
    }
}

/// Fee and latency contribution of one leg of a route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopBreakdown {
    pub from: ChainId,
    pub to: ChainId,
    pub fee_native: Decimal,
    pub latency_seconds: u64,
}

/// Immutable quote for a transfer.
///
/// Native amounts carry 12 decimal places, fiat figures 6. Two quotes built
/// from the same inputs and the same rate are identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub route: Route,
    pub amount_native: Decimal,
    pub bridge_fee_native: Decimal,
    pub local_send_cost_native: Decimal,
    pub total_fee_native: Decimal,
    pub estimated_latency_seconds: u64,
    pub fiat_currency: String,
    pub fx_rate: Decimal,
    pub total_cost_fiat: Decimal,
    pub breakdown: Vec<HopBreakdown>,
}

/// Transaction identifier, `0x` followed by 32 hex characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    pub fn generate() -> Self {
        Self(format!("0x{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller-side description of a transfer to settle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_chain: ChainId,
    pub to_chain: ChainId,
    pub amount_native: Decimal,
    pub recipient: String,
}

/// Returned by `enqueue` before the settlement fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnqueueReceipt {
    pub tx_id: TxId,
    pub estimated_delay_seconds: u64,
}

/// Bookkeeping entry owned by the scheduler while a timer is outstanding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingSettlement {
    pub id: TxId,
    pub from_chain: ChainId,
    pub to_chain: ChainId,
    pub amount_native: Decimal,
    pub recipient: String,
    pub enqueued_at: DateTime<Utc>,
    pub scheduled_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    Queued,
    Settled,
    Failed,
}

/// Status-specific part of a settlement record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordMeta {
    Queued {
        recipient: String,
        to_chain: ChainId,
        route: Route,
        estimated_latency_seconds: u64,
    },
    Settled {
        from_chain: ChainId,
    },
    Failed {
        to_chain: ChainId,
        reason: String,
    },
}

/// One row per state transition, handed to the metrics sink.
///
/// The queued record is tagged with the source chain, the terminal record
/// with the destination chain; both share the same `tx_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub tx_id: TxId,
    pub chain: ChainId,
    pub sent_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    pub latency_ms: Option<i64>,
    pub status: SettlementStatus,
    pub amount_native: Decimal,
    pub bridge_cost_native: Decimal,
    pub meta: RecordMeta,
}

/// Notification emitted after a settled record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrivalNotice {
    pub tx_id: TxId,
    pub from_chain: ChainId,
    pub to_chain: ChainId,
    pub amount_native: Decimal,
    pub settled_at: DateTime<Utc>,
}

/// Named events fanned out on the event bus
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum SettlementEvent {
    #[serde(rename = "tx.queued")]
    Queued(SettlementRecord),
    #[serde(rename = "tx.settled")]
    Settled(SettlementRecord),
    #[serde(rename = "tx.failed")]
    Failed(SettlementRecord),
    #[serde(rename = "tx.arrived")]
    Arrived(ArrivalNotice),
}

impl SettlementEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SettlementEvent::Queued(_) => "tx.queued",
            SettlementEvent::Settled(_) => "tx.settled",
            SettlementEvent::Failed(_) => "tx.failed",
            SettlementEvent::Arrived(_) => "tx.arrived",
        }
    }

    pub fn tx_id(&self) -> &TxId {
        match self {
            SettlementEvent::Queued(record)
            | SettlementEvent::Settled(record)
            | SettlementEvent::Failed(record) => &record.tx_id,
            SettlementEvent::Arrived(notice) => &notice.tx_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    #[test]
    fn test_route_hops() {
        let direct = Route::direct(ChainId::from("optimism"));
        assert_eq!(direct.hops().count(), 0);
        assert_eq!(direct.source(), direct.destination());

        let route = Route::via_hub("zksync".into(), "sepolia".into(), "optimism".into());
        let hops: Vec<_> = route.hops().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        assert_eq!(hops, vec![("zksync", "sepolia"), ("sepolia", "optimism")]);
        assert_eq!(route.destination().as_str(), "optimism");
    }

    #[test]
    fn test_empty_route_rejected() {
        let parsed: Result<Route, _> = serde_json::from_str("[]");
        assert!(parsed.is_err());

        let parsed: Route = serde_json::from_str(r#"["sepolia"]"#).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_route_shape_enforced_on_deserialize() {
        let hub_endpoint: Route = serde_json::from_str(r#"["sepolia","sepolia","optimism"]"#).unwrap();
        assert_eq!(hub_endpoint.hops().count(), 2);

        for raw in [
            r#"["sepolia","sepolia"]"#,
            r#"["optimism","sepolia","optimism"]"#,
            r#"["sepolia","sepolia","sepolia"]"#,
            r#"["zksync","sepolia","polygonAmoy","optimism"]"#,
        ] {
            assert!(serde_json::from_str::<Route>(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_tx_ids_are_unique() {
        let ids: HashSet<TxId> = (0..1000).map(|_| TxId::generate()).collect();
        assert_eq!(ids.len(), 1000);

        let id = TxId::generate();
        assert!(id.as_str().starts_with("0x"));
        assert_eq!(id.as_str().len(), 34);
    }

    #[test]
    fn test_event_wire_shape() {
        let notice = ArrivalNotice {
            tx_id: TxId::generate(),
            from_chain: "sepolia".into(),
            to_chain: "optimism".into(),
            amount_native: dec!(0.5),
            settled_at: Utc::now(),
        };
        let event = SettlementEvent::Arrived(notice);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "tx.arrived");
        assert_eq!(json["payload"]["to_chain"], "optimism");
        assert_eq!(event.name(), "tx.arrived");
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_value(SettlementStatus::Settled).unwrap(), "settled");
        let parsed: SettlementStatus = serde_json::from_str(r#""failed""#).unwrap();
        assert_eq!(parsed, SettlementStatus::Failed);
    }
}
