use crate::api::handler::AppState;
use crate::ledger::models::SettlementEvent;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, info, warn};

/// Live settlement feed
/// GET /ws/events
pub async fn stream_events(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let events = state.events.subscribe();
    ws.on_upgrade(move |socket| handle_event_stream(socket, events))
}

/// Wire frame: `{"event": "tx.settled", "payload": {...}}`
pub fn encode_event(event: &SettlementEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!("⚠️ Failed to encode {} for {}: {}", event.name(), event.tx_id(), e);
            None
        }
    }
}

async fn handle_event_stream(socket: WebSocket, events: broadcast::Receiver<SettlementEvent>) {
    let (mut sender, mut receiver) = socket.split();
    info!("📡 Event stream client connected");

    // Only used to notice the client going away
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    });

    let mut send_task = tokio::spawn(async move {
        let mut stream = BroadcastStream::new(events);

        while let Some(item) = stream.next().await {
            let event = match item {
                Ok(event) => event,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!("⚠️ Event stream client lagged, skipped {} events", skipped);
                    continue;
                }
            };

            let Some(json) = encode_event(&event) else {
                continue;
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    }

    debug!("📡 Event stream client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::models::{RecordMeta, SettlementRecord, SettlementStatus, TxId};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_encode_event_frame() {
        let record = SettlementRecord {
            tx_id: TxId::generate(),
            chain: "sepolia".into(),
            sent_at: Utc::now(),
            settled_at: None,
            latency_ms: None,
            status: SettlementStatus::Queued,
            amount_native: dec!(0.1),
            bridge_cost_native: dec!(0.0031),
            meta: RecordMeta::Queued {
                recipient: "0xabc".to_string(),
                to_chain: "optimism".into(),
                route: crate::ledger::models::Route::via_hub(
                    "sepolia".into(),
                    "sepolia".into(),
                    "optimism".into(),
                ),
                estimated_latency_seconds: 31,
            },
        };

        let json = encode_event(&SettlementEvent::Queued(record)).unwrap();
        let frame: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(frame["event"], "tx.queued");
        assert_eq!(frame["payload"]["status"], "queued");
        assert_eq!(frame["payload"]["meta"]["kind"], "queued");
        assert_eq!(frame["payload"]["meta"]["route"][2], "optimism");
        assert!(frame["payload"]["settled_at"].is_null());
    }
}
