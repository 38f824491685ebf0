// zebpay-common/src/events.rs
// Lifecycle events published by the connector and consumed by the host.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{OrderType, TradeSide, TradingPair};

/// Order lifecycle events. Each transition of a tracked order is published
/// exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderEvent {
    Created {
        timestamp_ms: u64,
        client_order_id: String,
        exchange_order_id: String,
        trading_pair: TradingPair,
        side: TradeSide,
        order_type: OrderType,
        price: Decimal,
        amount: Decimal,
    },
    /// A previously unseen fill was applied to the order.
    Filled {
        timestamp_ms: u64,
        client_order_id: String,
        trading_pair: TradingPair,
        side: TradeSide,
        fill_id: String,
        price: Decimal,
        amount: Decimal,
        fee: Decimal,
        fee_asset: Option<String>,
    },
    /// Cumulative executed amount reached the requested amount.
    Completed {
        timestamp_ms: u64,
        client_order_id: String,
        exchange_order_id: Option<String>,
        base_asset: String,
        quote_asset: String,
        executed_amount_base: Decimal,
        executed_amount_quote: Decimal,
        fee_paid: Decimal,
        fee_asset: Option<String>,
    },
    Cancelled {
        timestamp_ms: u64,
        client_order_id: String,
        exchange_order_id: Option<String>,
    },
    Failed {
        timestamp_ms: u64,
        client_order_id: String,
        reason: String,
    },
}

impl OrderEvent {
    pub fn client_order_id(&self) -> &str {
        match self {
            OrderEvent::Created { client_order_id, .. }
            | OrderEvent::Filled { client_order_id, .. }
            | OrderEvent::Completed { client_order_id, .. }
            | OrderEvent::Cancelled { client_order_id, .. }
            | OrderEvent::Failed { client_order_id, .. } => client_order_id,
        }
    }
}

/// Broadcast-based publisher. Cloning shares the underlying channel, so the
/// connector can hand out as many subscriptions as the host wants.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OrderEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event. A send with no live subscribers is not an error;
    /// lifecycle events are fire-and-forget from the connector's side.
    pub fn publish(&self, event: OrderEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Subscriber side. Lagged receivers skip dropped messages and keep going.
pub struct EventStream {
    rx: broadcast::Receiver<OrderEvent>,
}

impl EventStream {
    /// Next event, or `None` once every publisher is gone.
    pub async fn next(&mut self) -> Option<OrderEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_next(&mut self) -> Option<OrderEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cancelled(id: &str) -> OrderEvent {
        OrderEvent::Cancelled {
            timestamp_ms: 1,
            client_order_id: id.to_string(),
            exchange_order_id: None,
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new(8);
        let mut stream = bus.subscribe();
        bus.publish(cancelled("a"));

        let event = stream.next().await.unwrap();
        assert_eq!(event.client_order_id(), "a");
    }

    #[tokio::test]
    async fn test_multiple_subscribers_see_every_event() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(OrderEvent::Failed {
            timestamp_ms: 2,
            client_order_id: "b".to_string(),
            reason: "min size".to_string(),
        });

        assert_eq!(first.next().await.unwrap().client_order_id(), "b");
        assert_eq!(second.next().await.unwrap().client_order_id(), "b");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new(8);
        bus.publish(cancelled("c"));
    }

    #[test]
    fn test_event_serializes() {
        let event = OrderEvent::Filled {
            timestamp_ms: 3,
            client_order_id: "d".to_string(),
            trading_pair: "BTC-AUD".to_string(),
            side: TradeSide::Buy,
            fill_id: "f1".to_string(),
            price: dec!(100.5),
            amount: dec!(0.25),
            fee: dec!(0.01),
            fee_asset: Some("AUD".to_string()),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("100.5"));
    }
}
