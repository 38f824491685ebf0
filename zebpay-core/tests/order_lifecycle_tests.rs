// Order lifecycle flows: create acknowledgement, mixed-source fills with
// double delivery, cancellation semantics, warm-restart round trip.

use std::collections::HashMap;

use rust_decimal_macros::dec;

use zebpay_common::events::{EventBus, EventStream, OrderEvent};
use zebpay_common::types::{OrderType, TradeSide};
use zebpay_core::config::{ConnectorConfig, Credentials, Domain};
use zebpay_core::exchange::normalizer::{normalize_frame, order_update_from_rest};
use zebpay_core::exchange::orders::{InFlightOrder, OrderTracker, SavedOrderState};
use zebpay_core::exchange::types::{CanonicalMessage, OrderState, RestOrder};
use zebpay_core::exchange::ZebpayExchange;

fn drain(stream: &mut EventStream) -> Vec<OrderEvent> {
    let mut events = Vec::new();
    while let Some(event) = stream.try_next() {
        events.push(event);
    }
    events
}

fn new_tracker() -> (OrderTracker, EventStream) {
    let bus = EventBus::new(64);
    let stream = bus.subscribe();
    (OrderTracker::new(bus), stream)
}

async fn track_open_order(tracker: &OrderTracker, client_id: &str, amount: rust_decimal::Decimal) {
    tracker
        .start_tracking(InFlightOrder::new(
            client_id.to_string(),
            "BTC-AUD".to_string(),
            OrderType::Limit,
            TradeSide::Buy,
            dec!(100),
            amount,
        ))
        .await;
    tracker.confirm_created(client_id, "ex-1").await.unwrap();
}

fn ws_order_update(raw: &str) -> zebpay_core::exchange::types::OrderUpdate {
    match normalize_frame(raw).unwrap() {
        CanonicalMessage::Order(update) => update,
        other => panic!("expected order frame, got {other:?}"),
    }
}

#[tokio::test]
async fn stream_and_poll_fills_merge_exactly_once() {
    let (tracker, mut stream) = new_tracker();
    track_open_order(&tracker, "c1", dec!(10)).await;

    // stream delivers the first fill
    let update = ws_order_update(
        r#"{"type":"orders","data":{"c":"c1","i":"ex-1","m":"BTC-AUD","X":"partiallyFilled",
            "F":[{"i":"f1","p":"100","q":"4","f":"0.1","a":"AUD"}]}}"#,
    );
    assert!(tracker.apply_order_update(&update).await);

    // the REST poll reports the same fill in long-form plus a new one
    let rest: RestOrder = serde_json::from_str(
        r#"{"clientOrderId":"c1","orderId":"ex-1","tradePair":"BTC-AUD","status":"filled",
            "fills":[
              {"fillId":"f1","price":"100","quantity":"4","fee":"0.1","feeAsset":"AUD"},
              {"fillId":"f2","price":"100","quantity":"6","fee":"0.15","feeAsset":"AUD"}]}"#,
    )
    .unwrap();
    assert!(
        tracker
            .apply_order_update(&order_update_from_rest(rest).unwrap())
            .await
    );

    let events = drain(&mut stream);
    let created = events.iter().filter(|e| matches!(e, OrderEvent::Created { .. })).count();
    let fills = events.iter().filter(|e| matches!(e, OrderEvent::Filled { .. })).count();
    let completed = events.iter().filter(|e| matches!(e, OrderEvent::Completed { .. })).count();
    assert_eq!((created, fills, completed), (1, 2, 1));

    match events.last().unwrap() {
        OrderEvent::Completed {
            executed_amount_base,
            executed_amount_quote,
            fee_paid,
            base_asset,
            quote_asset,
            ..
        } => {
            assert_eq!(*executed_amount_base, dec!(10));
            assert_eq!(*executed_amount_quote, dec!(1000));
            assert_eq!(*fee_paid, dec!(0.25));
            assert_eq!(base_asset, "BTC");
            assert_eq!(quote_asset, "AUD");
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert!(tracker.is_empty().await);
}

#[tokio::test]
async fn cancellation_streamed_after_rest_resolution_stays_single() {
    let (tracker, mut stream) = new_tracker();
    track_open_order(&tracker, "c1", dec!(10)).await;
    drain(&mut stream);

    // REST cancel resolved first
    tracker.resolve_cancelled("c1").await;
    // late stream echo of the same cancellation
    let update = ws_order_update(
        r#"{"type":"orders","data":{"c":"c1","i":"ex-1","X":"cancelled"}}"#,
    );
    assert!(!tracker.apply_order_update(&update).await);

    let events = drain(&mut stream);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], OrderEvent::Cancelled { .. }));
}

#[tokio::test]
async fn cancel_unknown_client_id_succeeds_without_exchange_call() {
    let config = ConnectorConfig::new(Domain::Sandbox, "in", vec!["BTC-AUD".to_string()]);
    let exchange = ZebpayExchange::new(config, Credentials::default()).unwrap();
    let mut events = exchange.subscribe_events();

    // never tracked: resolves as logical success, no network involved
    let resolved = exchange.cancel("ZBP-B-BTC-AUD-ghost").await.unwrap();
    assert_eq!(resolved, "ZBP-B-BTC-AUD-ghost");

    let event = events.try_next().unwrap();
    assert!(matches!(event, OrderEvent::Cancelled { .. }));
    assert_eq!(event.client_order_id(), "ZBP-B-BTC-AUD-ghost");
}

#[tokio::test]
async fn tracking_states_survive_restart() {
    let (tracker, _stream) = new_tracker();
    track_open_order(&tracker, "c1", dec!(10)).await;

    let update = ws_order_update(
        r#"{"type":"orders","data":{"c":"c1","i":"ex-1","X":"partiallyFilled",
            "F":[{"i":"f1","p":"100","q":"4","f":"0.1","a":"AUD"}]}}"#,
    );
    tracker.apply_order_update(&update).await;

    let saved = tracker.tracking_states().await;
    let json = serde_json::to_string(&saved).unwrap();

    let config = ConnectorConfig::new(Domain::Sandbox, "in", vec!["BTC-AUD".to_string()]);
    let exchange = ZebpayExchange::new(config, Credentials::default()).unwrap();
    let decoded: HashMap<String, SavedOrderState> = serde_json::from_str(&json).unwrap();
    exchange.restore_tracking_states(decoded).await;

    let restored = exchange.in_flight_orders().await;
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].client_order_id, "c1");
    assert_eq!(restored[0].executed_amount_base, dec!(4));
    assert_eq!(restored[0].state, OrderState::PartiallyFilled);
}

#[tokio::test]
async fn completed_orders_are_not_persisted() {
    let (tracker, _stream) = new_tracker();
    track_open_order(&tracker, "c1", dec!(4)).await;

    let update = ws_order_update(
        r#"{"type":"orders","data":{"c":"c1","i":"ex-1","X":"filled",
            "F":[{"i":"f1","p":"100","q":"4","f":"0.1","a":"AUD"}]}}"#,
    );
    tracker.apply_order_update(&update).await;

    assert!(tracker.tracking_states().await.is_empty());
}
