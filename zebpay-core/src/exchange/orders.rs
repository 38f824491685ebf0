// ====
// In-flight order tracking
// ====
// Every locally submitted order is tracked here from submission until it
// reaches a terminal state. REST polls and stream events are merged through
// the same canonical update shape; fills are deduplicated by fill id, so
// double delivery across the two sources cannot inflate executed amounts.
// ====

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use zebpay_common::events::{EventBus, OrderEvent};
use zebpay_common::types::{split_trading_pair, OrderType, TradeSide, TradingPair};

use super::errors::ExchangeError;
use super::types::{FillDetail, OrderState, OrderUpdate};

/// Relative tolerance when comparing cumulative executed amount against the
/// requested amount. Guards completion detection against accumulated
/// rounding across many small fills.
fn completion_tolerance() -> Decimal {
    Decimal::new(1, 9)
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[derive(Debug, Clone)]
pub struct InFlightOrder {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub trading_pair: TradingPair,
    pub order_type: OrderType,
    pub side: TradeSide,
    pub price: Decimal,
    pub amount: Decimal,
    pub executed_amount_base: Decimal,
    pub executed_amount_quote: Decimal,
    pub fee_asset: Option<String>,
    pub fee_paid: Decimal,
    pub state: OrderState,
    applied_fill_ids: HashSet<String>,
    cancellation_acked: bool,
}

impl InFlightOrder {
    pub fn new(
        client_order_id: String,
        trading_pair: TradingPair,
        order_type: OrderType,
        side: TradeSide,
        price: Decimal,
        amount: Decimal,
    ) -> Self {
        Self {
            client_order_id,
            exchange_order_id: None,
            trading_pair,
            order_type,
            side,
            price,
            amount,
            executed_amount_base: Decimal::ZERO,
            executed_amount_quote: Decimal::ZERO,
            fee_asset: None,
            fee_paid: Decimal::ZERO,
            state: OrderState::Pending,
            applied_fill_ids: HashSet::new(),
            cancellation_acked: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state.is_terminal()
    }

    /// Applies one fill. Returns `false` without mutation when the fill id
    /// was already recorded.
    pub fn record_fill(&mut self, fill: &FillDetail) -> bool {
        if self.applied_fill_ids.contains(&fill.fill_id) {
            return false;
        }
        self.applied_fill_ids.insert(fill.fill_id.clone());
        self.executed_amount_base += fill.quantity;
        self.executed_amount_quote += fill.price * fill.quantity;
        self.fee_paid += fill.fee;
        if self.fee_asset.is_none() {
            self.fee_asset = Some(fill.fee_asset.clone());
        }
        true
    }

    /// Whether cumulative executed base amount has reached the requested
    /// amount, within the fixed relative tolerance.
    pub fn is_complete(&self) -> bool {
        if self.executed_amount_base >= self.amount {
            return true;
        }
        (self.amount - self.executed_amount_base).abs()
            <= self.amount.abs() * completion_tolerance()
    }

    pub fn base_asset(&self) -> String {
        split_trading_pair(&self.trading_pair)
            .map(|(base, _)| base.to_string())
            .unwrap_or_default()
    }

    pub fn quote_asset(&self) -> String {
        split_trading_pair(&self.trading_pair)
            .map(|(_, quote)| quote.to_string())
            .unwrap_or_default()
    }

    pub fn to_saved(&self) -> SavedOrderState {
        SavedOrderState {
            client_order_id: self.client_order_id.clone(),
            exchange_order_id: self.exchange_order_id.clone(),
            trading_pair: self.trading_pair.clone(),
            order_type: self.order_type,
            trade_type: self.side,
            price: self.price,
            amount: self.amount,
            executed_amount_base: self.executed_amount_base,
            executed_amount_quote: self.executed_amount_quote,
            fee_asset: self.fee_asset.clone(),
            fee_paid: self.fee_paid,
            last_state: self.state,
        }
    }

    pub fn from_saved(saved: SavedOrderState) -> Self {
        Self {
            client_order_id: saved.client_order_id,
            exchange_order_id: saved.exchange_order_id,
            trading_pair: saved.trading_pair,
            order_type: saved.order_type,
            side: saved.trade_type,
            price: saved.price,
            amount: saved.amount,
            executed_amount_base: saved.executed_amount_base,
            executed_amount_quote: saved.executed_amount_quote,
            fee_asset: saved.fee_asset,
            fee_paid: saved.fee_paid,
            state: saved.last_state,
            applied_fill_ids: HashSet::new(),
            cancellation_acked: false,
        }
    }
}

/// Flat serializable record of an in-flight order, used to resume tracking
/// of non-terminal orders across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedOrderState {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub trading_pair: TradingPair,
    pub order_type: OrderType,
    pub trade_type: TradeSide,
    pub price: Decimal,
    pub amount: Decimal,
    pub executed_amount_base: Decimal,
    pub executed_amount_quote: Decimal,
    pub fee_asset: Option<String>,
    pub fee_paid: Decimal,
    pub last_state: OrderState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancellationResult {
    pub client_order_id: String,
    pub success: bool,
}

/// Authoritative table of in-flight orders. Every mutation happens under
/// one exclusive lock; lifecycle events are published exactly once per
/// transition because terminal orders leave the table immediately.
pub struct OrderTracker {
    orders: Mutex<HashMap<String, InFlightOrder>>,
    events: EventBus,
}

impl OrderTracker {
    pub fn new(events: EventBus) -> Self {
        Self {
            orders: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub async fn start_tracking(&self, order: InFlightOrder) {
        let mut orders = self.orders.lock().await;
        if orders.contains_key(&order.client_order_id) {
            warn!(
                client_order_id = %order.client_order_id,
                "overwriting an already tracked order"
            );
        }
        orders.insert(order.client_order_id.clone(), order);
    }

    pub async fn stop_tracking(&self, client_order_id: &str) {
        self.orders.lock().await.remove(client_order_id);
    }

    pub async fn get(&self, client_order_id: &str) -> Option<InFlightOrder> {
        self.orders.lock().await.get(client_order_id).cloned()
    }

    pub async fn active_orders(&self) -> Vec<InFlightOrder> {
        self.orders.lock().await.values().cloned().collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.lock().await.is_empty()
    }

    /// Acknowledges the create call: records the exchange order id, moves
    /// the order to `Open` and publishes the created event.
    pub async fn confirm_created(
        &self,
        client_order_id: &str,
        exchange_order_id: &str,
    ) -> Result<(), ExchangeError> {
        let mut orders = self.orders.lock().await;
        let order = orders
            .get_mut(client_order_id)
            .ok_or_else(|| ExchangeError::OrderNotFound(client_order_id.to_string()))?;
        order.exchange_order_id = Some(exchange_order_id.to_string());
        if order.state == OrderState::Pending {
            order.state = OrderState::Open;
        }
        self.events.publish(OrderEvent::Created {
            timestamp_ms: now_ms(),
            client_order_id: order.client_order_id.clone(),
            exchange_order_id: exchange_order_id.to_string(),
            trading_pair: order.trading_pair.clone(),
            side: order.side,
            order_type: order.order_type,
            price: order.price,
            amount: order.amount,
        });
        Ok(())
    }

    /// Marks an order failed, publishes the failure event and stops
    /// tracking it. No-op for unknown ids.
    pub async fn mark_failed(&self, client_order_id: &str, reason: &str) {
        let mut orders = self.orders.lock().await;
        if let Some(mut order) = orders.remove(client_order_id) {
            order.state = OrderState::Failed;
            self.events.publish(OrderEvent::Failed {
                timestamp_ms: now_ms(),
                client_order_id: client_order_id.to_string(),
                reason: reason.to_string(),
            });
        }
    }

    /// Resolves an order as cancelled: publishes the cancelled event once
    /// and stops tracking. Used both for confirmed deletes and for
    /// "order not found" responses, which mean the order is already gone.
    pub async fn resolve_cancelled(&self, client_order_id: &str) {
        let mut orders = self.orders.lock().await;
        if let Some(mut order) = orders.remove(client_order_id) {
            if order.cancellation_acked {
                return;
            }
            order.cancellation_acked = true;
            order.state = OrderState::Cancelled;
            self.events.publish(OrderEvent::Cancelled {
                timestamp_ms: now_ms(),
                client_order_id: client_order_id.to_string(),
                exchange_order_id: order.exchange_order_id.clone(),
            });
            info!(client_order_id, "order no longer tracked (cancelled)");
        }
    }

    /// Merges one canonical order update (from either source) into the
    /// table. Returns whether any state or amount changed.
    pub async fn apply_order_update(&self, update: &OrderUpdate) -> bool {
        let mut orders = self.orders.lock().await;
        let Some(key) = Self::locate(&orders, update) else {
            return false;
        };
        let order = orders.get_mut(&key).expect("key located above");
        if order.is_done() {
            // Terminal is sticky; late updates for a resolved order are
            // dropped wholesale.
            return false;
        }
        if order.exchange_order_id.is_none() {
            order.exchange_order_id = update.exchange_order_id.clone();
        }

        let mut changed = false;
        for fill in &update.fills {
            if order.record_fill(fill) {
                changed = true;
                self.events.publish(OrderEvent::Filled {
                    timestamp_ms: now_ms(),
                    client_order_id: order.client_order_id.clone(),
                    trading_pair: order.trading_pair.clone(),
                    side: order.side,
                    fill_id: fill.fill_id.clone(),
                    price: fill.price,
                    amount: fill.quantity,
                    fee: fill.fee,
                    fee_asset: Some(fill.fee_asset.clone()),
                });
                if !order.is_complete() {
                    order.state = OrderState::PartiallyFilled;
                }
            }
        }

        if order.is_complete() || update.status == Some(OrderState::Filled) {
            let mut order = orders.remove(&key).expect("key located above");
            order.state = OrderState::Filled;
            self.publish_completed(&order);
            info!(client_order_id = %order.client_order_id, "order completed");
            return true;
        }

        match update.status {
            Some(OrderState::Cancelled) => {
                let mut order = orders.remove(&key).expect("key located above");
                if !order.cancellation_acked {
                    order.cancellation_acked = true;
                    self.events.publish(OrderEvent::Cancelled {
                        timestamp_ms: now_ms(),
                        client_order_id: order.client_order_id.clone(),
                        exchange_order_id: order.exchange_order_id.clone(),
                    });
                }
                info!(client_order_id = %order.client_order_id, "order no longer tracked (cancelled)");
                changed = true;
            }
            Some(OrderState::Failed) => {
                let order = orders.remove(&key).expect("key located above");
                self.events.publish(OrderEvent::Failed {
                    timestamp_ms: now_ms(),
                    client_order_id: order.client_order_id.clone(),
                    reason: "rejected by exchange".to_string(),
                });
                changed = true;
            }
            Some(state @ (OrderState::Open | OrderState::PartiallyFilled)) => {
                if order.state != state {
                    order.state = state;
                    changed = true;
                }
            }
            _ => {}
        }
        changed
    }

    fn locate(orders: &HashMap<String, InFlightOrder>, update: &OrderUpdate) -> Option<String> {
        if let Some(client_id) = &update.client_order_id {
            if orders.contains_key(client_id) {
                return Some(client_id.clone());
            }
        }
        let exchange_id = update.exchange_order_id.as_deref()?;
        orders
            .values()
            .find(|o| o.exchange_order_id.as_deref() == Some(exchange_id))
            .map(|o| o.client_order_id.clone())
    }

    fn publish_completed(&self, order: &InFlightOrder) {
        self.events.publish(OrderEvent::Completed {
            timestamp_ms: now_ms(),
            client_order_id: order.client_order_id.clone(),
            exchange_order_id: order.exchange_order_id.clone(),
            base_asset: order.base_asset(),
            quote_asset: order.quote_asset(),
            executed_amount_base: order.executed_amount_base,
            executed_amount_quote: order.executed_amount_quote,
            fee_paid: order.fee_paid,
            fee_asset: order.fee_asset.clone(),
        });
    }

    /// Serializable snapshot of all non-terminal orders.
    pub async fn tracking_states(&self) -> HashMap<String, SavedOrderState> {
        self.orders
            .lock()
            .await
            .iter()
            .filter(|(_, order)| !order.is_done())
            .map(|(key, order)| (key.clone(), order.to_saved()))
            .collect()
    }

    /// Resumes tracking from a saved snapshot. Terminal records are skipped;
    /// a terminal order is never resurrected.
    pub async fn restore_tracking_states(&self, saved: HashMap<String, SavedOrderState>) {
        let mut orders = self.orders.lock().await;
        for (key, record) in saved {
            if record.last_state.is_terminal() {
                continue;
            }
            orders.insert(key, InFlightOrder::from_saved(record));
        }
    }
}
