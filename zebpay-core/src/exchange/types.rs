// zebpay-core/src/exchange/types.rs
// Raw wire shapes (REST long-form and WebSocket short-form) plus the
// canonical message model every other component consumes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use zebpay_common::types::{TradeSide, TradingPair};

// ====================================================================
// REST WIRE SHAPES
// ====================================================================

/// Every REST response is wrapped in this envelope. `code` zero means
/// success; anything else is a request failure.
#[derive(Debug, Clone, Deserialize)]
pub struct RestEnvelope<T> {
    pub code: i64,
    #[serde(rename = "statusDescription", default)]
    pub status_description: Option<String>,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestBookLevel {
    pub price: String,
    pub size: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestBookSnapshot {
    /// Server timestamp in ms. Absent on some responses; callers then stamp
    /// with local receive time.
    #[serde(default)]
    pub t: Option<u64>,
    pub bids: Vec<RestBookLevel>,
    pub asks: Vec<RestBookLevel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestTrade {
    pub u: u64,
    pub fill_price: String,
    pub fill_qty: String,
    pub side: String,
    pub t: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestTicker {
    pub buy: String,
    pub sell: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestMarketOverview {
    pub pair: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestTradePairInfo {
    #[serde(rename = "tradePairName")]
    pub trade_pair_name: String,
    #[serde(rename = "tradeMinimumAmount")]
    pub trade_minimum_amount: String,
    #[serde(rename = "tradeMaximumAmount")]
    pub trade_maximum_amount: String,
    #[serde(rename = "tickSize")]
    pub tick_size: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestFill {
    #[serde(rename = "fillId")]
    pub fill_id: String,
    pub price: String,
    pub quantity: String,
    pub fee: String,
    #[serde(rename = "feeAsset")]
    pub fee_asset: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestOrder {
    #[serde(rename = "clientOrderId", default)]
    pub client_order_id: Option<String>,
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "tradePair", default)]
    pub trade_pair: Option<String>,
    pub status: String,
    #[serde(default)]
    pub fills: Vec<RestFill>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestOrderAck {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestCancelAck {
    #[serde(rename = "orderId")]
    pub order_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestBalance {
    pub asset: String,
    pub quantity: String,
    #[serde(rename = "availableForTrade")]
    pub available_for_trade: String,
}

// ====================================================================
// WEBSOCKET WIRE SHAPES
// ====================================================================

/// Outer frame of every WebSocket push message.
#[derive(Debug, Clone, Deserialize)]
pub struct WsFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsBookDiff {
    pub m: String,
    pub t: u64,
    #[serde(default)]
    pub b: Vec<[String; 2]>,
    #[serde(default)]
    pub a: Vec<[String; 2]>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsTrade {
    pub m: String,
    pub u: u64,
    pub p: String,
    pub q: String,
    pub s: String,
    pub t: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsFill {
    pub i: String,
    pub p: String,
    pub q: String,
    pub f: String,
    pub a: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsOrderUpdate {
    #[serde(default)]
    pub c: Option<String>,
    #[serde(default)]
    pub i: Option<String>,
    #[serde(default)]
    pub m: Option<String>,
    #[serde(rename = "X", default)]
    pub status: Option<String>,
    #[serde(rename = "F", default)]
    pub fills: Vec<WsFill>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsBalance {
    pub a: String,
    pub q: String,
    pub f: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsError {
    pub code: i64,
    pub message: String,
}

// ====================================================================
// CANONICAL MODEL
// ====================================================================

/// Order lifecycle states. `Filled`, `Cancelled` and `Failed` are terminal:
/// once reached, the order is never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    Pending,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Failed,
}

impl OrderState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Filled | OrderState::Cancelled | OrderState::Failed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSnapshot {
    pub trading_pair: TradingPair,
    pub token: u64,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookDiff {
    pub trading_pair: TradingPair,
    pub token: u64,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeUpdate {
    pub trading_pair: TradingPair,
    pub trade_id: String,
    pub price: Decimal,
    pub size: Decimal,
    pub side: TradeSide,
    pub token: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillDetail {
    pub fill_id: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
    pub fee_asset: String,
}

/// Source-agnostic order update. REST polls and push-stream events are both
/// mapped into this shape before the lifecycle tracker sees them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderUpdate {
    pub client_order_id: Option<String>,
    pub exchange_order_id: Option<String>,
    pub trading_pair: Option<TradingPair>,
    pub status: Option<OrderState>,
    pub fills: Vec<FillDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceUpdate {
    pub asset: String,
    pub total: Decimal,
    pub available: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalMessage {
    Snapshot(BookSnapshot),
    Diff(BookDiff),
    Trade(TradeUpdate),
    Order(OrderUpdate),
    Balance(BalanceUpdate),
    Error(StreamError),
}

/// Trading rule for one pair, refreshed periodically from the rules
/// endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingRule {
    pub trading_pair: TradingPair,
    pub min_order_size: Decimal,
    pub max_order_size: Decimal,
    pub min_price_increment: Decimal,
    pub min_base_amount_increment: Decimal,
}
