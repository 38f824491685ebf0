// zebpay-core/src/exchange/normalizer.rs
// Stateless translation of raw exchange payloads into canonical messages.
// Both wire shapes for the same concept (WebSocket short keys, REST long
// keys) are mapped here so nothing downstream ever inspects raw JSON.

use std::str::FromStr;

use rust_decimal::Decimal;

use zebpay_common::types::TradeSide;

use super::types::{
    BalanceUpdate, BookDiff, BookSnapshot, CanonicalMessage, FillDetail, OrderState, OrderUpdate,
    RestBookSnapshot, RestFill, RestOrder, RestTrade, StreamError, TradeUpdate, TradingRule,
    RestTradePairInfo, WsBalance, WsBookDiff, WsError, WsFrame, WsOrderUpdate, WsTrade,
};

/// Why a raw message produced no canonical message.
///
/// `Ack` and `Malformed` are recoverable on the polling path (log and move
/// on); the WebSocket feed treats any discard as fatal for that connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discard {
    /// Subscription acknowledgement; carries no market or account data.
    Ack,
    /// Recognized tag but the payload is missing fields or unparseable.
    Malformed { reason: String },
    /// Unknown message tag.
    Unrecognized { kind: String },
}

impl Discard {
    fn malformed(reason: impl Into<String>) -> Self {
        Discard::Malformed {
            reason: reason.into(),
        }
    }
}

impl From<Discard> for super::errors::ExchangeError {
    fn from(discard: Discard) -> Self {
        match discard {
            Discard::Ack => super::errors::ExchangeError::Parse("subscription ack".to_string()),
            Discard::Malformed { reason } => super::errors::ExchangeError::Parse(reason),
            Discard::Unrecognized { kind } => {
                super::errors::ExchangeError::Parse(format!("unrecognized message type '{kind}'"))
            }
        }
    }
}

/// Parse a price string into an exact decimal
pub fn parse_price(raw: &str) -> Result<Decimal, Discard> {
    Decimal::from_str(raw).map_err(|e| Discard::malformed(format!("invalid price '{raw}': {e}")))
}

/// Parse a size/quantity string into an exact decimal
pub fn parse_size(raw: &str) -> Result<Decimal, Discard> {
    Decimal::from_str(raw).map_err(|e| Discard::malformed(format!("invalid size '{raw}': {e}")))
}

fn parse_levels(raw: &[[String; 2]]) -> Result<Vec<(Decimal, Decimal)>, Discard> {
    raw.iter()
        .map(|[price, size]| Ok((parse_price(price)?, parse_size(size)?)))
        .collect()
}

/// Maps the exchange's order-status vocabulary onto the lifecycle states.
/// Both spellings of "cancelled" occur in the wild.
pub fn status_from_exchange(raw: &str) -> Option<OrderState> {
    match raw {
        "open" => Some(OrderState::Open),
        "partiallyFilled" => Some(OrderState::PartiallyFilled),
        "filled" => Some(OrderState::Filled),
        "cancelled" | "canceled" => Some(OrderState::Cancelled),
        "rejected" => Some(OrderState::Failed),
        _ => None,
    }
}

/// Normalizes one WebSocket frame. Never panics; anything that cannot be
/// mapped comes back as a `Discard` with the reason.
pub fn normalize_frame(raw: &str) -> Result<CanonicalMessage, Discard> {
    let frame: WsFrame = serde_json::from_str(raw)
        .map_err(|e| Discard::malformed(format!("unparseable frame: {e}")))?;
    match frame.kind.as_str() {
        "l2orderbook" => {
            let diff: WsBookDiff = serde_json::from_value(frame.data)
                .map_err(|e| Discard::malformed(format!("l2orderbook payload: {e}")))?;
            Ok(CanonicalMessage::Diff(BookDiff {
                trading_pair: diff.m,
                token: diff.t,
                bids: parse_levels(&diff.b)?,
                asks: parse_levels(&diff.a)?,
            }))
        }
        "trades" => {
            let trade: WsTrade = serde_json::from_value(frame.data)
                .map_err(|e| Discard::malformed(format!("trades payload: {e}")))?;
            let side = TradeSide::from_trade_keyword(&trade.s)
                .ok_or_else(|| Discard::malformed(format!("unknown trade side '{}'", trade.s)))?;
            Ok(CanonicalMessage::Trade(TradeUpdate {
                trading_pair: trade.m,
                trade_id: trade.u.to_string(),
                price: parse_price(&trade.p)?,
                size: parse_size(&trade.q)?,
                side,
                token: trade.t,
            }))
        }
        "orders" => {
            let update: WsOrderUpdate = serde_json::from_value(frame.data)
                .map_err(|e| Discard::malformed(format!("orders payload: {e}")))?;
            Ok(CanonicalMessage::Order(order_update_from_ws(update)?))
        }
        "balances" => {
            let balance: WsBalance = serde_json::from_value(frame.data)
                .map_err(|e| Discard::malformed(format!("balances payload: {e}")))?;
            Ok(CanonicalMessage::Balance(BalanceUpdate {
                asset: balance.a,
                total: parse_size(&balance.q)?,
                available: parse_size(&balance.f)?,
            }))
        }
        "error" => {
            let err: WsError = serde_json::from_value(frame.data)
                .map_err(|e| Discard::malformed(format!("error payload: {e}")))?;
            Ok(CanonicalMessage::Error(StreamError {
                code: err.code,
                message: err.message,
            }))
        }
        "subscriptions" => Err(Discard::Ack),
        other => Err(Discard::Unrecognized {
            kind: other.to_string(),
        }),
    }
}

fn order_update_from_ws(update: WsOrderUpdate) -> Result<OrderUpdate, Discard> {
    if update.c.is_none() && update.i.is_none() {
        return Err(Discard::malformed("order update carries no order id"));
    }
    let status = match update.status.as_deref() {
        None => None,
        Some(raw) => Some(
            status_from_exchange(raw)
                .ok_or_else(|| Discard::malformed(format!("unknown order status '{raw}'")))?,
        ),
    };
    let fills = update
        .fills
        .into_iter()
        .map(|f| {
            Ok(FillDetail {
                fill_id: f.i,
                price: parse_price(&f.p)?,
                quantity: parse_size(&f.q)?,
                fee: parse_size(&f.f)?,
                fee_asset: f.a,
            })
        })
        .collect::<Result<Vec<_>, Discard>>()?;
    Ok(OrderUpdate {
        client_order_id: update.c,
        exchange_order_id: update.i,
        trading_pair: update.m,
        status,
        fills,
    })
}

/// Long-form REST order record into the same canonical shape the stream
/// updates use, so the tracker merge logic is source-agnostic.
pub fn order_update_from_rest(order: RestOrder) -> Result<OrderUpdate, Discard> {
    let status = status_from_exchange(&order.status)
        .ok_or_else(|| Discard::malformed(format!("unknown order status '{}'", order.status)))?;
    let fills = order
        .fills
        .into_iter()
        .map(fill_from_rest)
        .collect::<Result<Vec<_>, Discard>>()?;
    Ok(OrderUpdate {
        client_order_id: order.client_order_id,
        exchange_order_id: Some(order.order_id),
        trading_pair: order.trade_pair,
        status: Some(status),
        fills,
    })
}

fn fill_from_rest(fill: RestFill) -> Result<FillDetail, Discard> {
    Ok(FillDetail {
        fill_id: fill.fill_id,
        price: parse_price(&fill.price)?,
        quantity: parse_size(&fill.quantity)?,
        fee: parse_size(&fill.fee)?,
        fee_asset: fill.fee_asset,
    })
}

/// REST snapshot into a canonical snapshot message. `received_ms` is the
/// local receive time, used as the ordering token when the payload has no
/// server timestamp.
pub fn snapshot_from_rest(
    trading_pair: &str,
    snapshot: RestBookSnapshot,
    received_ms: u64,
) -> Result<BookSnapshot, Discard> {
    let token = snapshot.t.unwrap_or(received_ms);
    let parse_rows = |rows: &[super::types::RestBookLevel]| {
        rows.iter()
            .map(|row| Ok((parse_price(&row.price)?, parse_size(&row.size)?)))
            .collect::<Result<Vec<_>, Discard>>()
    };
    Ok(BookSnapshot {
        trading_pair: trading_pair.to_string(),
        token,
        bids: parse_rows(&snapshot.bids)?,
        asks: parse_rows(&snapshot.asks)?,
    })
}

pub fn trade_update_from_rest(trading_pair: &str, trade: RestTrade) -> Result<TradeUpdate, Discard> {
    let side = TradeSide::from_trade_keyword(&trade.side)
        .ok_or_else(|| Discard::malformed(format!("unknown trade side '{}'", trade.side)))?;
    Ok(TradeUpdate {
        trading_pair: trading_pair.to_string(),
        trade_id: trade.u.to_string(),
        price: parse_price(&trade.fill_price)?,
        size: parse_size(&trade.fill_qty)?,
        side,
        token: trade.t,
    })
}

pub fn trading_rule_from_rest(info: RestTradePairInfo) -> Result<TradingRule, Discard> {
    let tick_size = parse_price(&info.tick_size)?;
    Ok(TradingRule {
        trading_pair: info.trade_pair_name,
        min_order_size: parse_size(&info.trade_minimum_amount)?,
        max_order_size: parse_size(&info.trade_maximum_amount)?,
        min_price_increment: tick_size,
        min_base_amount_increment: tick_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_normalize_book_diff() {
        let raw = r#"{"type":"l2orderbook","data":{"m":"BTC-AUD","t":1700000000123,
            "b":[["100.50","0.5"],["100.00","0"]],"a":[["101.00","0.3"]]}}"#;
        let msg = normalize_frame(raw).unwrap();
        match msg {
            CanonicalMessage::Diff(diff) => {
                assert_eq!(diff.trading_pair, "BTC-AUD");
                assert_eq!(diff.token, 1_700_000_000_123);
                assert_eq!(diff.bids[0], (dec!(100.50), dec!(0.5)));
                assert_eq!(diff.bids[1].1, Decimal::ZERO);
                assert_eq!(diff.asks, vec![(dec!(101.00), dec!(0.3))]);
            }
            other => panic!("expected diff, got {other:?}"),
        }
    }

    #[test]
    fn test_normalize_trade() {
        let raw = r#"{"type":"trades","data":{"m":"DAI-INR","u":991,"p":"82.15",
            "q":"12.000","s":"sell","t":1700000001000}}"#;
        match normalize_frame(raw).unwrap() {
            CanonicalMessage::Trade(trade) => {
                assert_eq!(trade.trade_id, "991");
                assert_eq!(trade.side, TradeSide::Sell);
                assert_eq!(trade.price, dec!(82.15));
                assert_eq!(trade.size, dec!(12.000));
            }
            other => panic!("expected trade, got {other:?}"),
        }
    }

    #[test]
    fn test_normalize_order_update_short_form() {
        let raw = r#"{"type":"orders","data":{"c":"ZBP-B-BTC-AUD-1","i":"ex-9",
            "m":"BTC-AUD","X":"partiallyFilled",
            "F":[{"i":"f1","p":"100","q":"4","f":"0.1","a":"AUD"}]}}"#;
        match normalize_frame(raw).unwrap() {
            CanonicalMessage::Order(update) => {
                assert_eq!(update.client_order_id.as_deref(), Some("ZBP-B-BTC-AUD-1"));
                assert_eq!(update.exchange_order_id.as_deref(), Some("ex-9"));
                assert_eq!(update.status, Some(OrderState::PartiallyFilled));
                assert_eq!(update.fills.len(), 1);
                assert_eq!(update.fills[0].fill_id, "f1");
                assert_eq!(update.fills[0].quantity, dec!(4));
            }
            other => panic!("expected order, got {other:?}"),
        }
    }

    #[test]
    fn test_rest_order_maps_to_same_shape() {
        let rest: RestOrder = serde_json::from_str(
            r#"{"clientOrderId":"ZBP-B-BTC-AUD-1","orderId":"ex-9","tradePair":"BTC-AUD",
                "status":"partiallyFilled",
                "fills":[{"fillId":"f1","price":"100","quantity":"4","fee":"0.1","feeAsset":"AUD"}]}"#,
        )
        .unwrap();
        let from_rest = order_update_from_rest(rest).unwrap();

        let raw = r#"{"type":"orders","data":{"c":"ZBP-B-BTC-AUD-1","i":"ex-9",
            "m":"BTC-AUD","X":"partiallyFilled",
            "F":[{"i":"f1","p":"100","q":"4","f":"0.1","a":"AUD"}]}}"#;
        let from_ws = match normalize_frame(raw).unwrap() {
            CanonicalMessage::Order(u) => u,
            other => panic!("expected order, got {other:?}"),
        };
        assert_eq!(from_rest, from_ws);
    }

    #[test]
    fn test_unknown_type_is_unrecognized() {
        let raw = r#"{"type":"heartbeat","data":{}}"#;
        assert_eq!(
            normalize_frame(raw),
            Err(Discard::Unrecognized {
                kind: "heartbeat".to_string()
            })
        );
    }

    #[test]
    fn test_subscription_ack_discarded() {
        let raw = r#"{"type":"subscriptions","data":{"subscriptions":["book"]}}"#;
        assert_eq!(normalize_frame(raw), Err(Discard::Ack));
    }

    #[test]
    fn test_missing_fields_are_malformed() {
        // no order ids at all
        let raw = r#"{"type":"orders","data":{"X":"open"}}"#;
        assert!(matches!(
            normalize_frame(raw),
            Err(Discard::Malformed { .. })
        ));

        // price is not a number
        let raw = r#"{"type":"trades","data":{"m":"BTC-AUD","u":1,"p":"abc","q":"1",
            "s":"buy","t":5}}"#;
        assert!(matches!(
            normalize_frame(raw),
            Err(Discard::Malformed { .. })
        ));
    }

    #[test]
    fn test_error_frame() {
        let raw = r#"{"type":"error","data":{"code":429,"message":"slow down"}}"#;
        match normalize_frame(raw).unwrap() {
            CanonicalMessage::Error(err) => {
                assert_eq!(err.code, 429);
                assert_eq!(err.message, "slow down");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_decimal_precision_preserved() {
        let raw = r#"{"type":"l2orderbook","data":{"m":"BTC-AUD","t":7,
            "b":[["0.000000012345","10000000.00000001"]],"a":[]}}"#;
        match normalize_frame(raw).unwrap() {
            CanonicalMessage::Diff(diff) => {
                assert_eq!(diff.bids[0].0.to_string(), "0.000000012345");
                assert_eq!(diff.bids[0].1.to_string(), "10000000.00000001");
            }
            other => panic!("expected diff, got {other:?}"),
        }
    }

    #[test]
    fn test_snapshot_from_rest_token_fallback() {
        let snapshot: RestBookSnapshot = serde_json::from_str(
            r#"{"bids":[{"price":"100","size":"5"}],"asks":[{"price":"101","size":"3"}]}"#,
        )
        .unwrap();
        let canonical = snapshot_from_rest("BTC-AUD", snapshot, 42_000).unwrap();
        assert_eq!(canonical.token, 42_000);

        let snapshot: RestBookSnapshot = serde_json::from_str(
            r#"{"t":41000,"bids":[],"asks":[]}"#,
        )
        .unwrap();
        let canonical = snapshot_from_rest("BTC-AUD", snapshot, 42_000).unwrap();
        assert_eq!(canonical.token, 41_000);
    }

    #[test]
    fn test_status_vocabulary() {
        assert_eq!(status_from_exchange("open"), Some(OrderState::Open));
        assert_eq!(status_from_exchange("cancelled"), Some(OrderState::Cancelled));
        assert_eq!(status_from_exchange("canceled"), Some(OrderState::Cancelled));
        assert_eq!(status_from_exchange("rejected"), Some(OrderState::Failed));
        assert_eq!(status_from_exchange("limbo"), None);
    }
}
