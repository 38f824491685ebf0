// zebpay-common/src/types.rs

use serde::{Deserialize, Serialize};

/// Trading pair identifier in base-quote form, e.g. "BTC-AUD".
pub type TradingPair = String;

/// Splits a trading pair into (base, quote) assets.
pub fn split_trading_pair(pair: &str) -> Option<(&str, &str)> {
    pair.split_once('-')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Book side keyword used by the order endpoints.
    pub fn as_book_side(&self) -> &'static str {
        match self {
            TradeSide::Buy => "bid",
            TradeSide::Sell => "ask",
        }
    }

    pub fn from_trade_keyword(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "buy" | "bid" => Some(TradeSide::Buy),
            "sell" | "ask" => Some(TradeSide::Sell),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    LimitMaker,
}

impl OrderType {
    pub fn is_limit_type(&self) -> bool {
        matches!(self, OrderType::Limit | OrderType::LimitMaker)
    }
}
