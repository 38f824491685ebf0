// zebpay-common/src/book.rs
// Order book container keyed by exact decimal prices. One instance per
// trading pair; all mutation is serialized by the owner.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSide {
    Bid,
    Ask,
}

#[derive(Error, Debug)]
pub enum BookError {
    #[error("insufficient depth on {side:?}: wanted {requested}, book holds {available}")]
    InsufficientDepth {
        side: BookSide,
        requested: Decimal,
        available: Decimal,
    },
}

/// Materialized order book for a single trading pair.
///
/// Bids and asks are independent price->size maps. A level is only ever
/// stored with size > 0; size zero in an update removes the level. The
/// `last_token` records the ordering token (millisecond timestamp) of the
/// most recently applied snapshot or diff.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    last_token: u64,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_token(&self) -> u64 {
        self.last_token
    }

    /// True until the first snapshot lands.
    pub fn is_uninitialized(&self) -> bool {
        self.last_token == 0
    }

    /// Replaces the entire book and resets the ordering token.
    /// Rows with non-positive size are skipped on ingest.
    pub fn apply_snapshot(
        &mut self,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
        token: u64,
    ) {
        self.bids.clear();
        self.asks.clear();
        for &(price, size) in bids {
            if size > Decimal::ZERO {
                self.bids.insert(price, size);
            }
        }
        for &(price, size) in asks {
            if size > Decimal::ZERO {
                self.asks.insert(price, size);
            }
        }
        self.last_token = token;
        self.check_crossed();
    }

    /// Applies an incremental update. Returns `false` (book untouched) for a
    /// token strictly older than the current one; equal tokens re-apply
    /// idempotently because diffs may be redelivered.
    pub fn apply_diff(
        &mut self,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
        token: u64,
    ) -> bool {
        if token < self.last_token {
            return false;
        }
        for &(price, size) in bids {
            Self::apply_level(&mut self.bids, price, size);
        }
        for &(price, size) in asks {
            Self::apply_level(&mut self.asks, price, size);
        }
        self.last_token = token;
        self.check_crossed();
        true
    }

    fn apply_level(side: &mut BTreeMap<Decimal, Decimal>, price: Decimal, size: Decimal) {
        if size <= Decimal::ZERO {
            side.remove(&price);
        } else {
            side.insert(price, size);
        }
    }

    pub fn best_bid(&self) -> Option<(Decimal, Decimal)> {
        self.bids.iter().next_back().map(|(p, s)| (*p, *s))
    }

    pub fn best_ask(&self) -> Option<(Decimal, Decimal)> {
        self.asks.iter().next().map(|(p, s)| (*p, *s))
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        }
    }

    pub fn bid_levels(&self) -> impl Iterator<Item = (Decimal, Decimal)> + '_ {
        self.bids.iter().rev().map(|(p, s)| (*p, *s))
    }

    pub fn ask_levels(&self) -> impl Iterator<Item = (Decimal, Decimal)> + '_ {
        self.asks.iter().map(|(p, s)| (*p, *s))
    }

    pub fn depth(&self, side: BookSide) -> usize {
        match side {
            BookSide::Bid => self.bids.len(),
            BookSide::Ask => self.asks.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Worst price touched when taking `volume` (base units) from one side,
    /// walking levels outward from the top of book.
    pub fn price_for_volume(&self, side: BookSide, volume: Decimal) -> Result<Decimal, BookError> {
        let mut remaining = volume;
        let levels: Box<dyn Iterator<Item = (Decimal, Decimal)> + '_> = match side {
            BookSide::Bid => Box::new(self.bid_levels()),
            BookSide::Ask => Box::new(self.ask_levels()),
        };
        for (price, size) in levels {
            if size >= remaining {
                return Ok(price);
            }
            remaining -= size;
        }
        Err(BookError::InsufficientDepth {
            side,
            requested: volume,
            available: volume - remaining,
        })
    }

    fn check_crossed(&self) {
        if let (Some((bid, _)), Some((ask, _))) = (self.best_bid(), self.best_ask()) {
            if bid > ask {
                warn!(%bid, %ask, "order book crossed after update");
            }
        }
    }
}
