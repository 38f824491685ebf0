// zebpay-core/src/exchange/book_sync.rs
// Keeps one materialized order book per tracked pair. Updates for a single
// pair are serialized by that pair's lock; unrelated pairs apply
// concurrently. Diffs that arrive before the first snapshot trigger a
// resync request instead of being applied blind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use zebpay_common::book::OrderBook;
use zebpay_common::types::TradingPair;

use super::errors::ExchangeError;
use super::types::{BookDiff, BookSnapshot, CanonicalMessage};

struct PairEntry {
    book: Mutex<OrderBook>,
    resync_pending: AtomicBool,
}

pub struct BookSynchronizer {
    books: DashMap<TradingPair, Arc<PairEntry>>,
    resync_tx: mpsc::UnboundedSender<TradingPair>,
}

impl BookSynchronizer {
    /// Creates empty books for the given pairs. The returned receiver
    /// yields pairs whose book needs a fresh REST snapshot.
    pub fn new(pairs: &[TradingPair]) -> (Self, mpsc::UnboundedReceiver<TradingPair>) {
        let (resync_tx, resync_rx) = mpsc::unbounded_channel();
        let books = DashMap::new();
        for pair in pairs {
            books.insert(
                pair.clone(),
                Arc::new(PairEntry {
                    book: Mutex::new(OrderBook::new()),
                    resync_pending: AtomicBool::new(false),
                }),
            );
        }
        (Self { books, resync_tx }, resync_rx)
    }

    fn entry(&self, pair: &str) -> Result<Arc<PairEntry>, ExchangeError> {
        self.books
            .get(pair)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| ExchangeError::UntrackedPair(pair.to_string()))
    }

    pub fn tracked_pairs(&self) -> Vec<TradingPair> {
        self.books.iter().map(|e| e.key().clone()).collect()
    }

    /// Handle to a pair's book. Querying an untracked pair is a
    /// configuration error, not something to retry.
    pub async fn with_book<R>(
        &self,
        pair: &str,
        f: impl FnOnce(&OrderBook) -> R,
    ) -> Result<R, ExchangeError> {
        let entry = self.entry(pair)?;
        let book = entry.book.lock().await;
        Ok(f(&book))
    }

    pub async fn apply_snapshot(&self, snapshot: &BookSnapshot) -> Result<(), ExchangeError> {
        let entry = self.entry(&snapshot.trading_pair)?;
        let mut book = entry.book.lock().await;
        book.apply_snapshot(&snapshot.bids, &snapshot.asks, snapshot.token);
        entry.resync_pending.store(false, Ordering::Relaxed);
        debug!(pair = %snapshot.trading_pair, token = snapshot.token, "snapshot applied");
        Ok(())
    }

    /// Returns whether the diff was applied (stale and pre-snapshot diffs
    /// are dropped).
    pub async fn apply_diff(&self, diff: &BookDiff) -> Result<bool, ExchangeError> {
        let entry = self.entry(&diff.trading_pair)?;
        let mut book = entry.book.lock().await;
        if book.is_uninitialized() {
            drop(book);
            self.request_resync_once(&diff.trading_pair, &entry);
            return Ok(false);
        }
        let applied = book.apply_diff(&diff.bids, &diff.asks, diff.token);
        if !applied {
            debug!(
                pair = %diff.trading_pair,
                token = diff.token,
                book_token = book.last_token(),
                "stale diff dropped"
            );
        }
        Ok(applied)
    }

    /// Routes canonical book messages; trades and account messages have no
    /// book impact here.
    pub async fn apply(&self, message: &CanonicalMessage) -> Result<(), ExchangeError> {
        match message {
            CanonicalMessage::Snapshot(snapshot) => self.apply_snapshot(snapshot).await,
            CanonicalMessage::Diff(diff) => self.apply_diff(diff).await.map(|_| ()),
            _ => Ok(()),
        }
    }

    /// Asks the snapshot loop for a fresh snapshot of the pair.
    pub fn request_resync(&self, pair: &str) -> Result<(), ExchangeError> {
        let entry = self.entry(pair)?;
        self.request_resync_once(pair, &entry);
        Ok(())
    }

    fn request_resync_once(&self, pair: &str, entry: &PairEntry) {
        if !entry.resync_pending.swap(true, Ordering::Relaxed) {
            let _ = self.resync_tx.send(pair.to_string());
        }
    }

    /// True once every tracked book has seen a snapshot.
    pub async fn ready(&self) -> bool {
        for entry in self.books.iter() {
            if entry.value().book.lock().await.is_uninitialized() {
                return false;
            }
        }
        true
    }
}
