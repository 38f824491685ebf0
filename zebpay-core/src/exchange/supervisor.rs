// zebpay-core/src/exchange/supervisor.rs
// Reconnect and polling discipline. Feed sessions run until they fail, the
// supervisor sleeps the fixed reconnect delay and tries again, forever.
// Shutdown is the one exception: it wins every select and is never
// swallowed by the retry arm.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Timelike, Utc};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{info, warn};

use zebpay_common::types::TradingPair;

use super::book_sync::BookSynchronizer;
use super::errors::ExchangeError;
use super::normalizer;
use super::rest::RestClient;
use super::types::{CanonicalMessage, TradingRule};

const RULES_RETRY_DELAY: Duration = Duration::from_millis(500);

fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Runs `make_session` in a loop. A finished or failed session is logged
/// and retried after `retry_delay`; a shutdown signal returns immediately
/// from whichever await is pending.
pub async fn run_supervised<F, Fut>(
    name: &str,
    retry_delay: Duration,
    mut shutdown: broadcast::Receiver<()>,
    make_session: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), ExchangeError>>,
{
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!(task = name, "shutdown requested");
                return;
            }
            result = make_session() => match result {
                Ok(()) => info!(task = name, "session ended"),
                Err(e) => warn!(
                    task = name,
                    error = %e,
                    "session failed, retrying in {:?}",
                    retry_delay
                ),
            }
        }
        tokio::select! {
            _ = shutdown.recv() => {
                info!(task = name, "shutdown requested");
                return;
            }
            _ = tokio::time::sleep(retry_delay) => {}
        }
    }
}

/// REST snapshot refresh: one full sweep of all tracked pairs per hour with
/// per-pair pacing, plus on-demand resyncs requested by the book
/// synchronizer in between.
pub async fn run_snapshot_loop(
    rest: Arc<RestClient>,
    books: Arc<BookSynchronizer>,
    market_tx: broadcast::Sender<CanonicalMessage>,
    mut resync_rx: mpsc::UnboundedReceiver<TradingPair>,
    pacing: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        for pair in books.tracked_pairs() {
            refresh_snapshot(&rest, &books, &market_tx, &pair).await;
            tokio::select! {
                _ = shutdown.recv() => return,
                _ = tokio::time::sleep(pacing) => {}
            }
        }
        let deadline = tokio::time::Instant::now() + delay_to_next_hour();
        loop {
            tokio::select! {
                _ = shutdown.recv() => return,
                request = resync_rx.recv() => match request {
                    Some(pair) => refresh_snapshot(&rest, &books, &market_tx, &pair).await,
                    None => return,
                },
                _ = tokio::time::sleep_until(deadline) => break,
            }
        }
    }
}

async fn refresh_snapshot(
    rest: &RestClient,
    books: &BookSynchronizer,
    market_tx: &broadcast::Sender<CanonicalMessage>,
    pair: &str,
) {
    match rest.get_order_book_snapshot(pair).await {
        Ok(raw) => match normalizer::snapshot_from_rest(pair, raw, now_ms()) {
            Ok(snapshot) => {
                if let Err(e) = books.apply_snapshot(&snapshot).await {
                    warn!(%pair, error = %e, "could not apply snapshot");
                    return;
                }
                let _ = market_tx.send(CanonicalMessage::Snapshot(snapshot));
            }
            Err(discard) => warn!(%pair, ?discard, "snapshot payload discarded"),
        },
        Err(e) => warn!(%pair, error = %e, "snapshot fetch failed"),
    }
}

fn delay_to_next_hour() -> Duration {
    let now = Utc::now();
    let seconds_into_hour = u64::from(now.minute()) * 60 + u64::from(now.second());
    Duration::from_secs(3_600 - seconds_into_hour.min(3_599))
}

/// Periodic trading-rules refresh. A failed fetch retries quickly; a
/// successful one replaces the whole rule table.
pub async fn run_trading_rules_loop(
    rest: Arc<RestClient>,
    rules: Arc<RwLock<HashMap<TradingPair, TradingRule>>>,
    country: String,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let delay = match rest.get_trade_pair_info(&country).await {
            Ok(infos) => {
                let mut parsed = HashMap::new();
                for info in infos {
                    match normalizer::trading_rule_from_rest(info) {
                        Ok(rule) => {
                            parsed.insert(rule.trading_pair.clone(), rule);
                        }
                        Err(discard) => warn!(?discard, "skipping unparseable trading rule"),
                    }
                }
                *rules.write().await = parsed;
                interval
            }
            Err(e) => {
                warn!(error = %e, "could not fetch trading rules");
                RULES_RETRY_DELAY
            }
        };
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
