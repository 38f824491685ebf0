// ====
// ZebPay exchange adapter
// ====
// Facade the host framework drives: order placement and cancellation,
// book access, balance/rule state, and the task set that keeps all of it
// synchronized with the exchange.
// ====

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use zebpay_common::events::{EventBus, EventStream, OrderEvent};
use zebpay_common::throttle::Throttler;
use zebpay_common::book::OrderBook;
use zebpay_common::types::{OrderType, TradeSide, TradingPair};

use crate::config::{ConnectorConfig, Credentials};

use super::auth::ZebpayAuth;
use super::book_sync::BookSynchronizer;
use super::errors::ExchangeError;
use super::normalizer;
use super::orders::{CancellationResult, InFlightOrder, OrderTracker, SavedOrderState};
use super::rest::RestClient;
use super::supervisor;
use super::traits::{ExchangeAdapter, NetworkStatus};
use super::types::{BalanceUpdate, CanonicalMessage, TradingRule};
use super::ws::{FeedChannel, WsFeed};

const EXCHANGE_NAME: &str = "zebpay";
const CLIENT_ORDER_ID_PREFIX: &str = "ZBP";

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

fn new_client_order_id(side: TradeSide, trading_pair: &str) -> String {
    let side_tag = match side {
        TradeSide::Buy => "B",
        TradeSide::Sell => "S",
    };
    format!(
        "{CLIENT_ORDER_ID_PREFIX}-{side_tag}-{trading_pair}-{}",
        Uuid::new_v4().simple()
    )
}

fn quantize(value: Decimal, increment: Decimal) -> Decimal {
    if increment <= Decimal::ZERO {
        return value;
    }
    (value / increment).floor() * increment
}

#[derive(Debug, Clone, Default)]
pub struct Balances {
    pub total: HashMap<String, Decimal>,
    pub available: HashMap<String, Decimal>,
}

struct ExchangeInner {
    config: ConnectorConfig,
    rest: Arc<RestClient>,
    books: Arc<BookSynchronizer>,
    tracker: OrderTracker,
    events: EventBus,
    trading_rules: Arc<RwLock<HashMap<TradingPair, TradingRule>>>,
    balances: RwLock<Balances>,
    market_tx: broadcast::Sender<CanonicalMessage>,
    user_stream_last_recv: Arc<AtomicU64>,
    poll_notify: Notify,
    last_tick_ms: AtomicU64,
    last_status_poll_ms: AtomicU64,
}

impl ExchangeInner {
    async fn apply_balance_update(&self, update: &BalanceUpdate) {
        let mut balances = self.balances.write().await;
        balances.total.insert(update.asset.clone(), update.total);
        balances
            .available
            .insert(update.asset.clone(), update.available);
    }

    /// Rebuilds the balance maps from the REST endpoint; assets no longer
    /// reported fall out of the maps.
    async fn update_balances(&self) -> Result<(), ExchangeError> {
        let rows = self.rest.get_balances().await?;
        let mut fresh = Balances::default();
        for row in rows {
            let total = normalizer::parse_size(&row.quantity).map_err(ExchangeError::from)?;
            let available =
                normalizer::parse_size(&row.available_for_trade).map_err(ExchangeError::from)?;
            fresh.total.insert(row.asset.clone(), total);
            fresh.available.insert(row.asset, available);
        }
        *self.balances.write().await = fresh;
        Ok(())
    }

    /// REST fallback for order status: one get-order call per tracked
    /// order, fed through the same update path as stream events. Runs at
    /// most once per the configured minimum interval.
    async fn update_order_status(&self) {
        let now = now_ms();
        let min_interval_ms = self.config.order_status_min_interval_secs * 1_000;
        let last = self.last_status_poll_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) < min_interval_ms {
            return;
        }
        self.last_status_poll_ms.store(now, Ordering::Relaxed);

        for order in self.tracker.active_orders().await {
            let Some(exchange_order_id) = order.exchange_order_id.clone() else {
                // create call not acknowledged yet; nothing to poll
                continue;
            };
            match self.rest.get_order(&exchange_order_id).await {
                Ok(raw) => match normalizer::order_update_from_rest(raw) {
                    Ok(update) => {
                        self.tracker.apply_order_update(&update).await;
                    }
                    Err(discard) => {
                        warn!(client_order_id = %order.client_order_id, ?discard,
                            "discarding unparseable order status");
                    }
                },
                Err(e) => {
                    error!(client_order_id = %order.client_order_id, error = %e,
                        "status poll failed, dropping order");
                    self.tracker
                        .mark_failed(&order.client_order_id, &format!("status poll failed: {e}"))
                        .await;
                }
            }
        }
    }

    async fn create_order(
        &self,
        side: TradeSide,
        client_order_id: String,
        trading_pair: TradingPair,
        amount: Decimal,
        order_type: OrderType,
        price: Decimal,
    ) {
        let result = self
            .create_order_inner(side, &client_order_id, &trading_pair, amount, order_type, price)
            .await;
        if let Err(e) = result {
            warn!(
                client_order_id = %client_order_id,
                %trading_pair,
                error = %e,
                "order submission failed"
            );
            self.tracker
                .mark_failed(&client_order_id, &e.to_string())
                .await;
        }
    }

    async fn create_order_inner(
        &self,
        side: TradeSide,
        client_order_id: &str,
        trading_pair: &str,
        amount: Decimal,
        order_type: OrderType,
        price: Decimal,
    ) -> Result<(), ExchangeError> {
        let rule = self
            .trading_rules
            .read()
            .await
            .get(trading_pair)
            .cloned()
            .ok_or_else(|| {
                ExchangeError::InvalidOrder(format!("no trading rule for {trading_pair}"))
            })?;

        let amount = quantize(amount, rule.min_base_amount_increment);
        let price = quantize(price, rule.min_price_increment);
        if amount < rule.min_order_size {
            return Err(ExchangeError::InvalidOrder(format!(
                "amount {amount} below minimum order size {}",
                rule.min_order_size
            )));
        }
        if amount > rule.max_order_size {
            return Err(ExchangeError::InvalidOrder(format!(
                "amount {amount} above maximum order size {}",
                rule.max_order_size
            )));
        }
        if price <= Decimal::ZERO {
            return Err(ExchangeError::InvalidOrder(format!(
                "price {price} must be positive"
            )));
        }

        // Track optimistically so stream events arriving before the REST
        // acknowledgement still find the order.
        self.tracker
            .start_tracking(InFlightOrder::new(
                client_order_id.to_string(),
                trading_pair.to_string(),
                order_type,
                side,
                price,
                amount,
            ))
            .await;

        let exchange_order_id = self
            .rest
            .create_order(trading_pair, side, amount, price)
            .await?;
        info!(client_order_id, %exchange_order_id, trading_pair, "order placed");
        self.tracker
            .confirm_created(client_order_id, &exchange_order_id)
            .await
    }
}

pub struct ZebpayExchange {
    inner: Arc<ExchangeInner>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    resync_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<TradingPair>>>,
}

impl ZebpayExchange {
    pub fn new(config: ConnectorConfig, credentials: Credentials) -> Result<Self, ExchangeError> {
        let throttler = Arc::new(Throttler::new(
            config.rest_weight_capacity,
            config.rest_period(),
        ));
        let auth = ZebpayAuth::new(&credentials);
        let rest = Arc::new(RestClient::new(&config, auth, throttler)?);
        let (books, resync_rx) = BookSynchronizer::new(&config.trading_pairs);
        let events = EventBus::new(config.event_bus_capacity);
        let tracker = OrderTracker::new(events.clone());
        let (market_tx, _) = broadcast::channel(config.event_bus_capacity);
        let (shutdown_tx, _) = broadcast::channel(4);

        Ok(Self {
            inner: Arc::new(ExchangeInner {
                config,
                rest,
                books: Arc::new(books),
                tracker,
                events,
                trading_rules: Arc::new(RwLock::new(HashMap::new())),
                balances: RwLock::new(Balances::default()),
                market_tx,
                user_stream_last_recv: Arc::new(AtomicU64::new(0)),
                poll_notify: Notify::new(),
                last_tick_ms: AtomicU64::new(0),
                last_status_poll_ms: AtomicU64::new(0),
            }),
            shutdown_tx,
            tasks: std::sync::Mutex::new(Vec::new()),
            resync_rx: std::sync::Mutex::new(Some(resync_rx)),
        })
    }

    pub fn name(&self) -> &'static str {
        EXCHANGE_NAME
    }

    /// Handle for host-side lifecycle event consumption.
    pub fn subscribe_events(&self) -> EventStream {
        self.inner.events.subscribe()
    }

    /// Canonical market-data messages (snapshots, diffs, trades) as they
    /// are applied.
    pub fn subscribe_market_data(&self) -> broadcast::Receiver<CanonicalMessage> {
        self.inner.market_tx.subscribe()
    }

    /// Spawns the connector task set: market data feeds, user stream,
    /// snapshot/rules refresh and the status poll loop.
    pub async fn start(&self) -> Result<(), ExchangeError> {
        let Some(resync_rx) = self.resync_rx.lock().expect("resync lock").take() else {
            warn!("connector already started");
            return Ok(());
        };
        let inner = &self.inner;
        let config = &inner.config;
        let reconnect_delay = config.reconnect_delay();
        let mut tasks = Vec::new();

        // Market data: one socket per channel, both into one queue.
        let (feed_tx, mut feed_rx) = mpsc::unbounded_channel::<CanonicalMessage>();
        for (label, channel) in [
            ("book_diff_feed", FeedChannel::Book),
            ("trade_feed", FeedChannel::History),
        ] {
            let feed = Arc::new(WsFeed::new(
                config,
                config.trading_pairs.clone(),
                vec![channel],
            ));
            let tx = feed_tx.clone();
            let shutdown = self.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                supervisor::run_supervised(label, reconnect_delay, shutdown, move || {
                    let feed = Arc::clone(&feed);
                    let tx = tx.clone();
                    async move { feed.run_session(&tx).await }
                })
                .await;
            }));
        }

        // Market router: applies book messages, republishes everything.
        {
            let inner = Arc::clone(inner);
            let mut shutdown = self.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.recv() => return,
                        message = feed_rx.recv() => {
                            let Some(message) = message else { return };
                            let _ = inner.market_tx.send(message.clone());
                            if let Err(e) = inner.books.apply(&message).await {
                                warn!(error = %e, "dropping market message");
                            }
                        }
                    }
                }
            }));
        }

        // Snapshot refresh: hourly sweep plus resync requests.
        tasks.push(tokio::spawn(supervisor::run_snapshot_loop(
            Arc::clone(&inner.rest),
            Arc::clone(&inner.books),
            inner.market_tx.clone(),
            resync_rx,
            config.snapshot_pacing(),
            self.shutdown_tx.subscribe(),
        )));

        // Trading rules refresh.
        tasks.push(tokio::spawn(supervisor::run_trading_rules_loop(
            Arc::clone(&inner.rest),
            Arc::clone(&inner.trading_rules),
            config.user_country.clone(),
            Duration::from_secs(config.trading_rules_interval_secs),
            self.shutdown_tx.subscribe(),
        )));

        if config.trading_required {
            // User stream feed.
            let user_feed = Arc::new(
                WsFeed::new(config, config.trading_pairs.clone(), vec![FeedChannel::User])
                    .with_last_recv(Arc::clone(&inner.user_stream_last_recv)),
            );
            let (user_tx, mut user_rx) = mpsc::unbounded_channel::<CanonicalMessage>();
            let shutdown = self.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                supervisor::run_supervised("user_stream_feed", reconnect_delay, shutdown, move || {
                    let feed = Arc::clone(&user_feed);
                    let tx = user_tx.clone();
                    async move { feed.run_session(&tx).await }
                })
                .await;
            }));

            // User stream router.
            {
                let inner = Arc::clone(inner);
                let mut shutdown = self.shutdown_tx.subscribe();
                tasks.push(tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            _ = shutdown.recv() => return,
                            message = user_rx.recv() => {
                                let Some(message) = message else { return };
                                match message {
                                    CanonicalMessage::Order(update) => {
                                        inner.tracker.apply_order_update(&update).await;
                                    }
                                    CanonicalMessage::Balance(update) => {
                                        inner.apply_balance_update(&update).await;
                                    }
                                    other => {
                                        warn!(?other, "unexpected message on user stream");
                                    }
                                }
                            }
                        }
                    }
                }));
            }

            // Status poll loop, woken by the clock tick.
            {
                let inner = Arc::clone(inner);
                let mut shutdown = self.shutdown_tx.subscribe();
                tasks.push(tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            _ = shutdown.recv() => return,
                            _ = inner.poll_notify.notified() => {
                                if let Err(e) = inner.update_balances().await {
                                    warn!(error = %e, "balance refresh failed");
                                }
                                inner.update_order_status().await;
                            }
                        }
                    }
                }));
            }
        }

        self.tasks.lock().expect("task lock").extend(tasks);
        info!(pairs = inner.config.trading_pairs.len(), "connector started");
        Ok(())
    }

    /// Signals shutdown and tears the task set down. Cancellation wins over
    /// any retry sleep or pending read inside the tasks.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(());
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().expect("task lock").drain(..).collect();
        for handle in handles {
            handle.abort();
        }
        info!("connector stopped");
    }

    /// Clock callback. Picks the poll cadence from user-stream liveness and
    /// wakes the status poll loop when a poll interval boundary is crossed.
    pub fn tick(&self, timestamp_ms: u64) {
        let inner = &self.inner;
        let last_recv = inner.user_stream_last_recv.load(Ordering::Relaxed);
        let idle_ms = inner.config.user_stream_idle_secs * 1_000;
        let interval_ms = if now_ms().saturating_sub(last_recv) > idle_ms {
            inner.config.short_poll_interval_secs * 1_000
        } else {
            inner.config.long_poll_interval_secs * 1_000
        }
        .max(1);
        let last_tick = inner.last_tick_ms.swap(timestamp_ms, Ordering::Relaxed);
        if timestamp_ms / interval_ms > last_tick / interval_ms {
            inner.poll_notify.notify_one();
        }
    }

    // ====================================================================
    // TRADING
    // ====================================================================

    /// Submits a buy order and returns the client order id immediately; the
    /// created/failed event reports the outcome.
    pub fn buy(
        &self,
        trading_pair: &str,
        amount: Decimal,
        order_type: OrderType,
        price: Decimal,
    ) -> String {
        self.submit(TradeSide::Buy, trading_pair, amount, order_type, price)
    }

    /// Submits a sell order and returns the client order id immediately.
    pub fn sell(
        &self,
        trading_pair: &str,
        amount: Decimal,
        order_type: OrderType,
        price: Decimal,
    ) -> String {
        self.submit(TradeSide::Sell, trading_pair, amount, order_type, price)
    }

    fn submit(
        &self,
        side: TradeSide,
        trading_pair: &str,
        amount: Decimal,
        order_type: OrderType,
        price: Decimal,
    ) -> String {
        let client_order_id = new_client_order_id(side, trading_pair);
        let inner = Arc::clone(&self.inner);
        let id = client_order_id.clone();
        let pair = trading_pair.to_string();
        tokio::spawn(async move {
            inner
                .create_order(side, id, pair, amount, order_type, price)
                .await;
        });
        client_order_id
    }

    /// Cancels one order. An id unknown to the tracker resolves as an
    /// immediate logical success with no exchange call; an exchange-side
    /// "order not found" for a known order is likewise treated as success.
    pub async fn cancel(&self, client_order_id: &str) -> Result<String, ExchangeError> {
        let Some(order) = self.inner.tracker.get(client_order_id).await else {
            self.inner.events.publish(OrderEvent::Cancelled {
                timestamp_ms: now_ms(),
                client_order_id: client_order_id.to_string(),
                exchange_order_id: None,
            });
            return Ok(client_order_id.to_string());
        };
        let exchange_order_id = order.exchange_order_id.clone().ok_or_else(|| {
            ExchangeError::OrderNotFound(format!(
                "{client_order_id} has no exchange order id yet"
            ))
        })?;
        match self.inner.rest.delete_order(&exchange_order_id).await {
            Ok(acks) => {
                if !acks.iter().any(|ack| ack.order_id == exchange_order_id) {
                    warn!(
                        client_order_id,
                        %exchange_order_id,
                        "delete response names a different order id"
                    );
                }
                self.inner.tracker.resolve_cancelled(client_order_id).await;
                Ok(client_order_id.to_string())
            }
            Err(e) if e.is_order_not_found() => {
                // Already gone on the exchange side: resolved, not an error.
                self.inner.tracker.resolve_cancelled(client_order_id).await;
                Ok(client_order_id.to_string())
            }
            Err(e) => {
                error!(client_order_id, error = %e, "cancellation failed");
                Err(e)
            }
        }
    }

    /// Cancels every non-terminal order within the timeout; anything left
    /// unresolved is reported as a failed cancellation.
    pub async fn cancel_all(&self, timeout: Duration) -> Vec<CancellationResult> {
        let incomplete: Vec<InFlightOrder> = self
            .inner
            .tracker
            .active_orders()
            .await
            .into_iter()
            .filter(|order| !order.is_done())
            .collect();
        let mut pending: HashSet<String> = incomplete
            .iter()
            .map(|order| order.client_order_id.clone())
            .collect();
        let mut results = Vec::new();

        let run = async {
            for order in &incomplete {
                match self.cancel(&order.client_order_id).await {
                    Ok(_) => {
                        pending.remove(&order.client_order_id);
                        results.push(CancellationResult {
                            client_order_id: order.client_order_id.clone(),
                            success: true,
                        });
                    }
                    Err(e) => {
                        warn!(client_order_id = %order.client_order_id, error = %e,
                            "cancel_all: order not cancelled");
                    }
                }
            }
        };
        if tokio::time::timeout(timeout, run).await.is_err() {
            warn!("cancel_all timed out before all orders resolved");
        }

        for client_order_id in pending {
            results.push(CancellationResult {
                client_order_id,
                success: false,
            });
        }
        results
    }

    // ====================================================================
    // STATE ACCESS
    // ====================================================================

    /// Runs a closure against the live order book of a tracked pair.
    pub async fn with_order_book<R>(
        &self,
        trading_pair: &str,
        f: impl FnOnce(&OrderBook) -> R,
    ) -> Result<R, ExchangeError> {
        self.inner.books.with_book(trading_pair, f).await
    }

    /// Builds a fresh order book for the pair from a REST snapshot.
    pub async fn get_new_order_book(&self, trading_pair: &str) -> Result<OrderBook, ExchangeError> {
        let raw = self.inner.rest.get_order_book_snapshot(trading_pair).await?;
        let snapshot = normalizer::snapshot_from_rest(trading_pair, raw, now_ms())?;
        let mut book = OrderBook::new();
        book.apply_snapshot(&snapshot.bids, &snapshot.asks, snapshot.token);
        Ok(book)
    }

    pub async fn get_balance(&self, asset: &str) -> Decimal {
        self.inner
            .balances
            .read()
            .await
            .total
            .get(asset)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub async fn available_balance(&self, asset: &str) -> Decimal {
        self.inner
            .balances
            .read()
            .await
            .available
            .get(asset)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub async fn trading_rule(&self, trading_pair: &str) -> Option<TradingRule> {
        self.inner.trading_rules.read().await.get(trading_pair).cloned()
    }

    pub async fn in_flight_orders(&self) -> Vec<InFlightOrder> {
        self.inner.tracker.active_orders().await
    }

    /// Serializable snapshot of all non-terminal orders for warm restarts.
    pub async fn tracking_states(&self) -> HashMap<String, SavedOrderState> {
        self.inner.tracker.tracking_states().await
    }

    pub async fn restore_tracking_states(&self, saved: HashMap<String, SavedOrderState>) {
        self.inner.tracker.restore_tracking_states(saved).await;
    }

    /// Component readiness, host-visible for status reporting.
    pub async fn status_dict(&self) -> HashMap<&'static str, bool> {
        let inner = &self.inner;
        let trading = inner.config.trading_required;
        let mut status = HashMap::new();
        status.insert("order_books_initialized", inner.books.ready().await);
        status.insert(
            "account_balance",
            !trading || !inner.balances.read().await.total.is_empty(),
        );
        status.insert(
            "trading_rules_initialized",
            !inner.trading_rules.read().await.is_empty(),
        );
        status.insert(
            "user_stream_initialized",
            !trading || inner.user_stream_last_recv.load(Ordering::Relaxed) > 0,
        );
        status
    }

    pub async fn is_ready(&self) -> bool {
        self.status_dict().await.values().all(|ok| *ok)
    }
}

#[async_trait]
impl ExchangeAdapter for ZebpayExchange {
    fn name(&self) -> &'static str {
        EXCHANGE_NAME
    }

    async fn check_network(&self) -> NetworkStatus {
        match self.inner.rest.ping().await {
            Ok(()) => NetworkStatus::Connected,
            Err(_) => NetworkStatus::NotConnected,
        }
    }

    async fn ready(&self) -> bool {
        self.is_ready().await
    }

    fn tick(&self, timestamp_ms: u64) {
        ZebpayExchange::tick(self, timestamp_ms);
    }

    async fn start(&self) -> Result<(), ExchangeError> {
        ZebpayExchange::start(self).await
    }

    async fn stop(&self) {
        ZebpayExchange::stop(self).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_client_order_id_format() {
        let id = new_client_order_id(TradeSide::Buy, "BTC-AUD");
        assert!(id.starts_with("ZBP-B-BTC-AUD-"));
        let id = new_client_order_id(TradeSide::Sell, "DAI-INR");
        assert!(id.starts_with("ZBP-S-DAI-INR-"));
        assert_ne!(
            new_client_order_id(TradeSide::Buy, "BTC-AUD"),
            new_client_order_id(TradeSide::Buy, "BTC-AUD")
        );
    }

    #[test]
    fn test_quantize_rounds_down_to_increment() {
        assert_eq!(quantize(dec!(1.2345), dec!(0.01)), dec!(1.23));
        assert_eq!(quantize(dec!(10), dec!(0.5)), dec!(10));
        assert_eq!(quantize(dec!(10.49), dec!(0.5)), dec!(10.0));
        assert_eq!(quantize(dec!(3), Decimal::ZERO), dec!(3));
    }
}
