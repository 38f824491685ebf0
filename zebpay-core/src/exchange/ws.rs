// zebpay-core/src/exchange/ws.rs
// One WebSocket session: subscribe on connect, then a read loop bounded by
// the inactivity timeout with a shorter-fused ping probe. Any session error
// surfaces to the supervisor, which owns the reconnect policy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info};

use zebpay_common::types::TradingPair;

use crate::config::ConnectorConfig;

use super::errors::ExchangeError;
use super::normalizer::{normalize_frame, Discard};
use super::types::CanonicalMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedChannel {
    /// Order book diffs.
    Book,
    /// Public trade history.
    History,
    /// Private order/balance events.
    User,
}

impl FeedChannel {
    pub fn subscription_name(&self) -> &'static str {
        match self {
            FeedChannel::Book => "book",
            FeedChannel::History => "history",
            FeedChannel::User => "user",
        }
    }
}

pub struct WsFeed {
    url: String,
    markets: Vec<TradingPair>,
    channels: Vec<FeedChannel>,
    message_timeout: Duration,
    ping_timeout: Duration,
    last_recv_ms: Arc<AtomicU64>,
}

impl WsFeed {
    pub fn new(config: &ConnectorConfig, markets: Vec<TradingPair>, channels: Vec<FeedChannel>) -> Self {
        Self {
            url: config.ws_url().to_string(),
            markets,
            channels,
            message_timeout: config.message_timeout(),
            ping_timeout: config.ping_timeout(),
            last_recv_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Millisecond timestamp of the last received frame, shared with the
    /// poll scheduler.
    pub fn last_recv_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.last_recv_ms)
    }

    /// Shares an externally owned last-received counter instead of the
    /// feed's own.
    pub fn with_last_recv(mut self, handle: Arc<AtomicU64>) -> Self {
        self.last_recv_ms = handle;
        self
    }

    fn subscribe_frame(&self) -> String {
        let subscriptions: Vec<&str> = self
            .channels
            .iter()
            .map(FeedChannel::subscription_name)
            .collect();
        json!({
            "method": "subscribe",
            "markets": self.markets,
            "subscriptions": subscriptions,
        })
        .to_string()
    }

    /// Runs one connection until it fails or the peer closes. Returning
    /// `Err` hands control back to the supervisor's reconnect loop.
    pub async fn run_session(
        &self,
        out: &mpsc::UnboundedSender<CanonicalMessage>,
    ) -> Result<(), ExchangeError> {
        let (ws_stream, _) = connect_async(&self.url).await?;
        let (mut write, mut read) = ws_stream.split();
        write.send(Message::Text(self.subscribe_frame())).await?;
        info!(url = %self.url, channels = self.channels.len(), "websocket session established");

        loop {
            let item = match timeout(self.message_timeout, read.next()).await {
                Ok(item) => item,
                Err(_) => {
                    // Inactivity: probe liveness, give the pong a short fuse.
                    write.send(Message::Ping(Vec::new())).await?;
                    match timeout(self.ping_timeout, read.next()).await {
                        Ok(item) => item,
                        Err(_) => {
                            return Err(ExchangeError::WebSocket("ping timed out".to_string()))
                        }
                    }
                }
            };
            let message = match item {
                None => return Err(ExchangeError::WebSocket("connection closed".to_string())),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(message)) => message,
            };
            self.touch();

            match message {
                Message::Text(text) => self.dispatch(&text, out)?,
                Message::Binary(bytes) => {
                    let text = String::from_utf8(bytes).map_err(|e| {
                        ExchangeError::WebSocket(format!("non-utf8 frame: {e}"))
                    })?;
                    self.dispatch(&text, out)?;
                }
                Message::Ping(payload) => {
                    write.send(Message::Pong(payload)).await?;
                }
                Message::Pong(_) => {}
                Message::Close(_) => {
                    return Err(ExchangeError::WebSocket("close frame received".to_string()))
                }
                _ => {}
            }
        }
    }

    /// A frame that cannot be normalized ends the session; only the
    /// subscription ack is quietly skipped.
    fn dispatch(
        &self,
        raw: &str,
        out: &mpsc::UnboundedSender<CanonicalMessage>,
    ) -> Result<(), ExchangeError> {
        match normalize_frame(raw) {
            Ok(CanonicalMessage::Error(err)) => Err(ExchangeError::Api {
                code: err.code,
                message: err.message,
            }),
            Ok(message) => out
                .send(message)
                .map_err(|_| ExchangeError::WebSocket("message consumer gone".to_string())),
            Err(Discard::Ack) => {
                debug!("subscription acknowledged");
                Ok(())
            }
            Err(Discard::Malformed { reason }) => {
                Err(ExchangeError::WebSocket(format!("malformed frame: {reason}")))
            }
            Err(Discard::Unrecognized { kind }) => Err(ExchangeError::WebSocket(format!(
                "unrecognized message type '{kind}'"
            ))),
        }
    }

    fn touch(&self) {
        let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        self.last_recv_ms.store(now_ms, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Domain;

    fn feed(channels: Vec<FeedChannel>) -> WsFeed {
        let config = ConnectorConfig::new(
            Domain::Prod,
            "in",
            vec!["BTC-AUD".to_string(), "DAI-INR".to_string()],
        );
        WsFeed::new(&config, config.trading_pairs.clone(), channels)
    }

    #[test]
    fn test_subscribe_frame_shape() {
        let feed = feed(vec![FeedChannel::Book, FeedChannel::History]);
        let frame: serde_json::Value = serde_json::from_str(&feed.subscribe_frame()).unwrap();
        assert_eq!(frame["method"], "subscribe");
        assert_eq!(frame["markets"][1], "DAI-INR");
        assert_eq!(frame["subscriptions"][0], "book");
        assert_eq!(frame["subscriptions"][1], "history");
    }

    #[test]
    fn test_user_channel_name() {
        assert_eq!(FeedChannel::User.subscription_name(), "user");
    }

    #[tokio::test]
    async fn test_dispatch_fatal_on_unknown_frame() {
        let feed = feed(vec![FeedChannel::Book]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = feed
            .dispatch(r#"{"type":"mystery","data":{}}"#, &tx)
            .unwrap_err();
        assert!(matches!(err, ExchangeError::WebSocket(_)));
    }

    #[tokio::test]
    async fn test_dispatch_forwards_canonical_messages() {
        let feed = feed(vec![FeedChannel::Book]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        feed.dispatch(
            r#"{"type":"l2orderbook","data":{"m":"BTC-AUD","t":9,"b":[["1","2"]],"a":[]}}"#,
            &tx,
        )
        .unwrap();
        assert!(matches!(rx.recv().await, Some(CanonicalMessage::Diff(_))));
    }

    #[tokio::test]
    async fn test_dispatch_error_frame_is_api_error() {
        let feed = feed(vec![FeedChannel::User]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = feed
            .dispatch(r#"{"type":"error","data":{"code":7,"message":"bad"}}"#, &tx)
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Api { code: 7, .. }));
    }
}
