// zebpay-core/src/config.rs
// Connector configuration. One value is built at startup and handed by
// reference to every component; nothing here lives in module globals.

use std::time::Duration;

use config::{Config, ConfigError, File};
use serde::Deserialize;

use zebpay_common::types::TradingPair;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Prod,
    Sandbox,
}

impl Domain {
    pub fn rest_url(&self) -> &'static str {
        match self {
            Domain::Prod => "https://www.zebapi.com/pro/v1",
            Domain::Sandbox => "https://www.zebpay.co/pro/v1",
        }
    }

    pub fn ws_url(&self) -> &'static str {
        match self {
            Domain::Prod => "wss://ws-feed.zebpay.com/marketdata",
            Domain::Sandbox => "wss://ws-feed.zebpay.co/marketdata",
        }
    }
}

/// Private API credentials. Header-based auth; no request signing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectorConfig {
    pub domain: Domain,
    /// Country code used by the trade-pair rules endpoint, e.g. "in" or "au".
    pub user_country: String,
    pub trading_pairs: Vec<TradingPair>,
    /// When false, only public market data is tracked.
    pub trading_required: bool,

    /// Shared REST budget: weight per rolling period.
    pub rest_weight_capacity: u32,
    pub rest_period_ms: u64,

    pub message_timeout_secs: u64,
    pub ping_timeout_secs: u64,
    pub reconnect_delay_secs: u64,

    pub short_poll_interval_secs: u64,
    pub long_poll_interval_secs: u64,
    pub order_status_min_interval_secs: u64,
    pub trading_rules_interval_secs: u64,
    /// Delay between per-pair snapshot fetches inside one refresh sweep.
    pub snapshot_pacing_ms: u64,
    /// User stream silence beyond this switches the poll loop to the
    /// short interval.
    pub user_stream_idle_secs: u64,

    pub event_bus_capacity: usize,
}

impl ConnectorConfig {
    pub fn new(domain: Domain, user_country: &str, trading_pairs: Vec<TradingPair>) -> Self {
        Self {
            domain,
            user_country: user_country.to_string(),
            trading_pairs,
            trading_required: true,
            rest_weight_capacity: 4,
            rest_period_ms: 1_000,
            message_timeout_secs: 30,
            ping_timeout_secs: 10,
            reconnect_delay_secs: 30,
            short_poll_interval_secs: 11,
            long_poll_interval_secs: 120,
            order_status_min_interval_secs: 45,
            trading_rules_interval_secs: 60,
            snapshot_pacing_ms: 200,
            user_stream_idle_secs: 60,
            event_bus_capacity: 256,
        }
    }

    /// Loads settings from an optional `zebpay.toml` next to the process,
    /// falling back to the built-in defaults for anything unset.
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("domain", "prod")?
            .set_default("user_country", "in")?
            .set_default("trading_pairs", Vec::<String>::new())?
            .set_default("trading_required", true)?
            .set_default("rest_weight_capacity", 4)?
            .set_default("rest_period_ms", 1_000)?
            .set_default("message_timeout_secs", 30)?
            .set_default("ping_timeout_secs", 10)?
            .set_default("reconnect_delay_secs", 30)?
            .set_default("short_poll_interval_secs", 11)?
            .set_default("long_poll_interval_secs", 120)?
            .set_default("order_status_min_interval_secs", 45)?
            .set_default("trading_rules_interval_secs", 60)?
            .set_default("snapshot_pacing_ms", 200)?
            .set_default("user_stream_idle_secs", 60)?
            .set_default("event_bus_capacity", 256)?
            .add_source(File::with_name("zebpay").required(false))
            .build()?;
        s.try_deserialize()
    }

    pub fn rest_url(&self) -> &'static str {
        self.domain.rest_url()
    }

    pub fn ws_url(&self) -> &'static str {
        self.domain.ws_url()
    }

    pub fn message_timeout(&self) -> Duration {
        Duration::from_secs(self.message_timeout_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn rest_period(&self) -> Duration {
        Duration::from_millis(self.rest_period_ms)
    }

    pub fn snapshot_pacing(&self) -> Duration {
        Duration::from_millis(self.snapshot_pacing_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ConnectorConfig::new(Domain::Prod, "in", vec!["BTC-AUD".to_string()]);
        assert_eq!(cfg.rest_weight_capacity, 4);
        assert_eq!(cfg.message_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.ping_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.reconnect_delay(), Duration::from_secs(30));
        assert!(cfg.rest_url().starts_with("https://www.zebapi.com"));
    }

    #[test]
    fn test_sandbox_urls() {
        let cfg = ConnectorConfig::new(Domain::Sandbox, "au", vec![]);
        assert!(cfg.rest_url().contains("zebpay.co"));
        assert!(cfg.ws_url().starts_with("wss://"));
    }
}
