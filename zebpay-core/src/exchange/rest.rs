// ====
// ZebPay REST API client
// ====
// Shared reqwest client, one throttler acquire per outbound call,
// envelope checking on every response.
// ====

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use zebpay_common::throttle::Throttler;
use zebpay_common::types::{TradeSide, TradingPair};

use crate::config::ConnectorConfig;

use super::auth::ZebpayAuth;
use super::errors::ExchangeError;
use super::types::{
    RestBalance, RestBookSnapshot, RestCancelAck, RestEnvelope, RestMarketOverview, RestOrder,
    RestOrderAck, RestTicker, RestTrade, RestTradePairInfo,
};

const HTTP_TIMEOUT_SECS: u64 = 30;

/// REST connector for the exchange API.
pub struct RestClient {
    client: Client,
    base_url: String,
    auth: ZebpayAuth,
    throttler: Arc<Throttler>,
}

impl RestClient {
    pub fn new(
        config: &ConnectorConfig,
        auth: ZebpayAuth,
        throttler: Arc<Throttler>,
    ) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: config.rest_url().to_string(),
            auth,
            throttler,
        })
    }

    // ====================================================================
    // MARKET DATA
    // ====================================================================

    /// Top-of-book snapshot (first 15 bids and asks).
    pub async fn get_order_book_snapshot(
        &self,
        trading_pair: &str,
    ) -> Result<RestBookSnapshot, ExchangeError> {
        let url = format!("{}/market/{}/book", self.base_url, trading_pair);
        self.get_enveloped(&url, false, 1).await
    }

    pub async fn get_trades(&self, trading_pair: &str) -> Result<Vec<RestTrade>, ExchangeError> {
        let url = format!("{}/market/{}/trades", self.base_url, trading_pair);
        self.get_enveloped(&url, false, 1).await
    }

    /// Price of the most recent fill for the pair.
    pub async fn get_last_traded_price(&self, trading_pair: &str) -> Result<Decimal, ExchangeError> {
        let trades = self.get_trades(trading_pair).await?;
        let last = trades
            .first()
            .ok_or_else(|| ExchangeError::Parse(format!("no trades for {trading_pair}")))?;
        Decimal::from_str(&last.fill_price)
            .map_err(|e| ExchangeError::Parse(format!("invalid fill_price: {e}")))
    }

    /// Mid-price between the current best bid and ask from the ticker.
    pub async fn get_mid_price(&self, trading_pair: &str) -> Result<Decimal, ExchangeError> {
        let url = format!("{}/market/{}/ticker", self.base_url, trading_pair);
        let ticker: RestTicker = self.get_enveloped(&url, false, 1).await?;
        let buy = Decimal::from_str(&ticker.buy)
            .map_err(|e| ExchangeError::Parse(format!("invalid ticker buy: {e}")))?;
        let sell = Decimal::from_str(&ticker.sell)
            .map_err(|e| ExchangeError::Parse(format!("invalid ticker sell: {e}")))?;
        Ok((buy + sell) / Decimal::from(2))
    }

    /// All trading pairs currently listed on the exchange.
    pub async fn fetch_trading_pairs(&self) -> Result<Vec<TradingPair>, ExchangeError> {
        let url = format!("{}/market", self.base_url);
        let markets: Vec<RestMarketOverview> = self.get_enveloped(&url, false, 1).await?;
        Ok(markets.into_iter().map(|m| m.pair).collect())
    }

    /// Trading rules for the user's country.
    pub async fn get_trade_pair_info(
        &self,
        country: &str,
    ) -> Result<Vec<RestTradePairInfo>, ExchangeError> {
        let url = format!("{}/api/v1/tradepairs/{}", self.base_url, country);
        self.get_enveloped(&url, false, 1).await
    }

    /// Lightweight connectivity probe.
    pub async fn ping(&self) -> Result<(), ExchangeError> {
        let url = format!("{}/market", self.base_url);
        let _: Vec<RestMarketOverview> = self.get_enveloped(&url, false, 1).await?;
        Ok(())
    }

    // ====================================================================
    // TRADING
    // ====================================================================

    /// Places a limit order. Returns the exchange order id.
    pub async fn create_order(
        &self,
        trading_pair: &str,
        side: TradeSide,
        size: Decimal,
        price: Decimal,
    ) -> Result<String, ExchangeError> {
        let url = format!("{}/orders", self.base_url);
        let body = json!({
            "trade_pair": trading_pair,
            "side": side.as_book_side(),
            "size": format!("{size:.8}"),
            "price": format!("{price:.8}"),
        });
        let ack: RestOrderAck = self.send_enveloped(&url, Some(body), "POST", true, 1).await?;
        Ok(ack.id)
    }

    /// Deletes one order. The response confirms the id that was removed.
    pub async fn delete_order(
        &self,
        exchange_order_id: &str,
    ) -> Result<Vec<RestCancelAck>, ExchangeError> {
        let url = format!("{}/orders/{}", self.base_url, exchange_order_id);
        self.send_enveloped(&url, None, "DELETE", true, 1).await
    }

    /// Status of all open orders for the account.
    pub async fn list_orders(&self) -> Result<Vec<RestOrder>, ExchangeError> {
        let url = format!("{}/orders", self.base_url);
        self.get_enveloped(&url, true, 1).await
    }

    /// Status of one order by exchange order id.
    pub async fn get_order(&self, exchange_order_id: &str) -> Result<RestOrder, ExchangeError> {
        let url = format!("{}/orders/{}", self.base_url, exchange_order_id);
        self.get_enveloped(&url, true, 1).await
    }

    // ====================================================================
    // ACCOUNT
    // ====================================================================

    pub async fn get_balances(&self) -> Result<Vec<RestBalance>, ExchangeError> {
        let url = format!("{}/v1/balances", self.base_url);
        self.get_enveloped(&url, true, 1).await
    }

    // ====================================================================
    // INTERNAL
    // ====================================================================

    async fn get_enveloped<T: DeserializeOwned>(
        &self,
        url: &str,
        auth_required: bool,
        weight: u32,
    ) -> Result<T, ExchangeError> {
        self.send_enveloped(url, None, "GET", auth_required, weight)
            .await
    }

    async fn send_enveloped<T: DeserializeOwned>(
        &self,
        url: &str,
        body: Option<serde_json::Value>,
        method: &str,
        auth_required: bool,
        weight: u32,
    ) -> Result<T, ExchangeError> {
        self.throttler.acquire(weight).await?;

        let headers = if auth_required {
            self.auth.headers()?
        } else {
            ZebpayAuth::public_headers()
        };
        let mut request = match method {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "DELETE" => self.client.delete(url),
            other => return Err(ExchangeError::Parse(format!("unsupported method {other}"))),
        };
        request = request.headers(headers);
        if let Some(body) = body {
            request = request.json(&body);
        }
        debug!(%url, method, "sending request");

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ExchangeError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let envelope: RestEnvelope<T> = serde_json::from_str(&text)
            .map_err(|e| ExchangeError::Parse(format!("error parsing data from {url}: {e}")))?;
        if envelope.code != 0 {
            return Err(ExchangeError::Api {
                code: envelope.code,
                message: envelope
                    .status_description
                    .unwrap_or_else(|| "no status description".to_string()),
            });
        }
        envelope
            .data
            .ok_or_else(|| ExchangeError::Parse(format!("missing data field from {url}")))
    }
}
