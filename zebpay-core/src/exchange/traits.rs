// zebpay-core/src/exchange/traits.rs

use async_trait::async_trait;

use super::errors::ExchangeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Connected,
    NotConnected,
}

/// Surface the host framework drives: lifecycle, readiness and the clock
/// tick that schedules the REST fallback polling.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lightweight connectivity probe against a public endpoint.
    async fn check_network(&self) -> NetworkStatus;

    /// True once books, rules, balances and the user stream are all live.
    async fn ready(&self) -> bool;

    /// Called by the host clock; decides whether a status poll is due.
    fn tick(&self, timestamp_ms: u64);

    async fn start(&self) -> Result<(), ExchangeError>;

    async fn stop(&self);
}
