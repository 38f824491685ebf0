// zebpay-core/src/exchange/mod.rs

pub mod auth;
pub mod book_sync;
pub mod errors;
pub mod exchange;
pub mod normalizer;
pub mod orders;
pub mod rest;
pub mod supervisor;
pub mod traits;
pub mod types;
pub mod ws;

// Re-exports for the host framework
pub use auth::ZebpayAuth;
pub use book_sync::BookSynchronizer;
pub use errors::ExchangeError;
pub use exchange::{Balances, ZebpayExchange};
pub use orders::{CancellationResult, InFlightOrder, OrderTracker, SavedOrderState};
pub use rest::RestClient;
pub use traits::{ExchangeAdapter, NetworkStatus};
pub use types::*;
pub use ws::{FeedChannel, WsFeed};
