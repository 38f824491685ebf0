// exchange/errors.rs

use thiserror::Error;
use zebpay_common::throttle::ThrottlerError;

/// Error types for exchange operations
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Data parsing error: {0}")]
    Parse(String),

    /// Exchange replied with a non-zero error code in the response envelope.
    #[error("API error (code {code}): {message}")]
    Api { code: i64, message: String },

    #[error("HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Order '{0}' is not tracked")]
    OrderNotFound(String),

    #[error("No order book exists for '{0}'")]
    UntrackedPair(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Throttler error: {0}")]
    Throttle(String),
}

impl ExchangeError {
    /// Whether an API failure means "the order is already gone", which the
    /// cancellation path treats as success.
    pub fn is_order_not_found(&self) -> bool {
        match self {
            ExchangeError::OrderNotFound(_) => true,
            ExchangeError::Api { message, .. } => {
                message.to_ascii_lowercase().contains("order not found")
            }
            _ => false,
        }
    }
}

// Convert from common error types
impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::Parse(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ExchangeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ExchangeError::WebSocket(err.to_string())
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        ExchangeError::Network(err.to_string())
    }
}

impl From<ThrottlerError> for ExchangeError {
    fn from(err: ThrottlerError) -> Self {
        ExchangeError::Throttle(err.to_string())
    }
}
