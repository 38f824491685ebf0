// zebpay-core/src/exchange/auth.rs
// Header-based authentication for the private REST endpoints.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use uuid::Uuid;

use crate::config::Credentials;
use super::errors::ExchangeError;

#[derive(Debug, Clone)]
pub struct ZebpayAuth {
    client_id: String,
    access_token: String,
}

impl ZebpayAuth {
    pub fn new(credentials: &Credentials) -> Self {
        Self {
            client_id: credentials.client_id.clone(),
            access_token: credentials.access_token.clone(),
        }
    }

    /// Fresh request id per call. Example: cf7989e0-2030-41eb-8473-f1ca5eaaaff1
    pub fn generate_request_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Headers for an authenticated request.
    pub fn headers(&self) -> Result<HeaderMap, ExchangeError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("client_id"),
            header_value(&self.client_id)?,
        );
        headers.insert(AUTHORIZATION, header_value(&self.access_token)?);
        headers.insert(
            HeaderName::from_static("requestid"),
            header_value(&Self::generate_request_id())?,
        );
        headers.insert(
            HeaderName::from_static("timestamp"),
            header_value(&chrono::Utc::now().timestamp_millis().to_string())?,
        );
        Ok(headers)
    }

    /// Headers for a public request.
    pub fn public_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }
}

fn header_value(raw: &str) -> Result<HeaderValue, ExchangeError> {
    HeaderValue::from_str(raw).map_err(|e| ExchangeError::Parse(format!("bad header value: {e}")))
}
