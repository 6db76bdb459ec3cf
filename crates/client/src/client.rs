//! RIT REST API client with rate limiting.
//!
//! # Example
//!
//! ```ignore
//! use rit_candles_client::RitClient;
//! use rit_candles_core::ApiConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = RitClient::new(&ApiConfig::default())?;
//!
//!     let tickers = client.tickers().await?;
//!     println!("Tradable: {:?}", tickers);
//!
//!     let case = client.case().await?;
//!     println!("Tick {} ({})", case.tick, case.status);
//!
//!     Ok(())
//! }
//! ```

use crate::types::{RawCase, Security};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::Client;
use rit_candles_core::{
    ApiConfig, CaseReport, CaseSource, FeedError, HistorySource, NewsSource, PriceSource,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// RIT REST API client.
///
/// All requests carry HTTP basic auth and wait on a shared rate limiter.
pub struct RitClient {
    config: ApiConfig,
    http: Client,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
}

impl std::fmt::Debug for RitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RitClient")
            .field("base_url", &self.config.base_url)
            .field("requests_per_second", &self.config.requests_per_second)
            .finish_non_exhaustive()
    }
}

impl RitClient {
    /// Creates a client from API settings.
    ///
    /// # Errors
    /// Returns `Transport` if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, FeedError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| FeedError::Transport(format!("failed to build HTTP client: {e}")))?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(nonzero!(20u32));
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            config: config.clone(),
            http,
            rate_limiter,
        })
    }

    /// Sets a custom base URL (useful for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Waits for the rate limiter and makes an authenticated GET request.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<T, FeedError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        tracing::debug!("GET {} {:?}", url, query);

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("Accept", "application/json")
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(FeedError::http(status.as_u16(), text));
        }

        response.json::<T>().await.map_err(map_transport_error)
    }

    /// Current case clock.
    ///
    /// # Errors
    /// Returns a `FeedError` on transport, status or decode failure.
    pub async fn case(&self) -> Result<CaseReport, FeedError> {
        let raw: RawCase = self
            .get("/case", &[], self.config.request_timeout())
            .await?;
        Ok(raw.into())
    }

    /// All listed securities.
    ///
    /// # Errors
    /// Returns a `FeedError` on transport, status or decode failure.
    pub async fn securities(&self) -> Result<Vec<Security>, FeedError> {
        self.get("/securities", &[], self.config.request_timeout())
            .await
    }

    /// Listed tickers, sorted and de-duplicated.
    ///
    /// # Errors
    /// Returns a `FeedError` on transport, status or decode failure.
    pub async fn tickers(&self) -> Result<Vec<String>, FeedError> {
        let mut tickers: Vec<String> = self
            .securities()
            .await?
            .into_iter()
            .map(|security| security.ticker)
            .filter(|ticker| !ticker.is_empty())
            .collect();
        tickers.sort();
        tickers.dedup();
        Ok(tickers)
    }

    /// Last traded price of `ticker`, `None` if it has not traded.
    ///
    /// # Errors
    /// Returns `TickerNotFound` if the ticker is not listed.
    pub async fn last(&self, ticker: &str) -> Result<Option<f64>, FeedError> {
        self.securities()
            .await?
            .into_iter()
            .find(|security| security.ticker == ticker)
            .map(|security| security.last)
            .ok_or_else(|| FeedError::ticker_not_found(ticker))
    }

    /// Latest news items, newest first.
    ///
    /// A single object or scalar body is returned as a one-item list.
    ///
    /// # Errors
    /// Returns a `FeedError` on transport, status or decode failure.
    pub async fn news(&self) -> Result<Vec<Value>, FeedError> {
        let body: Value = self
            .get("/news", &[], self.config.request_timeout())
            .await?;

        Ok(match body {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        })
    }

    /// Raw price history for `ticker`, optionally capped in row count.
    ///
    /// # Errors
    /// Returns a `FeedError` on transport, status or decode failure.
    pub async fn history(&self, ticker: &str, limit: Option<u32>) -> Result<Value, FeedError> {
        let mut query = vec![("ticker", ticker.to_string())];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }

        self.get("/securities/history", &query, self.config.history_timeout())
            .await
    }
}

fn map_transport_error(err: reqwest::Error) -> FeedError {
    if err.is_timeout() {
        FeedError::Timeout(err.to_string())
    } else if err.is_decode() {
        FeedError::Malformed(err.to_string())
    } else {
        FeedError::Transport(err.to_string())
    }
}

#[async_trait]
impl CaseSource for RitClient {
    async fn case_status(&self) -> Result<CaseReport, FeedError> {
        self.case().await
    }
}

#[async_trait]
impl PriceSource for RitClient {
    async fn last_price(&self, ticker: &str) -> Result<Option<f64>, FeedError> {
        self.last(ticker).await
    }
}

#[async_trait]
impl NewsSource for RitClient {
    async fn headlines(&self) -> Result<Vec<Value>, FeedError> {
        self.news().await
    }
}

#[async_trait]
impl HistorySource for RitClient {
    async fn history(&self, ticker: &str, limit: Option<u32>) -> Result<Value, FeedError> {
        RitClient::history(self, ticker, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> RitClient {
        RitClient::new(&ApiConfig::default())
            .unwrap()
            .with_base_url(server.uri())
    }

    // ==================== Case Tests ====================

    #[tokio::test]
    async fn test_case_sends_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/case"))
            .and(header("authorization", "Basic MTox"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "Algo Case",
                "period": 1,
                "tick": 118,
                "ticks_per_period": 1800,
                "status": "ACTIVE"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let report = client_for(&server).case().await.unwrap();
        assert_eq!(report, CaseReport::new(118, "ACTIVE"));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/case"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client_for(&server).case().await.unwrap_err();
        assert_eq!(err, FeedError::http(500, "boom"));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/case"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"tick": 1, "status": "ACTIVE"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let config = ApiConfig {
            request_timeout_ms: 50,
            ..ApiConfig::default()
        };
        let client = RitClient::new(&config).unwrap().with_base_url(server.uri());

        let err = client.case().await.unwrap_err();
        assert!(matches!(err, FeedError::Timeout(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_invalid_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/case"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).case().await.unwrap_err();
        assert!(matches!(err, FeedError::Malformed(_)), "got {err:?}");
    }

    // ==================== Securities Tests ====================

    #[tokio::test]
    async fn test_tickers_sorted_and_unique() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/securities"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"ticker": "RTM", "last": 10.0},
                {"ticker": "CRZY", "last": 25.0},
                {"ticker": "RTM", "last": 10.0},
                {"last": 1.0}
            ])))
            .mount(&server)
            .await;

        let tickers = client_for(&server).tickers().await.unwrap();
        assert_eq!(tickers, vec!["CRZY".to_string(), "RTM".to_string()]);
    }

    #[tokio::test]
    async fn test_last_price_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/securities"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"ticker": "CRZY", "last": 25.17},
                {"ticker": "RTM", "last": null}
            ])))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.last_price("CRZY").await.unwrap(), Some(25.17));
        assert_eq!(client.last_price("RTM").await.unwrap(), None);
        assert_eq!(
            client.last_price("NOPE").await.unwrap_err(),
            FeedError::ticker_not_found("NOPE")
        );
    }

    // ==================== News Tests ====================

    #[tokio::test]
    async fn test_news_list_passthrough() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/news"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"news_id": 2, "headline": "Second"},
                {"news_id": 1, "headline": "First"}
            ])))
            .mount(&server)
            .await;

        let items = client_for(&server).headlines().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["headline"], "Second");
    }

    #[tokio::test]
    async fn test_news_single_object_wrapped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/news"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"headline": "Only one"})),
            )
            .mount(&server)
            .await;

        let items = client_for(&server).news().await.unwrap();
        assert_eq!(items, vec![json!({"headline": "Only one"})]);
    }

    // ==================== History Tests ====================

    #[tokio::test]
    async fn test_history_sends_ticker_and_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/securities/history"))
            .and(query_param("ticker", "CRZY"))
            .and(query_param("limit", "15000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"tick": 2, "open": 10.0, "high": 11.0, "low": 9.5, "close": 10.5}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let body = client_for(&server)
            .history("CRZY", Some(15000))
            .await
            .unwrap();
        assert_eq!(body[0]["tick"], 2);
    }

    #[tokio::test]
    async fn test_history_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/securities/history"))
            .respond_with(ResponseTemplate::new(404).set_body_string("unknown ticker"))
            .mount(&server)
            .await;

        let err = client_for(&server).history("NOPE", None).await.unwrap_err();
        assert_eq!(err, FeedError::http(404, "unknown ticker"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_rate_limit_falls_back_when_zero() {
        let config = ApiConfig {
            requests_per_second: 0,
            ..ApiConfig::default()
        };
        assert!(RitClient::new(&config).is_ok());
    }
}
