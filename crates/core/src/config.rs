use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub polling: PollingConfig,
    pub chart: ChartConfig,
}

/// RIT REST API connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub request_timeout_ms: u64,
    /// History responses can be large, so they get their own timeout
    pub history_timeout_ms: u64,
    pub requests_per_second: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9999/v1".to_string(),
            username: "1".to_string(),
            password: "1".to_string(),
            request_timeout_ms: 2000,
            history_timeout_ms: 3000,
            requests_per_second: 20,
        }
    }
}

impl ApiConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub fn history_timeout(&self) -> Duration {
        Duration::from_millis(self.history_timeout_ms)
    }
}

/// What the controller does when a case poll fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseFailurePolicy {
    /// Keep the prior clock and retry on the next tick
    #[default]
    Transient,
    /// Halt the controller
    Fatal,
}

/// Per-feed refetch intervals and case limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub case_interval_ms: u64,
    pub price_interval_ms: u64,
    pub history_interval_ms: u64,
    pub news_interval_ms: u64,
    pub tick_limit: i64,
    pub case_failure_policy: CaseFailurePolicy,
    /// Cadence of the driving loop in the CLI
    pub loop_interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            case_interval_ms: 500,
            price_interval_ms: 200,
            history_interval_ms: 500,
            news_interval_ms: 1000,
            tick_limit: 1800,
            case_failure_policy: CaseFailurePolicy::Transient,
            loop_interval_ms: 100,
        }
    }
}

impl PollingConfig {
    #[must_use]
    pub fn case_interval(&self) -> Duration {
        Duration::from_millis(self.case_interval_ms)
    }

    #[must_use]
    pub fn price_interval(&self) -> Duration {
        Duration::from_millis(self.price_interval_ms)
    }

    #[must_use]
    pub fn history_interval(&self) -> Duration {
        Duration::from_millis(self.history_interval_ms)
    }

    #[must_use]
    pub fn news_interval(&self) -> Duration {
        Duration::from_millis(self.news_interval_ms)
    }

    #[must_use]
    pub fn loop_interval(&self) -> Duration {
        Duration::from_millis(self.loop_interval_ms)
    }
}

/// Where candle prices come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceMode {
    /// Rebuild candles from the history endpoint
    #[default]
    History,
    /// Sample the last traded price and aggregate incrementally
    LastPrice,
}

/// Position axis used for live samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionAxis {
    /// Seconds since the controller started
    #[default]
    Elapsed,
    /// Current case tick
    Tick,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Ticker to chart; the first listed security when unset
    pub ticker: Option<String>,
    pub granularity: u32,
    /// Row cap for history fetches; uncapped when unset
    pub history_limit: Option<u32>,
    pub price_mode: PriceMode,
    pub position_axis: PositionAxis,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            ticker: None,
            granularity: 10,
            history_limit: Some(15000),
            price_mode: PriceMode::History,
            position_axis: PositionAxis::Elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.api.base_url, "http://localhost:9999/v1");
        assert_eq!(config.api.request_timeout(), Duration::from_secs(2));
        assert_eq!(config.api.history_timeout(), Duration::from_secs(3));
        assert_eq!(config.polling.tick_limit, 1800);
        assert_eq!(config.polling.case_interval(), Duration::from_millis(500));
        assert_eq!(config.polling.news_interval(), Duration::from_secs(1));
        assert_eq!(config.polling.case_failure_policy, CaseFailurePolicy::Transient);
        assert_eq!(config.chart.granularity, 10);
        assert_eq!(config.chart.history_limit, Some(15000));
        assert_eq!(config.chart.price_mode, PriceMode::History);
    }

    #[test]
    fn test_enum_serde_names() {
        assert_eq!(
            serde_json::to_string(&PriceMode::LastPrice).unwrap(),
            "\"last_price\""
        );
        assert_eq!(
            serde_json::from_str::<CaseFailurePolicy>("\"fatal\"").unwrap(),
            CaseFailurePolicy::Fatal
        );
        assert_eq!(
            serde_json::from_str::<PositionAxis>("\"tick\"").unwrap(),
            PositionAxis::Tick
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"chart": {"ticker": "CRZY"}}"#).unwrap();
        assert_eq!(config.chart.ticker.as_deref(), Some("CRZY"));
        assert_eq!(config.chart.granularity, 10);
        assert_eq!(config.api, ApiConfig::default());
    }
}
