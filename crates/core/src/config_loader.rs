use crate::config::AppConfig;
use anyhow::{ensure, Result};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config/Config.toml";
pub const ENV_PREFIX: &str = "RIT_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration from the default TOML file, its JSON sibling
    /// `config/Config.json`, and `RIT_` environment variables, on top of
    /// built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load() -> Result<AppConfig> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Same as [`ConfigLoader::load`] with an explicit TOML path.
    ///
    /// Later layers win: defaults, the TOML file, a `.json` file next to
    /// it with the same stem, then the environment. Missing files are
    /// ignored. Nested keys use `__` in environment variables, e.g.
    /// `RIT_CHART__TICKER=CRZY`.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed,
    /// or if the chart granularity is zero.
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig> {
        let config: AppConfig = Self::figment(path.as_ref()).extract()?;
        ensure!(
            config.chart.granularity >= 1,
            "chart.granularity must be at least 1, got {}",
            config.chart.granularity
        );
        tracing::debug!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Json::file(path.with_extension("json")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CaseFailurePolicy, PriceMode};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = ConfigLoader::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config.polling.tick_limit, 1800);
        assert_eq!(config.chart.granularity, 10);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[api]
base_url = "http://rit.local:10001/v1"

[polling]
tick_limit = 600
case_failure_policy = "fatal"

[chart]
ticker = "RTM"
granularity = 5
price_mode = "last_price"
"#
        )
        .unwrap();

        let config = ConfigLoader::load_from(file.path()).unwrap();
        assert_eq!(config.api.base_url, "http://rit.local:10001/v1");
        assert_eq!(config.api.username, "1");
        assert_eq!(config.polling.tick_limit, 600);
        assert_eq!(config.polling.case_failure_policy, CaseFailurePolicy::Fatal);
        assert_eq!(config.polling.news_interval_ms, 1000);
        assert_eq!(config.chart.ticker.as_deref(), Some("RTM"));
        assert_eq!(config.chart.granularity, 5);
        assert_eq!(config.chart.price_mode, PriceMode::LastPrice);
    }

    #[test]
    fn test_invalid_value_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[polling]\ncase_failure_policy = \"sometimes\"").unwrap();

        assert!(ConfigLoader::load_from(file.path()).is_err());
    }

    #[test]
    fn test_zero_granularity_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[chart]\ngranularity = 0").unwrap();

        let err = ConfigLoader::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("granularity must be at least 1"));
    }

    #[test]
    fn test_json_sibling_overrides_toml() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("Config.toml");
        std::fs::write(&toml_path, "[chart]\nticker = \"RTM\"\ngranularity = 5\n").unwrap();
        std::fs::write(
            dir.path().join("Config.json"),
            r#"{"chart": {"granularity": 20}, "polling": {"tick_limit": 300}}"#,
        )
        .unwrap();

        let config = ConfigLoader::load_from(&toml_path).unwrap();
        assert_eq!(config.chart.granularity, 20);
        assert_eq!(config.chart.ticker.as_deref(), Some("RTM"));
        assert_eq!(config.polling.tick_limit, 300);
    }
}
