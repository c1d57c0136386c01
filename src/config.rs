use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::env;

/// Install the global tracing subscriber, filtered by `RUST_LOG`.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Engine configuration, loaded from the environment (with `.env` support).
///
/// Everything has a sensible default except `DATABASE_URL`, which is only
/// required when the Postgres-backed market store is actually constructed.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string for the market-data store.
    pub database_url: Option<String>,
    /// Reference market ticker used for beta and tracking error.
    pub market_ticker: String,
    /// Annual risk-free rate used by Sharpe/Sortino/Treynor.
    pub risk_free_rate: f64,
    /// TTL for portfolio/strategy snapshots in the key-value cache.
    pub cache_ttl_secs: u64,
    /// Earliest date requested from the market-data provider on first ingest.
    pub provider_start: NaiveDate,
    /// Five-minute bars older than this are dropped by `delete_old_data`.
    pub five_minute_horizon_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            market_ticker: "SPY".to_string(),
            risk_free_rate: 0.02,
            cache_ttl_secs: 3600,
            provider_start: NaiveDate::from_ymd_opt(2020, 1, 1).expect("valid date"),
            five_minute_horizon_days: 60,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let risk_free_rate = match env::var("RISK_FREE_RATE") {
            Ok(v) => v
                .parse::<f64>()
                .with_context(|| format!("Invalid RISK_FREE_RATE: {v}"))?,
            Err(_) => defaults.risk_free_rate,
        };

        let cache_ttl_secs = match env::var("CACHE_TTL_SECS") {
            Ok(v) => v
                .parse::<u64>()
                .with_context(|| format!("Invalid CACHE_TTL_SECS: {v}"))?,
            Err(_) => defaults.cache_ttl_secs,
        };

        let provider_start = match env::var("PROVIDER_START") {
            Ok(v) => NaiveDate::parse_from_str(&v, "%Y-%m-%d")
                .with_context(|| format!("Invalid PROVIDER_START: {v}, expected YYYY-MM-DD"))?,
            Err(_) => defaults.provider_start,
        };

        let five_minute_horizon_days = match env::var("FIVE_MINUTE_HORIZON_DAYS") {
            Ok(v) => v
                .parse::<i64>()
                .with_context(|| format!("Invalid FIVE_MINUTE_HORIZON_DAYS: {v}"))?,
            Err(_) => defaults.five_minute_horizon_days,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok(),
            market_ticker: env::var("MARKET_TICKER").unwrap_or(defaults.market_ticker),
            risk_free_rate,
            cache_ttl_secs,
            provider_start,
            five_minute_horizon_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.market_ticker, "SPY");
        assert_eq!(config.cache_ttl_secs, 3600);
        assert_eq!(config.five_minute_horizon_days, 60);
        assert!(config.risk_free_rate > 0.0 && config.risk_free_rate < 0.1);
    }
}
