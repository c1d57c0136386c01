use crate::domain::asset::{Asset, AssetKind, AssetMeta};
use crate::domain::bars::{Bar, BarSeries};
use crate::infrastructure::persistence::{MarketStore, TickerRow};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const RETRY_ATTEMPTS: usize = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Metadata as the external provider reports it, before normalization.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub name: String,
    pub exchange: String,
    pub currency: String,
    pub quote_type: String,
    pub timezone: String,
    pub sector: Option<String>,
    pub market_cap: Option<f64>,
}

/// The external market-data source (implemented by the HTTP layer).
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// None when the ticker is unknown to the provider.
    async fn profile(&self, ticker: &str) -> Result<Option<ProviderProfile>>;
    async fn daily_history(&self, ticker: &str, start: NaiveDate) -> Result<Vec<Bar>>;
    async fn five_minute_history(&self, ticker: &str) -> Result<Vec<Bar>>;
    /// OHLC history for an fx pair given as `"XXXYYY"` (provider
    /// format, no separator).
    async fn fx_history(
        &self,
        pair: &str,
        start: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64, f64, f64, f64)>>;
}

/// Map provider exchange codes onto the market-calendar names.
pub fn normalize_exchange(code: &str) -> &str {
    match code {
        "NYQ" => "NYSE",
        "NMS" | "NGM" | "NAS" => "NASDAQ",
        "PCX" => "NYSE",
        "PNK" => "stock",
        "FGI" => "LSE",
        other => other,
    }
}

/// Map provider quote types onto the stored asset-type labels.
pub fn normalize_kind_label(quote_type: &str) -> String {
    match quote_type {
        "MUTUALFUND" => "Mutual Fund".to_string(),
        "ETF" => "ETF".to_string(),
        other => {
            let lower = other.to_ascii_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => lower,
            }
        }
    }
}

/// GBp-quoted prices arrive in pence; divide through to GBP.
fn pence_to_pounds(bars: &mut [Bar]) {
    for bar in bars {
        bar.open /= 100.0;
        bar.high /= 100.0;
        bar.low /= 100.0;
        bar.close /= 100.0;
        bar.adj_close /= 100.0;
    }
}

async fn with_retry<T, F, Fut>(what: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
    let mut last_err = None;
    for attempt in 1..=RETRY_ATTEMPTS {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(what, attempt, %err, "provider call failed");
                last_err = Some(err);
                if attempt < RETRY_ATTEMPTS {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
    Err(last_err.expect("at least one attempt"))
}

/// Pulls new tickers from the provider into the store and materializes
/// [`Asset`]s from stored bars.
pub struct AssetLoader {
    store: Arc<dyn MarketStore>,
    provider: Arc<dyn MarketDataProvider>,
    history_start: NaiveDate,
}

impl AssetLoader {
    pub fn new(
        store: Arc<dyn MarketStore>,
        provider: Arc<dyn MarketDataProvider>,
        history_start: NaiveDate,
    ) -> Self {
        Self {
            store,
            provider,
            history_start,
        }
    }

    /// Load an asset from the store, ingesting it from the provider on
    /// first sight. An invalid ticker yields an empty asset (and a
    /// warning) so analytics degrade to empty results instead of
    /// failing the whole request.
    pub async fn load(&self, ticker: &str) -> Result<Asset> {
        if self.store.ticker_meta(ticker).await?.is_none() {
            match self.ingest_asset(ticker).await? {
                IngestOutcome::Inserted(_) => {}
                IngestOutcome::UnknownTicker => {
                    warn!(ticker, "unknown to the provider, returning empty asset");
                    return Ok(Asset::daily_only(
                        empty_meta(ticker),
                        BarSeries::default(),
                    ));
                }
            }
        }

        let row = self
            .store
            .ticker_meta(ticker)
            .await?
            .ok_or_else(|| anyhow::anyhow!("ticker {ticker} vanished after ingest"))?;
        let meta = row.meta();

        let daily = BarSeries::from_bars(self.store.daily_bars(ticker).await?);
        let five_minute = if meta.kind == AssetKind::MutualFund {
            None
        } else {
            let bars = self.store.five_minute_bars(ticker).await?;
            (!bars.is_empty()).then(|| BarSeries::from_bars(bars))
        };

        Ok(Asset::new(meta, daily, five_minute))
    }

    /// Build an asset straight from the provider without writing to
    /// the store. Used for one-off lookups that should not be tracked.
    pub async fn load_from_provider(&self, ticker: &str) -> Result<Asset> {
        let provider = &self.provider;
        let Some(profile) = with_retry("profile", || provider.profile(ticker)).await? else {
            warn!(ticker, "unknown to the provider, returning empty asset");
            return Ok(Asset::daily_only(empty_meta(ticker), BarSeries::default()));
        };

        let mut currency = profile.currency.clone();
        let in_pence = currency == "GBp";
        if in_pence {
            currency = "GBP".to_string();
        }
        let kind = AssetKind::from_provider_label(&profile.quote_type);

        let start = self.history_start;
        let mut daily = with_retry("daily history", || provider.daily_history(ticker, start)).await?;
        if in_pence {
            pence_to_pounds(&mut daily);
        }
        let daily = BarSeries::from_bars(daily);

        let five_minute = if kind == AssetKind::MutualFund {
            None
        } else {
            let mut bars =
                with_retry("five-minute history", || provider.five_minute_history(ticker)).await?;
            if in_pence {
                pence_to_pounds(&mut bars);
            }
            (!bars.is_empty()).then(|| BarSeries::from_bars(bars))
        };

        let meta = AssetMeta {
            ticker: ticker.to_string(),
            name: profile.name.clone(),
            kind,
            currency,
            sector: profile.sector.clone(),
            exchange: normalize_exchange(&profile.exchange).to_string(),
            timezone: profile.timezone.clone(),
        };
        Ok(Asset::new(meta, daily, five_minute))
    }

    /// Download, normalize and store everything about a new ticker.
    pub async fn ingest_asset(&self, ticker: &str) -> Result<IngestOutcome> {
        let provider = &self.provider;
        let Some(profile) = with_retry("profile", || provider.profile(ticker)).await? else {
            return Ok(IngestOutcome::UnknownTicker);
        };

        info!(ticker, "ingesting new ticker from provider");

        let mut currency = profile.currency.clone();
        let in_pence = currency == "GBp";
        if in_pence {
            currency = "GBP".to_string();
        }

        let row = TickerRow {
            ticker: ticker.to_string(),
            comp_name: profile.name.clone(),
            exchange: normalize_exchange(&profile.exchange).to_string(),
            sector: profile.sector.clone().or_else(|| {
                (profile.quote_type == "CRYPTOCURRENCY").then(|| "Cryptocurrency".to_string())
            }),
            market_cap: profile.market_cap,
            start_date: Utc::now().date_naive(),
            currency: currency.clone(),
            asset_type: normalize_kind_label(&profile.quote_type),
            timezone: profile.timezone.clone(),
        };

        self.register_new_currency(&currency).await?;
        self.store.insert_ticker(&row).await?;

        let start = self.history_start;
        let mut daily = with_retry("daily history", || provider.daily_history(ticker, start)).await?;
        if in_pence {
            pence_to_pounds(&mut daily);
        }
        // Run the bars through the series constructor so high/low pass
        // the store's CHECK constraints.
        let daily = BarSeries::from_bars(daily);
        self.store.insert_daily_bars(ticker, daily.bars()).await?;

        if row.asset_type != "Mutual Fund" {
            let mut five = with_retry("five-minute history", || {
                provider.five_minute_history(ticker)
            })
            .await?;
            if in_pence {
                pence_to_pounds(&mut five);
            }
            let five = BarSeries::from_bars(five);
            self.store
                .insert_five_minute_bars(ticker, five.bars())
                .await?;
        }

        Ok(IngestOutcome::Inserted(row))
    }

    /// When a currency shows up for the first time, backfill fx pairs
    /// against every currency already tracked, in both directions.
    async fn register_new_currency(&self, currency: &str) -> Result<()> {
        let pairs = self
            .store
            .distinct_values("currency_pair", "daily_forex")
            .await?;
        let mut known: Vec<String> = pairs
            .iter()
            .filter_map(|p| p.split('/').next())
            .map(str::to_string)
            .collect();
        known.sort();
        known.dedup();

        if known.iter().any(|c| c == currency) {
            return Ok(());
        }

        for other in known {
            for (from, to) in [(other.as_str(), currency), (currency, other.as_str())] {
                let provider_pair = format!("{from}{to}");
                let start = self.history_start;
                let rows = with_retry("fx history", || {
                    self.provider.fx_history(&provider_pair, start)
                })
                .await?;
                let store_pair = format!("{from}/{to}");
                self.store.insert_forex_rows(&store_pair, &rows).await?;
                info!(pair = %store_pair, rows = rows.len(), "fx pair backfilled");
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum IngestOutcome {
    Inserted(TickerRow),
    UnknownTicker,
}

fn empty_meta(ticker: &str) -> AssetMeta {
    AssetMeta {
        ticker: ticker.to_string(),
        name: ticker.to_string(),
        kind: AssetKind::Equity,
        currency: "USD".to_string(),
        sector: None,
        exchange: "NYSE".to_string(),
        timezone: "UTC".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_codes_follow_the_calendar_names() {
        assert_eq!(normalize_exchange("NYQ"), "NYSE");
        assert_eq!(normalize_exchange("NMS"), "NASDAQ");
        assert_eq!(normalize_exchange("NGM"), "NASDAQ");
        assert_eq!(normalize_exchange("PCX"), "NYSE");
        assert_eq!(normalize_exchange("PNK"), "stock");
        assert_eq!(normalize_exchange("FGI"), "LSE");
        assert_eq!(normalize_exchange("LSE"), "LSE");
    }

    #[test]
    fn kind_labels_are_normalized() {
        assert_eq!(normalize_kind_label("MUTUALFUND"), "Mutual Fund");
        assert_eq!(normalize_kind_label("ETF"), "ETF");
        assert_eq!(normalize_kind_label("EQUITY"), "Equity");
        assert_eq!(normalize_kind_label("CRYPTOCURRENCY"), "Cryptocurrency");
    }

    #[test]
    fn pence_scaling_divides_every_price_column() {
        let mut bars = vec![Bar {
            ts: Utc::now(),
            open: 150.0,
            high: 160.0,
            low: 140.0,
            close: 155.0,
            adj_close: 154.0,
            volume: 10.0,
        }];
        pence_to_pounds(&mut bars);
        assert_eq!(bars[0].open, 1.5);
        assert_eq!(bars[0].high, 1.6);
        assert_eq!(bars[0].low, 1.4);
        assert_eq!(bars[0].close, 1.55);
        assert_eq!(bars[0].adj_close, 1.54);
        assert_eq!(bars[0].volume, 10.0);
    }
}
