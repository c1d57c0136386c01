use crate::domain::bars::BarSeries;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetKind {
    Equity,
    Etf,
    MutualFund,
    Crypto,
    Index,
    Forex,
}

impl AssetKind {
    /// Map the provider's quote-type label. `MUTUALFUND` and `ETF` have
    /// dedicated spellings; anything else matches case-insensitively.
    pub fn from_provider_label(label: &str) -> Self {
        match label {
            "MUTUALFUND" => AssetKind::MutualFund,
            "ETF" => AssetKind::Etf,
            other => match other.to_ascii_lowercase().as_str() {
                "cryptocurrency" | "crypto" => AssetKind::Crypto,
                "index" => AssetKind::Index,
                "forex" | "currency" => AssetKind::Forex,
                _ => AssetKind::Equity,
            },
        }
    }

    pub fn is_crypto(&self) -> bool {
        matches!(self, AssetKind::Crypto)
    }

    pub fn label(&self) -> &'static str {
        match self {
            AssetKind::Equity => "Equity",
            AssetKind::Etf => "ETF",
            AssetKind::MutualFund => "Mutual Fund",
            AssetKind::Crypto => "Cryptocurrency",
            AssetKind::Index => "Index",
            AssetKind::Forex => "Forex",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    Daily,
    FiveMinute,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetMeta {
    pub ticker: String,
    pub name: String,
    pub kind: AssetKind,
    /// 3-letter ISO code. GBp quotes are normalized to GBP on ingest.
    pub currency: String,
    pub sector: Option<String>,
    pub exchange: String,
    /// Exchange timezone name, e.g. "America/New_York" or "EST".
    pub timezone: String,
}

impl AssetMeta {
    pub fn tz(&self) -> chrono_tz::Tz {
        chrono_tz::Tz::from_str(&self.timezone).unwrap_or(chrono_tz::Tz::UTC)
    }
}

/// A tradable asset with its daily frame and, when available, a
/// five-minute frame. Mutual funds and portfolio-owned copies have no
/// intraday frame; `five_minute()` then falls back to the daily one.
#[derive(Debug, Clone)]
pub struct Asset {
    pub meta: AssetMeta,
    pub daily: BarSeries,
    five_minute: Option<BarSeries>,
}

impl Asset {
    pub fn new(meta: AssetMeta, daily: BarSeries, five_minute: Option<BarSeries>) -> Self {
        let five_minute = match meta.kind {
            AssetKind::MutualFund => None,
            _ => five_minute,
        };
        Self {
            meta,
            daily,
            five_minute,
        }
    }

    /// Daily-frame-only copy. Portfolios hold these: intraday data is
    /// dead weight for accounting and snapshots.
    pub fn daily_only(meta: AssetMeta, daily: BarSeries) -> Self {
        Self {
            meta,
            daily,
            five_minute: None,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.meta.ticker
    }

    pub fn five_minute(&self) -> &BarSeries {
        self.five_minute.as_ref().unwrap_or(&self.daily)
    }

    pub fn has_intraday(&self) -> bool {
        self.five_minute.is_some()
    }

    pub fn frame(&self, timeframe: Timeframe) -> &BarSeries {
        match timeframe {
            Timeframe::Daily => &self.daily,
            Timeframe::FiveMinute => self.five_minute(),
        }
    }

    pub fn frame_mut(&mut self, timeframe: Timeframe) -> &mut BarSeries {
        match timeframe {
            Timeframe::Daily => &mut self.daily,
            Timeframe::FiveMinute => self.five_minute.as_mut().unwrap_or(&mut self.daily),
        }
    }

    /// Drop the intraday frame in place, keeping the allocation out of
    /// portfolio snapshots.
    pub fn into_daily_only(mut self) -> Self {
        self.five_minute = None;
        self
    }
}

// Ticker is the stable identity: portfolios and caches key assets by it.
impl PartialEq for Asset {
    fn eq(&self, other: &Self) -> bool {
        self.meta.ticker == other.meta.ticker
    }
}

impl Eq for Asset {}

impl Hash for Asset {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.meta.ticker.hash(state);
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::domain::bars::{daily_bar, Bar, BarSeries};
    use chrono::NaiveDate;

    pub fn meta(ticker: &str, kind: AssetKind, currency: &str) -> AssetMeta {
        AssetMeta {
            ticker: ticker.to_string(),
            name: ticker.to_string(),
            kind,
            currency: currency.to_string(),
            sector: None,
            exchange: "NYSE".to_string(),
            timezone: "America/New_York".to_string(),
        }
    }

    /// Daily asset over consecutive calendar days starting at `start`,
    /// with the given closes (open = close, volume 1000).
    pub fn daily_asset(ticker: &str, kind: AssetKind, start: NaiveDate, closes: &[f64]) -> Asset {
        let bars: Vec<Bar> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                daily_bar(
                    start + chrono::Days::new(i as u64),
                    c,
                    c,
                    c,
                    c,
                    1000.0,
                )
            })
            .collect();
        Asset::daily_only(meta(ticker, kind, "USD"), BarSeries::from_bars(bars))
    }
}
