use crate::domain::asset::Asset;
use crate::domain::bars::PRICE_WALK_LIMIT_DAYS;
use crate::domain::errors::EngineError;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// Daily closing rates for an ordered currency pair.
///
/// Lookups forward-fill: a query on a day without a quote walks
/// backwards, and past the walk limit falls back to the most recent
/// known rate (stale FX beats a hard failure for cash conversions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FxSeries {
    from: String,
    to: String,
    rows: Vec<(NaiveDate, f64)>,
}

impl FxSeries {
    pub fn new(from: &str, to: &str, mut rows: Vec<(NaiveDate, f64)>) -> Self {
        rows.sort_by_key(|(date, _)| *date);
        rows.dedup_by_key(|(date, _)| *date);
        Self {
            from: from.to_string(),
            to: to.to_string(),
            rows,
        }
    }

    /// Pair formatted the way the store keys it: `"XXX/YYY"`.
    pub fn pair(&self) -> String {
        format!("{}/{}", self.from, self.to)
    }

    pub fn from_currency(&self) -> &str {
        &self.from
    }

    pub fn to_currency(&self) -> &str {
        &self.to
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Closing rate at `date`, walking backwards day by day. Beyond the
    /// walk limit the most recent known rate is used; an empty series is
    /// `MissingData`.
    pub fn rate_on(&self, date: NaiveDate) -> Result<f64, EngineError> {
        if self.rows.is_empty() {
            return Err(EngineError::MissingData {
                what: format!("fx rate {}", self.pair()),
                date,
            });
        }

        let mut day = date;
        for _ in 0..=PRICE_WALK_LIMIT_DAYS {
            if let Some(rate) = self.rate_exactly_on(day) {
                return Ok(rate);
            }
            match day.checked_sub_days(Days::new(1)) {
                Some(prev) => day = prev,
                None => break,
            }
        }

        // Fall back to the last rate at or before the requested date,
        // or the earliest known rate for queries before the series.
        let idx = self.rows.partition_point(|(d, _)| *d <= date);
        let (_, rate) = if idx > 0 {
            self.rows[idx - 1]
        } else {
            self.rows[0]
        };
        Ok(rate)
    }

    fn rate_exactly_on(&self, date: NaiveDate) -> Option<f64> {
        self.rows
            .binary_search_by_key(&date, |(d, _)| *d)
            .ok()
            .map(|i| self.rows[i].1)
    }

    /// Convert a point value quoted in `from` at `date` into `to`.
    pub fn convert_value(&self, value: f64, date: NaiveDate) -> Result<f64, EngineError> {
        Ok(value * self.rate_on(date)?)
    }

    /// Convert a whole asset into the target currency: join the rate
    /// onto the daily index with forward-fill, scale OHLC + adj_close
    /// pointwise and recompute returns.
    pub fn convert_asset(&self, asset: &mut Asset) -> Result<(), EngineError> {
        debug_assert_eq!(asset.meta.currency, self.from);
        if asset.daily.is_empty() {
            asset.meta.currency = self.to.clone();
            return Ok(());
        }

        let mut factors = Vec::with_capacity(asset.daily.len());
        for bar in asset.daily.bars() {
            factors.push(self.rate_on(bar.date())?);
        }
        asset.daily.scale_prices(&factors);
        asset.meta.currency = self.to.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::asset::{testing, AssetKind};

    fn gbp_usd() -> FxSeries {
        FxSeries::new(
            "GBP",
            "USD",
            vec![
                (NaiveDate::from_ymd_opt(2023, 1, 3).unwrap(), 1.20),
                (NaiveDate::from_ymd_opt(2023, 1, 4).unwrap(), 1.25),
                (NaiveDate::from_ymd_opt(2023, 1, 6).unwrap(), 1.30),
            ],
        )
    }

    #[test]
    fn rate_walks_back_to_previous_quote() {
        let fx = gbp_usd();
        // Jan 5 has no quote; Jan 4 does.
        let day = NaiveDate::from_ymd_opt(2023, 1, 5).unwrap();
        assert_eq!(fx.rate_on(day).unwrap(), 1.25);
    }

    #[test]
    fn rate_falls_back_to_latest_known_past_walk_limit() {
        let fx = gbp_usd();
        let far = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(fx.rate_on(far).unwrap(), 1.30);
    }

    #[test]
    fn empty_series_is_missing_data() {
        let fx = FxSeries::new("GBP", "USD", vec![]);
        assert!(fx
            .rate_on(NaiveDate::from_ymd_opt(2023, 1, 3).unwrap())
            .is_err());
    }

    #[test]
    fn convert_asset_scales_prices_and_recomputes_returns() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 3).unwrap();
        let mut asset = testing::daily_asset("HSBA.L", AssetKind::Equity, start, &[10.0, 10.0]);
        asset.meta.currency = "GBP".to_string();

        gbp_usd().convert_asset(&mut asset).unwrap();

        assert_eq!(asset.meta.currency, "USD");
        let closes = asset.daily.adj_closes();
        assert!((closes[0] - 12.0).abs() < 1e-12);
        assert!((closes[1] - 12.5).abs() < 1e-12);
        // Flat GBP prices now show the FX move as a return.
        assert!((asset.daily.rets()[1] - (12.5 / 12.0 - 1.0)).abs() < 1e-12);
    }
}
