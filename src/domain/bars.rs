use crate::domain::errors::EngineError;
use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// How far `price_on` walks backwards across holidays before giving up.
pub const PRICE_WALK_LIMIT_DAYS: u64 = 14;

/// A single OHLCV bar. Daily bars carry a midnight UTC timestamp,
/// five-minute bars the true bar-open instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn date(&self) -> NaiveDate {
        self.ts.date_naive()
    }

    /// Clamp high/low so the series passes the store's price checks.
    pub fn cleaned(mut self) -> Self {
        self.high = self.high.max(self.open).max(self.close);
        self.low = self.low.min(self.open).min(self.close);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResamplePeriod {
    Daily,
    Weekly,
    Monthly,
}

impl ResamplePeriod {
    fn bucket(&self, date: NaiveDate) -> (i32, u32) {
        match self {
            ResamplePeriod::Daily => (date.year(), date.ordinal()),
            ResamplePeriod::Weekly => {
                let week = date.iso_week();
                (week.year(), week.week())
            }
            ResamplePeriod::Monthly => (date.year(), date.month()),
        }
    }
}

/// A borrowed date-bounded window over a [`BarSeries`].
///
/// Returns stay aligned with the parent series, so the first row of a
/// window still knows its return from the bar before the window.
#[derive(Debug, Clone, Copy)]
pub struct BarsView<'a> {
    pub bars: &'a [Bar],
    pub rets: &'a [f64],
    pub log_rets: &'a [f64],
}

impl BarsView<'_> {
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

/// An OHLCV time series sorted by timestamp with derived simple and log
/// returns over `adj_close`.
#[derive(Debug, Clone, Default)]
pub struct BarSeries {
    bars: Vec<Bar>,
    rets: Vec<f64>,
    log_rets: Vec<f64>,
}

impl BarSeries {
    /// Build a series from raw bars: sorts, drops duplicate timestamps
    /// (keeping the later row) and clamps high/low.
    pub fn from_bars(mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.ts);
        bars.dedup_by(|next, prev| {
            if next.ts == prev.ts {
                *prev = *next;
                true
            } else {
                false
            }
        });
        let bars = bars.into_iter().map(Bar::cleaned).collect();
        let mut series = Self {
            bars,
            rets: Vec::new(),
            log_rets: Vec::new(),
        };
        series.recompute_returns();
        series
    }

    /// Recompute `rets` and `log_rets` from `adj_close`. Called after any
    /// price mutation (ingest, currency conversion, resampling).
    pub fn recompute_returns(&mut self) {
        let n = self.bars.len();
        self.rets = vec![f64::NAN; n];
        self.log_rets = vec![f64::NAN; n];
        for i in 1..n {
            let prev = self.bars[i - 1].adj_close;
            let curr = self.bars[i].adj_close;
            if prev > 0.0 {
                self.rets[i] = curr / prev - 1.0;
                self.log_rets[i] = (curr / prev).ln();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Bar] {
        self.bars.as_slice()
    }

    pub fn rets(&self) -> &[f64] {
        self.rets.as_slice()
    }

    pub fn log_rets(&self) -> &[f64] {
        self.log_rets.as_slice()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn adj_closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.adj_close).collect()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.bars.iter().map(|b| b.ts).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(Bar::date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(Bar::date)
    }

    /// Adjusted close at the requested calendar day, walking backwards
    /// across weekends and holidays. The walk is bounded; a date further
    /// than [`PRICE_WALK_LIMIT_DAYS`] from the nearest prior bar fails
    /// with `MissingData`.
    pub fn price_on(&self, date: NaiveDate) -> Result<f64, EngineError> {
        let mut day = date;
        for _ in 0..=PRICE_WALK_LIMIT_DAYS {
            if let Some(price) = self.adj_close_exactly_on(day) {
                return Ok(price);
            }
            day = day
                .checked_sub_days(Days::new(1))
                .ok_or(EngineError::MissingData {
                    what: "adj_close".to_string(),
                    date,
                })?;
        }
        Err(EngineError::MissingData {
            what: "adj_close".to_string(),
            date,
        })
    }

    fn adj_close_exactly_on(&self, date: NaiveDate) -> Option<f64> {
        // Bars are date-sorted; binary search on the calendar day, then
        // take the last bar of that day (relevant for intraday frames).
        let end = self.bars.partition_point(|b| b.date() <= date);
        if end == 0 {
            return None;
        }
        let candidate = &self.bars[end - 1];
        (candidate.date() == date).then_some(candidate.adj_close)
    }

    /// Last adjusted close at or before `date`, unbounded. Used for
    /// forward-filled reindexing when building equity curves.
    pub fn adj_close_at_or_before(&self, date: NaiveDate) -> Option<f64> {
        let end = self.bars.partition_point(|b| b.date() <= date);
        (end > 0).then(|| self.bars[end - 1].adj_close)
    }

    /// Positions of the date-bounded window `[start, end]` (both
    /// inclusive) as a half-open index range.
    pub fn range_indices(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> (usize, usize) {
        let lo = match start {
            Some(s) => self.bars.partition_point(|b| b.date() < s),
            None => 0,
        };
        let hi = match end {
            Some(e) => self.bars.partition_point(|b| b.date() <= e),
            None => self.bars.len(),
        };
        (lo.min(hi), hi)
    }

    /// Date-bounded window; both bounds inclusive.
    pub fn view(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> BarsView<'_> {
        let (lo, hi) = self.range_indices(start, end);
        BarsView {
            bars: &self.bars[lo..hi],
            rets: &self.rets[lo..hi],
            log_rets: &self.log_rets[lo..hi],
        }
    }

    /// OHLCV resampling: open = first, high = max, low = min,
    /// close/adj_close = last, volume = sum. Returns are recomputed on
    /// the resampled adjusted closes.
    pub fn resample(&self, period: ResamplePeriod) -> BarSeries {
        let mut out: Vec<Bar> = Vec::new();
        let mut current: Option<((i32, u32), Bar)> = None;

        for bar in &self.bars {
            let key = period.bucket(bar.date());
            match &mut current {
                Some((k, acc)) if *k == key => {
                    acc.high = acc.high.max(bar.high);
                    acc.low = acc.low.min(bar.low);
                    acc.close = bar.close;
                    acc.adj_close = bar.adj_close;
                    acc.volume += bar.volume;
                    acc.ts = bar.ts;
                }
                _ => {
                    if let Some((_, done)) = current.take() {
                        out.push(done);
                    }
                    current = Some((key, *bar));
                }
            }
        }
        if let Some((_, done)) = current {
            out.push(done);
        }

        BarSeries::from_bars(out)
    }

    /// Multiply OHLC and adjusted close pointwise by `factors` (one per
    /// bar) and recompute returns. Used by the FX converter.
    pub fn scale_prices(&mut self, factors: &[f64]) {
        debug_assert_eq!(factors.len(), self.bars.len());
        for (bar, rate) in self.bars.iter_mut().zip(factors) {
            bar.open *= rate;
            bar.high *= rate;
            bar.low *= rate;
            bar.close *= rate;
            bar.adj_close *= rate;
        }
        self.recompute_returns();
    }
}

/// Convenience constructor for a daily bar at midnight UTC.
pub fn daily_bar(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Bar {
    Bar {
        ts: date.and_hms_opt(0, 0, 0).expect("midnight").and_utc(),
        open,
        high,
        low,
        close,
        adj_close: close,
        volume,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_series(dates: &[(i32, u32, u32)], price: f64) -> BarSeries {
        BarSeries::from_bars(
            dates
                .iter()
                .map(|&(y, m, d)| {
                    daily_bar(
                        NaiveDate::from_ymd_opt(y, m, d).unwrap(),
                        price,
                        price,
                        price,
                        price,
                        1000.0,
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn from_bars_sorts_and_cleans() {
        let d1 = NaiveDate::from_ymd_opt(2023, 1, 3).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2023, 1, 4).unwrap();
        // Out of order, high below close on the second bar.
        let series = BarSeries::from_bars(vec![
            daily_bar(d2, 100.0, 99.0, 101.0, 102.0, 10.0),
            daily_bar(d1, 100.0, 101.0, 99.0, 100.5, 10.0),
        ]);

        assert_eq!(series.first_date(), Some(d1));
        let second = series.bars()[1];
        assert!(second.high >= second.open.max(second.close));
        assert!(second.low <= second.open.min(second.close));
    }

    #[test]
    fn returns_derive_from_adj_close() {
        let d1 = NaiveDate::from_ymd_opt(2023, 1, 3).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2023, 1, 4).unwrap();
        let series = BarSeries::from_bars(vec![
            daily_bar(d1, 100.0, 100.0, 100.0, 100.0, 0.0),
            daily_bar(d2, 110.0, 110.0, 110.0, 110.0, 0.0),
        ]);

        assert!(series.rets()[0].is_nan());
        assert!((series.rets()[1] - 0.1).abs() < 1e-12);
        assert!((series.log_rets()[1] - 1.1f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn price_on_walks_back_over_weekend() {
        // Friday bar, price queried on Sunday.
        let friday = NaiveDate::from_ymd_opt(2023, 1, 6).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2023, 1, 8).unwrap();
        let series = flat_series(&[(2023, 1, 6)], 42.0);

        assert_eq!(series.price_on(friday).unwrap(), 42.0);
        assert_eq!(series.price_on(sunday).unwrap(), 42.0);
    }

    #[test]
    fn price_on_gives_up_past_the_walk_limit() {
        let series = flat_series(&[(2023, 1, 6)], 42.0);
        let far = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
        assert!(matches!(
            series.price_on(far),
            Err(EngineError::MissingData { .. })
        ));
    }

    #[test]
    fn price_before_series_start_is_missing() {
        let series = flat_series(&[(2023, 1, 6)], 42.0);
        let before = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        assert!(series.price_on(before).is_err());
    }

    #[test]
    fn resample_monthly_aggregates() {
        let mut bars = Vec::new();
        for day in 1..=31 {
            if let Some(date) = NaiveDate::from_ymd_opt(2023, 1, day) {
                bars.push(daily_bar(date, 10.0, 12.0, 9.0, 10.0 + day as f64 / 10.0, 5.0));
            }
        }
        for day in 1..=28 {
            if let Some(date) = NaiveDate::from_ymd_opt(2023, 2, day) {
                bars.push(daily_bar(date, 13.0, 15.0, 12.0, 13.0, 5.0));
            }
        }
        let monthly = BarSeries::from_bars(bars).resample(ResamplePeriod::Monthly);

        assert_eq!(monthly.len(), 2);
        let jan = monthly.bars()[0];
        assert_eq!(jan.open, 10.0);
        assert_eq!(jan.close, 13.1); // last day of January
        assert_eq!(jan.volume, 31.0 * 5.0);
        // Returns recomputed on the monthly closes.
        assert!((monthly.rets()[1] - (13.0 / 13.1 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn view_keeps_parent_returns() {
        let series = flat_series(&[(2023, 1, 2), (2023, 1, 3), (2023, 1, 4)], 50.0);
        let start = NaiveDate::from_ymd_opt(2023, 1, 3).unwrap();
        let window = series.view(Some(start), None);

        assert_eq!(window.len(), 2);
        // First row of the window has a return vs the bar before it.
        assert!((window.rets[0] - 0.0).abs() < 1e-12);
    }
}
