use crate::domain::asset::{Asset, AssetKind, Timeframe};
use chrono::{DateTime, Days, Utc};
use statrs::statistics::{Data, Distribution};

/// Periods per year for the given asset kind and timeframe.
///
/// Crypto trades around the clock; equities get ~78 five-minute bars
/// per session.
pub fn ann_factor(kind: AssetKind, timeframe: Timeframe) -> f64 {
    match (timeframe, kind.is_crypto()) {
        (Timeframe::Daily, false) => 252.0,
        (Timeframe::Daily, true) => 365.0,
        (Timeframe::FiveMinute, false) => 252.0 * 78.0,
        (Timeframe::FiveMinute, true) => 252.0 * 24.0 * 12.0,
    }
}

#[derive(Debug, Clone)]
pub struct RollingParams {
    pub window: usize,
    pub ewm: bool,
    /// EWM smoothing factor; takes precedence over `halflife` and `window`.
    pub alpha: Option<f64>,
    pub halflife: Option<f64>,
    pub bollinger_bands: bool,
    pub num_std: f64,
    pub sharpe_ratio: bool,
    /// Annual risk-free rate for the rolling Sharpe.
    pub r: f64,
}

impl Default for RollingParams {
    fn default() -> Self {
        Self {
            window: 20,
            ewm: false,
            alpha: None,
            halflife: None,
            bollinger_bands: false,
            num_std: 2.0,
            sharpe_ratio: false,
            r: 0.0,
        }
    }
}

/// Rolling (or exponentially weighted) mean/std per derived column,
/// indexed identically to the source frame after dropping the leading
/// rows with insufficient data.
#[derive(Debug, Clone, Default)]
pub struct RollingStats {
    pub index: Vec<DateTime<Utc>>,
    pub close_mean: Vec<f64>,
    pub close_std: Vec<f64>,
    pub adj_close_mean: Vec<f64>,
    pub adj_close_std: Vec<f64>,
    pub rets_mean: Vec<f64>,
    pub rets_std: Vec<f64>,
    pub log_rets_mean: Vec<f64>,
    pub log_rets_std: Vec<f64>,
    pub bol_up: Option<Vec<f64>>,
    pub bol_low: Option<Vec<f64>>,
    pub sharpe: Option<Vec<f64>>,
}

impl RollingStats {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Trailing-window mean. Positions with fewer than `window` finite
/// values are NaN.
pub fn rolling_mean(xs: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; xs.len()];
    if window == 0 {
        return out;
    }
    for i in (window - 1)..xs.len() {
        let slice = &xs[i + 1 - window..=i];
        if slice.iter().all(|v| v.is_finite()) {
            out[i] = slice.iter().sum::<f64>() / window as f64;
        }
    }
    out
}

/// Trailing-window sample standard deviation (ddof = 1).
pub fn rolling_std(xs: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; xs.len()];
    if window < 2 {
        return out;
    }
    for i in (window - 1)..xs.len() {
        let slice = &xs[i + 1 - window..=i];
        if slice.iter().all(|v| v.is_finite()) {
            let mean = slice.iter().sum::<f64>() / window as f64;
            let var = slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / (window as f64 - 1.0);
            out[i] = var.sqrt();
        }
    }
    out
}

/// Smoothing factor from the EWM parameterization, precedence
/// `alpha > halflife > span`.
pub fn ewm_alpha(alpha: Option<f64>, halflife: Option<f64>, span: usize) -> f64 {
    if let Some(a) = alpha {
        a
    } else if let Some(hl) = halflife {
        1.0 - (-(2.0f64.ln()) / hl).exp()
    } else {
        2.0 / (span as f64 + 1.0)
    }
}

/// Exponentially weighted mean and bias-corrected standard deviation.
/// NaN inputs are skipped without resetting the weights; positions
/// before the second finite value have NaN std.
pub fn ewm_mean_std(xs: &[f64], alpha: f64) -> (Vec<f64>, Vec<f64>) {
    let decay = 1.0 - alpha;
    let mut mean = vec![f64::NAN; xs.len()];
    let mut std = vec![f64::NAN; xs.len()];

    // Accumulators for the adjusted (finite-history) weighting:
    // weights are (1 - alpha)^k for the k-th most recent observation.
    let mut sw = 0.0; // sum of weights
    let mut sw2 = 0.0; // sum of squared weights
    let mut swx = 0.0; // weighted sum of x
    let mut swx2 = 0.0; // weighted sum of x^2

    for (i, &x) in xs.iter().enumerate() {
        if x.is_finite() {
            sw = sw * decay + 1.0;
            sw2 = sw2 * decay * decay + 1.0;
            swx = swx * decay + x;
            swx2 = swx2 * decay + x * x;
        }
        if sw > 0.0 {
            let m = swx / sw;
            mean[i] = m;
            let denom = sw * sw - sw2;
            if denom > 0.0 {
                let biased = (swx2 / sw - m * m).max(0.0);
                std[i] = (biased * sw * sw / denom).sqrt();
            }
        }
    }
    (mean, std)
}

/// Rolling/EWM statistics over close, adj_close, rets and log_rets,
/// with optional Bollinger bands and a rolling annualized Sharpe.
pub fn rolling_stats(asset: &Asset, timeframe: Timeframe, params: &RollingParams) -> RollingStats {
    let frame = asset.frame(timeframe);
    if frame.is_empty() {
        return RollingStats::default();
    }

    let columns: [Vec<f64>; 4] = [
        frame.closes(),
        frame.adj_closes(),
        frame.rets().to_vec(),
        frame.log_rets().to_vec(),
    ];

    let mut means = Vec::with_capacity(4);
    let mut stds = Vec::with_capacity(4);
    for col in &columns {
        if params.ewm {
            let alpha = ewm_alpha(params.alpha, params.halflife, params.window);
            let (m, s) = ewm_mean_std(col, alpha);
            means.push(m);
            stds.push(s);
        } else {
            means.push(rolling_mean(col, params.window));
            stds.push(rolling_std(col, params.window));
        }
    }

    // Drop leading rows until every column is defined.
    let n = frame.len();
    let first_valid = (0..n)
        .find(|&i| {
            means.iter().all(|m| m[i].is_finite()) && stds.iter().all(|s| s[i].is_finite())
        })
        .unwrap_or(n);

    let trim = |v: &[f64]| v[first_valid..].to_vec();
    let mut stats = RollingStats {
        index: frame.timestamps()[first_valid..].to_vec(),
        close_mean: trim(&means[0]),
        close_std: trim(&stds[0]),
        adj_close_mean: trim(&means[1]),
        adj_close_std: trim(&stds[1]),
        rets_mean: trim(&means[2]),
        rets_std: trim(&stds[2]),
        log_rets_mean: trim(&means[3]),
        log_rets_std: trim(&stds[3]),
        bol_up: None,
        bol_low: None,
        sharpe: None,
    };

    if params.bollinger_bands {
        let up = stats
            .close_mean
            .iter()
            .zip(&stats.close_std)
            .map(|(m, s)| m + params.num_std * s)
            .collect();
        let low = stats
            .close_mean
            .iter()
            .zip(&stats.close_std)
            .map(|(m, s)| m - params.num_std * s)
            .collect();
        stats.bol_up = Some(up);
        stats.bol_low = Some(low);
    }

    if params.sharpe_ratio {
        let factor = ann_factor(asset.meta.kind, timeframe);
        let per_period_rf = (1.0 + params.r).powf(1.0 / factor) - 1.0;
        let sharpe = stats
            .rets_mean
            .iter()
            .zip(&stats.rets_std)
            .map(|(m, s)| {
                if *s > 0.0 {
                    (m - per_period_rf) / s * factor.sqrt()
                } else {
                    f64::NAN
                }
            })
            .collect();
        stats.sharpe = Some(sharpe);
    }

    stats
}

#[derive(Debug, Clone)]
pub struct ReturnStats {
    pub total_return: f64,
    pub daily_mean: f64,
    pub daily_median: f64,
    pub daily_std: f64,
    pub annualized_vol: f64,
}

#[derive(Debug, Clone)]
pub struct PriceStats {
    pub high: f64,
    pub low: f64,
    pub week52_high: f64,
    pub week52_low: f64,
    pub current: f64,
}

#[derive(Debug, Clone)]
pub struct DistributionStats {
    pub skewness: f64,
    pub kurtosis: f64,
}

#[derive(Debug, Clone)]
pub struct AssetStats {
    pub returns: ReturnStats,
    pub price: PriceStats,
    pub distribution: DistributionStats,
}

/// Linear-interpolated quantile over the finite values, matching the
/// default dataframe semantics.
pub fn quantile(xs: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = xs.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = q * (sorted.len() as f64 - 1.0);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
    }
}

/// Moment-based sample skewness.
pub fn skewness(xs: &[f64]) -> f64 {
    let finite: Vec<f64> = xs.iter().copied().filter(|v| v.is_finite()).collect();
    let n = finite.len() as f64;
    if n < 2.0 {
        return f64::NAN;
    }
    let mean = finite.iter().sum::<f64>() / n;
    let m2 = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let m3 = finite.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / n;
    if m2 <= 0.0 {
        return f64::NAN;
    }
    m3 / m2.powf(1.5)
}

/// Moment-based excess kurtosis.
pub fn kurtosis(xs: &[f64]) -> f64 {
    let finite: Vec<f64> = xs.iter().copied().filter(|v| v.is_finite()).collect();
    let n = finite.len() as f64;
    if n < 2.0 {
        return f64::NAN;
    }
    let mean = finite.iter().sum::<f64>() / n;
    let m2 = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let m4 = finite.iter().map(|v| (v - mean).powi(4)).sum::<f64>() / n;
    if m2 <= 0.0 {
        return f64::NAN;
    }
    m4 / (m2 * m2) - 3.0
}

/// Summary statistics over the daily frame. `None` when the asset has
/// no bars. The 52-week window is anchored at the last stored bar, not
/// the wall clock.
pub fn summary_stats(asset: &Asset) -> Option<AssetStats> {
    let daily = &asset.daily;
    if daily.is_empty() {
        return None;
    }
    let bars = daily.bars();
    let closes = daily.closes();
    let rets: Vec<f64> = daily
        .rets()
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect();

    let rets_data = Data::new(rets.clone());
    let daily_mean = rets_data.mean().unwrap_or(f64::NAN);
    let daily_std = rets_data.std_dev().unwrap_or(f64::NAN);
    let daily_median = quantile(&rets, 0.5);

    let vol_factor = ann_factor(asset.meta.kind, Timeframe::Daily);

    let today = daily.last_date()?;
    let cutoff = today.checked_sub_days(Days::new(364))?;
    let year_bars: Vec<_> = bars.iter().filter(|b| b.date() >= cutoff).collect();

    Some(AssetStats {
        returns: ReturnStats {
            total_return: closes.last()? / closes.first()? - 1.0,
            daily_mean,
            daily_median,
            daily_std,
            annualized_vol: daily_std * vol_factor.sqrt(),
        },
        price: PriceStats {
            high: bars.iter().map(|b| b.high).fold(f64::MIN, f64::max),
            low: bars.iter().map(|b| b.low).fold(f64::MAX, f64::min),
            week52_high: year_bars.iter().map(|b| b.high).fold(f64::MIN, f64::max),
            week52_low: year_bars.iter().map(|b| b.low).fold(f64::MAX, f64::min),
            current: *closes.last()?,
        },
        distribution: DistributionStats {
            skewness: skewness(&rets),
            kurtosis: kurtosis(&rets),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::asset::testing::daily_asset;
    use chrono::NaiveDate;

    #[test]
    fn ann_factors_match_asset_mix() {
        assert_eq!(ann_factor(AssetKind::Equity, Timeframe::Daily), 252.0);
        assert_eq!(ann_factor(AssetKind::Crypto, Timeframe::Daily), 365.0);
        assert_eq!(
            ann_factor(AssetKind::Equity, Timeframe::FiveMinute),
            252.0 * 78.0
        );
        assert_eq!(
            ann_factor(AssetKind::Crypto, Timeframe::FiveMinute),
            252.0 * 24.0 * 12.0
        );
    }

    #[test]
    fn rolling_mean_drops_leading_window() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let means = rolling_mean(&xs, 3);
        assert!(means[0].is_nan());
        assert!(means[1].is_nan());
        assert!((means[2] - 2.0).abs() < 1e-12);
        assert!((means[3] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn rolling_std_is_sample_std() {
        let xs = [1.0, 2.0, 3.0];
        let stds = rolling_std(&xs, 3);
        assert!((stds[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn ewm_alpha_precedence() {
        assert_eq!(ewm_alpha(Some(0.5), Some(10.0), 20), 0.5);
        let from_halflife = ewm_alpha(None, Some(1.0), 20);
        assert!((from_halflife - 0.5).abs() < 1e-12);
        let from_span = ewm_alpha(None, None, 19);
        assert!((from_span - 0.1).abs() < 1e-12);
    }

    #[test]
    fn ewm_mean_converges_toward_latest_values() {
        let xs = vec![0.0; 50]
            .into_iter()
            .chain(vec![10.0; 50])
            .collect::<Vec<_>>();
        let (mean, _) = ewm_mean_std(&xs, 0.3);
        assert!(mean[49] < 0.01);
        assert!(mean[99] > 9.9);
    }

    #[test]
    fn rolling_stats_trims_leading_nans_and_adds_bands() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let asset = daily_asset("TEST", AssetKind::Equity, start, &closes);

        let params = RollingParams {
            window: 5,
            bollinger_bands: true,
            ..RollingParams::default()
        };
        let stats = rolling_stats(&asset, Timeframe::Daily, &params);

        // rets has a leading NaN, so the first valid row is window + 1.
        assert_eq!(stats.len(), 30 - 5);
        assert!(stats.close_mean.iter().all(|v| v.is_finite()));

        let up = stats.bol_up.as_ref().unwrap();
        let low = stats.bol_low.as_ref().unwrap();
        for i in 0..stats.len() {
            let width = up[i] - stats.close_mean[i];
            assert!((width - 2.0 * stats.close_std[i]).abs() < 1e-9);
            assert!((stats.close_mean[i] - low[i] - width).abs() < 1e-9);
        }
    }

    #[test]
    fn summary_stats_uses_minimum_for_52w_low() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let closes = [100.0, 95.0, 110.0, 90.0, 105.0];
        let asset = daily_asset("TEST", AssetKind::Equity, start, &closes);

        let stats = summary_stats(&asset).unwrap();
        assert_eq!(stats.price.week52_low, 90.0);
        assert_eq!(stats.price.week52_high, 110.0);
        assert_eq!(stats.price.current, 105.0);
        assert!((stats.returns.total_return - 0.05).abs() < 1e-12);
    }

    #[test]
    fn summary_stats_on_empty_asset_is_none() {
        let asset = daily_asset(
            "EMPTY",
            AssetKind::Equity,
            NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(),
            &[],
        );
        assert!(summary_stats(&asset).is_none());
    }
}
