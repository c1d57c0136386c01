use crate::application::analytics::quantile;
use crate::application::signals::divergence::{double_pattern_signals, find_double_patterns};
use crate::application::signals::SignalSeries;

/// Price bouncing back inside the bands: sell on the drop back under
/// the upper band, buy on the recovery over the lower band.
pub fn bb_bounce(price: &[f64], bb_up: &[f64], bb_down: &[f64]) -> SignalSeries {
    let n = price.len();
    let mut raw = vec![f64::NAN; n];
    for i in 1..n {
        if price[i - 1] > bb_up[i - 1] && price[i] < bb_up[i] {
            raw[i] = -1.0;
        } else if price[i - 1] < bb_down[i - 1] && price[i] > bb_down[i] {
            raw[i] = 1.0;
        }
    }
    SignalSeries::new(raw).fill_default()
}

/// Double touches of a band, detected on the band-relative overshoot:
/// positive above the upper band, negative below the lower, zero inside.
pub fn bb_double(price: &[f64], bb_up: &[f64], bb_down: &[f64]) -> SignalSeries {
    let hist: Vec<f64> = (0..price.len())
        .map(|i| {
            let width = bb_up[i] - bb_down[i];
            if !width.is_finite() || width <= 0.0 {
                0.0
            } else if price[i] > bb_up[i] {
                (price[i] - bb_up[i]) / width
            } else if price[i] < bb_down[i] {
                (price[i] - bb_down[i]) / width
            } else {
                0.0
            }
        })
        .collect();

    let (tops, bottoms) = find_double_patterns(&hist, 5, 15, 0.05);
    double_pattern_signals(price.len(), &tops, &bottoms)
}

/// Price walking along a band: most of the recent closes within
/// `prox`·width of the band. Walking the upper band is momentum (+1),
/// the lower band −1.
pub fn bb_walks(
    price: &[f64],
    bb_up: &[f64],
    bb_down: &[f64],
    prox: f64,
    periods: usize,
) -> SignalSeries {
    let n = price.len();
    let close_upper: Vec<bool> = (0..n)
        .map(|i| (price[i] - bb_up[i]).abs() < (bb_up[i] - bb_down[i]) * prox)
        .collect();
    let close_lower: Vec<bool> = (0..n)
        .map(|i| (price[i] - bb_down[i]).abs() < (bb_up[i] - bb_down[i]) * prox)
        .collect();

    let mut raw = vec![f64::NAN; n];
    for i in (periods - 1)..n {
        let window = i + 1 - periods..=i;
        let upper = close_upper[window.clone()].iter().filter(|b| **b).count();
        let lower = close_lower[window].iter().filter(|b| **b).count();
        if upper >= periods - 1 {
            raw[i] = 1.0;
        } else if lower >= periods - 1 {
            raw[i] = -1.0;
        }
    }
    SignalSeries::new(raw).fill_default()
}

/// Volatility squeeze release: band width dropping under its rolling
/// 20th percentile, then expanding again. The direction of the first
/// move out of the squeeze sets the signal.
pub fn bb_squeeze(
    price: &[f64],
    bb_up: &[f64],
    bb_down: &[f64],
    aggressive: bool,
) -> SignalSeries {
    const LOOKBACK: usize = 20;
    let n = price.len();
    let width: Vec<f64> = (0..n).map(|i| bb_up[i] - bb_down[i]).collect();

    let mut squeeze = vec![false; n];
    for i in (LOOKBACK - 1)..n {
        let q = quantile(&width[i + 1 - LOOKBACK..=i], 0.2);
        squeeze[i] = width[i] < q;
    }

    let mut raw = vec![f64::NAN; n];
    for i in 1..n {
        let ext = if aggressive {
            width[i] > width[i - 1] && squeeze[i - 1]
        } else {
            !squeeze[i] && squeeze[i - 1]
        };
        if ext {
            if price[i] > price[i - 1] {
                raw[i] = 1.0;
            } else if price[i] < price[i - 1] {
                raw[i] = -1.0;
            }
        }
    }
    SignalSeries::new(raw).fill_default()
}

/// Band breach with momentum: the one-bar return must exceed
/// `threshold` of the full momentum range for the breach to count.
pub fn bb_breakout(price: &[f64], bb_up: &[f64], bb_down: &[f64], threshold: f64) -> SignalSeries {
    let n = price.len();
    let mut momentum = vec![f64::NAN; n];
    for i in 1..n {
        if price[i - 1] > 0.0 {
            momentum[i] = price[i] / price[i - 1] - 1.0;
        }
    }
    let finite: Vec<f64> = momentum.iter().copied().filter(|v| v.is_finite()).collect();
    let mom_range = finite.iter().copied().fold(f64::MIN, f64::max)
        - finite.iter().copied().fold(f64::MAX, f64::min);

    let mut raw = vec![f64::NAN; n];
    for i in 0..n {
        if price[i] > bb_up[i] && momentum[i] > threshold * mom_range {
            raw[i] = 1.0;
        } else if price[i] < bb_down[i] && momentum[i] < -threshold * mom_range {
            raw[i] = -1.0;
        }
    }
    SignalSeries::new(raw).fill_default()
}

/// %B: price position normalized within the bands. Above `overbought`
/// is a sell, below `oversold` a buy.
pub fn bb_pct_b(
    price: &[f64],
    bb_up: &[f64],
    bb_down: &[f64],
    overbought: f64,
    oversold: f64,
) -> SignalSeries {
    let n = price.len();
    let mut raw = vec![f64::NAN; n];
    for i in 0..n {
        let width = bb_up[i] - bb_down[i];
        if !width.is_finite() || width <= 0.0 {
            continue;
        }
        let pct_b = (price[i] - bb_down[i]) / width;
        if pct_b > overbought {
            raw[i] = -1.0;
        } else if pct_b < oversold {
            raw[i] = 1.0;
        }
    }
    SignalSeries::new(raw).fill_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_bands(n: usize, up: f64, down: f64) -> (Vec<f64>, Vec<f64>) {
        (vec![up; n], vec![down; n])
    }

    #[test]
    fn bounce_off_upper_band_sells() {
        let (up, down) = flat_bands(4, 110.0, 90.0);
        let price = [105.0, 112.0, 108.0, 108.0];
        let signal = bb_bounce(&price, &up, &down);
        assert_eq!(signal.values()[1], 1.0); // filled default while outside
        assert_eq!(signal.values()[2], -1.0);
        assert_eq!(signal.values()[3], -1.0);
    }

    #[test]
    fn bounce_off_lower_band_buys() {
        let (up, down) = flat_bands(3, 110.0, 90.0);
        let price = [85.0, 95.0, 95.0];
        let signal = bb_bounce(&price, &up, &down);
        assert_eq!(signal.values()[1], 1.0);
    }

    #[test]
    fn pct_b_flags_extremes() {
        let (up, down) = flat_bands(3, 110.0, 90.0);
        // %B: 0.95 (sell), 0.5 (hold), 0.1 (buy).
        let price = [109.0, 100.0, 92.0];
        let signal = bb_pct_b(&price, &up, &down, 0.8, 0.2);
        assert_eq!(signal.values(), &[-1.0, -1.0, 1.0]);
    }

    #[test]
    fn walk_along_upper_band() {
        let n = 8;
        let (up, down) = flat_bands(n, 110.0, 90.0);
        // Last five closes all within 20% of the upper band.
        let price = [100.0, 100.0, 100.0, 108.0, 109.0, 108.0, 109.0, 108.0];
        let signal = bb_walks(&price, &up, &down, 0.2, 5);
        assert_eq!(signal.values()[n - 1], 1.0);
    }

    #[test]
    fn breakout_requires_momentum() {
        let (up, down) = flat_bands(3, 110.0, 90.0);
        // Second bar pops over the band on a large move, third drifts.
        let price = [100.0, 120.0, 120.1];
        let signal = bb_breakout(&price, &up, &down, 0.3);
        assert_eq!(signal.values()[1], 1.0);
        // No fresh breach signal on the drift; fill keeps the long.
        assert_eq!(signal.values()[2], 1.0);
    }

    #[test]
    fn quantile_interpolates() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((quantile(&xs, 0.5) - 3.0).abs() < 1e-12);
        assert!((quantile(&xs, 0.2) - 1.8).abs() < 1e-12);
    }

    #[test]
    fn squeeze_release_signals_direction() {
        let n = 30;
        let mut up = vec![110.0; n];
        let mut down = vec![90.0; n];
        // Narrow the bands for a stretch, then release.
        for i in 22..26 {
            up[i] = 101.0;
            down[i] = 99.0;
        }
        let mut price = vec![100.0; n];
        price[26] = 103.0; // breaks upward as the squeeze releases
        let signal = bb_squeeze(&price, &up, &down, false);
        assert_eq!(signal.values()[26], 1.0);
    }
}
