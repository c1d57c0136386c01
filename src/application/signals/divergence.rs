use crate::application::signals::peaks::{find_peaks, find_troughs, finite_range};
use crate::application::signals::SignalSeries;

#[derive(Debug, Clone, Copy)]
pub struct DivergenceParams {
    /// Minimum bars between successive peaks, and the half-width of the
    /// window used to match indicator extrema to price extrema.
    pub distance_min: usize,
    /// Maximum bars between the two price extrema of a pattern.
    pub distance_max: usize,
    /// Relative prominence, scaled by the series range.
    pub prominence: f64,
    pub hidden: bool,
    /// For RSI: (upper, lower) bounds the first indicator extremum must
    /// sit beyond for the divergence to count.
    pub rsi_bounds: Option<(f64, f64)>,
}

impl Default for DivergenceParams {
    fn default() -> Self {
        Self {
            distance_min: 7,
            distance_max: 25,
            prominence: 0.05,
            hidden: false,
            rsi_bounds: None,
        }
    }
}

/// Find price/indicator divergences. Returns `(bearish, bullish)` lists
/// of `(price_idx, indicator_idx)` anchored at the second extremum.
///
/// Regular bearish: price higher high, indicator lower high.
/// Regular bullish: price lower low, indicator higher low.
/// Hidden variants swap the price-side inequality.
pub fn find_momentum_divergence(
    price: &[f64],
    indicator: &[f64],
    params: &DivergenceParams,
) -> (Vec<(usize, usize)>, Vec<(usize, usize)>) {
    let price_prom = params.prominence * finite_range(price);
    let ind_prom = params.prominence * finite_range(indicator);

    let price_peaks = find_peaks(price, params.distance_min, price_prom);
    let price_troughs = find_troughs(price, params.distance_min, price_prom);
    let ind_peaks = find_peaks(indicator, params.distance_min, ind_prom);
    let ind_troughs = find_troughs(indicator, params.distance_min, ind_prom);

    let near = |extrema: &[usize], anchor: usize| -> Option<usize> {
        extrema
            .iter()
            .copied()
            .find(|&i| i + params.distance_min >= anchor && i <= anchor + params.distance_min)
    };

    let mut bearish = Vec::new();
    for pair in price_peaks.windows(2) {
        let (p1, p2) = (pair[0], pair[1]);
        if p2 - p1 > params.distance_max {
            continue;
        }
        let price_matches = if params.hidden {
            price[p2] < price[p1]
        } else {
            price[p2] > price[p1]
        };
        if !price_matches {
            continue;
        }
        let (Some(i1), Some(i2)) = (near(&ind_peaks, p1), near(&ind_peaks, p2)) else {
            continue;
        };
        let ind_matches = if params.hidden {
            indicator[i2] > indicator[i1]
        } else {
            indicator[i2] < indicator[i1]
        };
        if !ind_matches {
            continue;
        }
        // RSI divergences only count from overbought territory.
        if let Some((ub, _)) = params.rsi_bounds {
            if indicator[i1] <= ub {
                continue;
            }
        }
        bearish.push((p2, i2));
    }

    let mut bullish = Vec::new();
    for pair in price_troughs.windows(2) {
        let (t1, t2) = (pair[0], pair[1]);
        if t2 - t1 > params.distance_max {
            continue;
        }
        let price_matches = if params.hidden {
            price[t2] > price[t1]
        } else {
            price[t2] < price[t1]
        };
        if !price_matches {
            continue;
        }
        let (Some(i1), Some(i2)) = (near(&ind_troughs, t1), near(&ind_troughs, t2)) else {
            continue;
        };
        let ind_matches = if params.hidden {
            indicator[i2] < indicator[i1]
        } else {
            indicator[i2] > indicator[i1]
        };
        if !ind_matches {
            continue;
        }
        if let Some((_, lb)) = params.rsi_bounds {
            if indicator[i1] >= lb {
                continue;
            }
        }
        bullish.push((t2, i2));
    }

    (bearish, bullish)
}

/// −1 at each bearish divergence, +1 at each bullish one, filled.
pub fn divergence_signals(
    len: usize,
    bearish: &[(usize, usize)],
    bullish: &[(usize, usize)],
) -> SignalSeries {
    let mut signal = SignalSeries::empty(len);
    for &(price_idx, _) in bearish {
        signal.set(price_idx, -1.0);
    }
    for &(price_idx, _) in bullish {
        signal.set(price_idx, 1.0);
    }
    signal.fill_default()
}

/// Double tops and bottoms in an oscillating series (MACD histogram or
/// the band-relative position). A top pairs two positive peaks with the
/// first higher and a valley strictly below the second peak between
/// them; bottoms mirror. Returns `(tops, bottoms)` as
/// `(first_idx, second_idx)`.
pub fn find_double_patterns(
    hist: &[f64],
    distance_min: usize,
    distance_max: usize,
    prominence: f64,
) -> (Vec<(usize, usize)>, Vec<(usize, usize)>) {
    let prom = prominence * finite_range(hist);

    let pos_peaks: Vec<usize> = find_peaks(hist, distance_min, prom)
        .into_iter()
        .filter(|&i| hist[i] > 0.0)
        .collect();
    let neg_troughs: Vec<usize> = find_troughs(hist, distance_min, prom)
        .into_iter()
        .filter(|&i| hist[i] < 0.0)
        .collect();

    let mut tops = Vec::new();
    for (i, &p1) in pos_peaks.iter().enumerate() {
        for &p2 in &pos_peaks[i + 1..] {
            if p2 - p1 > distance_max {
                break;
            }
            if hist[p1] > hist[p2] {
                let valley = hist[p1..p2].iter().copied().fold(f64::MAX, f64::min);
                if valley < hist[p2] {
                    tops.push((p1, p2));
                    break;
                }
            }
        }
    }

    let mut bottoms = Vec::new();
    for (i, &t1) in neg_troughs.iter().enumerate() {
        for &t2 in &neg_troughs[i + 1..] {
            if t2 - t1 > distance_max {
                break;
            }
            if hist[t1] < hist[t2] {
                let peak = hist[t1..t2].iter().copied().fold(f64::MIN, f64::max);
                if peak > hist[t2] {
                    bottoms.push((t1, t2));
                    break;
                }
            }
        }
    }

    (tops, bottoms)
}

/// −1 at the second peak of each double top, +1 at the second trough of
/// each double bottom, filled.
pub fn double_pattern_signals(
    len: usize,
    tops: &[(usize, usize)],
    bottoms: &[(usize, usize)],
) -> SignalSeries {
    let mut signal = SignalSeries::empty(len);
    for &(_, second) in tops {
        signal.set(second, -1.0);
    }
    for &(_, second) in bottoms {
        signal.set(second, 1.0);
    }
    signal.fill_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Series with a hill at `center` of the given height on a flat base.
    fn hill(base: &mut [f64], center: usize, half_width: usize, height: f64) {
        for offset in 0..=half_width {
            let scale = 1.0 - offset as f64 / (half_width as f64 + 1.0);
            if center >= offset {
                base[center - offset] += height * scale;
            }
            if center + offset < base.len() {
                base[center + offset] += height * scale;
            }
        }
    }

    #[test]
    fn regular_bearish_divergence_detected() {
        // Price: higher high. Indicator: lower high, same locations.
        let mut price = vec![0.0; 60];
        hill(&mut price, 15, 5, 10.0);
        hill(&mut price, 35, 5, 12.0);
        let mut ind = vec![0.0; 60];
        hill(&mut ind, 15, 5, 10.0);
        hill(&mut ind, 35, 5, 7.0);

        let (bearish, bullish) =
            find_momentum_divergence(&price, &ind, &DivergenceParams::default());
        assert_eq!(bullish.len(), 0);
        assert_eq!(bearish.len(), 1);
        assert_eq!(bearish[0].0, 35);
    }

    #[test]
    fn hidden_divergence_swaps_price_inequality() {
        // Price: lower high. Indicator: higher high.
        let mut price = vec![0.0; 60];
        hill(&mut price, 15, 5, 12.0);
        hill(&mut price, 35, 5, 9.0);
        let mut ind = vec![0.0; 60];
        hill(&mut ind, 15, 5, 6.0);
        hill(&mut ind, 35, 5, 9.0);

        let params = DivergenceParams {
            hidden: true,
            ..DivergenceParams::default()
        };
        let (bearish, _) = find_momentum_divergence(&price, &ind, &params);
        assert_eq!(bearish.len(), 1);
    }

    #[test]
    fn rsi_bound_gates_divergence() {
        let mut price = vec![0.0; 60];
        hill(&mut price, 15, 5, 10.0);
        hill(&mut price, 35, 5, 12.0);
        // Indicator peaks in the 50s: below the 70 overbought gate.
        let mut ind = vec![50.0; 60];
        hill(&mut ind, 15, 5, 8.0);
        hill(&mut ind, 35, 5, 5.0);

        let params = DivergenceParams {
            rsi_bounds: Some((70.0, 30.0)),
            ..DivergenceParams::default()
        };
        let (bearish, _) = find_momentum_divergence(&price, &ind, &params);
        assert!(bearish.is_empty());
    }

    #[test]
    fn exactly_one_double_top() {
        // Two positive peaks, first higher, valley below the second.
        let mut hist = vec![0.1; 40];
        hill(&mut hist, 10, 3, 5.0);
        hill(&mut hist, 25, 3, 3.0);

        let (tops, bottoms) = find_double_patterns(&hist, 7, 25, 0.05);
        assert_eq!(bottoms.len(), 0);
        assert_eq!(tops.len(), 1);
        assert_eq!(tops[0], (10, 25));

        let signal = double_pattern_signals(hist.len(), &tops, &bottoms);
        assert_eq!(signal.values()[25], -1.0);
        // Long until the confirmation bar, short afterwards.
        assert_eq!(signal.values()[24], 1.0);
        assert_eq!(signal.values()[39], -1.0);
    }

    #[test]
    fn double_top_needs_first_peak_higher() {
        let mut hist = vec![0.1; 40];
        hill(&mut hist, 10, 3, 3.0);
        hill(&mut hist, 25, 3, 5.0); // ascending peaks: not a double top
        let (tops, _) = find_double_patterns(&hist, 7, 25, 0.05);
        assert!(tops.is_empty());
    }

    #[test]
    fn double_bottom_mirrors() {
        let mut hist = vec![-0.1; 40];
        hill(&mut hist, 10, 3, -5.0);
        hill(&mut hist, 25, 3, -3.0);
        let (tops, bottoms) = find_double_patterns(&hist, 7, 25, 0.05);
        assert!(tops.is_empty());
        assert_eq!(bottoms, vec![(10, 25)]);
    }
}
