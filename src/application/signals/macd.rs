use crate::application::signals::divergence::{
    divergence_signals, double_pattern_signals, find_double_patterns, find_momentum_divergence,
    DivergenceParams,
};
use crate::application::signals::SignalSeries;

/// +1 while the histogram is positive, −1 otherwise.
pub fn macd_crossover(hist: &[f64]) -> SignalSeries {
    let values = hist
        .iter()
        .map(|h| if *h > 0.0 { 1.0 } else { -1.0 })
        .collect();
    SignalSeries::new(values)
}

/// Histogram slope changes: +1 when a negative histogram starts rising,
/// −1 when a positive one starts falling.
pub fn macd_momentum(hist: &[f64]) -> SignalSeries {
    let n = hist.len();
    let mut raw = vec![f64::NAN; n];
    for i in 1..n {
        let prev = hist[i - 1];
        if prev < hist[i] && prev < 0.0 {
            raw[i] = 1.0;
        } else if prev > hist[i] && prev > 0.0 {
            raw[i] = -1.0;
        }
    }
    SignalSeries::new(raw).fill_default()
}

/// Double tops/bottoms in the histogram, signalled at the second point.
pub fn macd_double(hist: &[f64]) -> SignalSeries {
    let (tops, bottoms) = find_double_patterns(hist, 7, 25, 0.05);
    double_pattern_signals(hist.len(), &tops, &bottoms)
}

/// Divergence between price and the MACD line.
pub fn macd_divergence(macd: &[f64], price: &[f64], hidden: bool) -> SignalSeries {
    let params = DivergenceParams {
        hidden,
        ..DivergenceParams::default()
    };
    let (bearish, bullish) = find_momentum_divergence(price, macd, &params);
    divergence_signals(price.len(), &bearish, &bullish)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossover_follows_histogram_sign() {
        let hist = [-0.5, 0.2, 0.1, -0.3];
        let signal = macd_crossover(&hist);
        assert_eq!(signal.values(), &[-1.0, 1.0, 1.0, -1.0]);
    }

    #[test]
    fn momentum_buys_rising_negative_histogram() {
        let hist = [-1.0, -0.5, 0.5, 1.0, 0.8];
        let signal = macd_momentum(&hist);
        // Rising from negative: buy. Falling from positive: sell.
        assert_eq!(signal.values()[1], 1.0);
        assert_eq!(signal.values()[2], 1.0);
        assert_eq!(signal.values()[4], -1.0);
    }

    #[test]
    fn momentum_first_bar_defaults_long() {
        let hist = [0.5, 0.6];
        let signal = macd_momentum(&hist);
        assert_eq!(signal.values()[0], 1.0);
    }
}
