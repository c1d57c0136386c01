pub mod bollinger;
pub mod divergence;
pub mod macd;
pub mod peaks;
pub mod rsi;

use serde::{Deserialize, Serialize};

/// A ±1 trading-signal series aligned to a price series. Values are
/// −1, +1 or NaN (no opinion); `fill` turns it into a continuous
/// position series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSeries {
    values: Vec<f64>,
}

impl SignalSeries {
    pub fn new(values: Vec<f64>) -> Self {
        debug_assert!(
            values
                .iter()
                .all(|v| v.is_nan() || *v == 1.0 || *v == -1.0),
            "signal values must be -1, +1 or NaN"
        );
        Self { values }
    }

    pub fn empty(len: usize) -> Self {
        Self {
            values: vec![f64::NAN; len],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn set(&mut self, i: usize, value: f64) {
        debug_assert!(value == 1.0 || value == -1.0);
        self.values[i] = value;
    }

    /// Forward-fill NaNs, seeding the leading gap with `default`
    /// (+1, i.e. long until the first signal).
    pub fn fill(mut self, default: f64) -> Self {
        let mut last = default;
        for v in &mut self.values {
            if v.is_nan() {
                *v = last;
            } else {
                last = *v;
            }
        }
        debug_assert!(self.is_filled());
        self
    }

    pub fn fill_default(self) -> Self {
        self.fill(1.0)
    }

    pub fn is_filled(&self) -> bool {
        self.values.iter().all(|v| *v == 1.0 || *v == -1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMethod {
    Unanimous,
    Majority,
    Weighted,
}

/// Weighted vote across signal series: emit +1 above `threshold`,
/// −1 below `−threshold`, NaN in between, then forward-fill.
pub fn vote(signals: &[SignalSeries], weights: &[f64], threshold: f64) -> SignalSeries {
    debug_assert_eq!(signals.len(), weights.len());
    let Some(len) = signals.first().map(SignalSeries::len) else {
        return SignalSeries::empty(0);
    };

    let mut out = vec![f64::NAN; len];
    for (i, slot) in out.iter_mut().enumerate() {
        let mut combined = 0.0;
        for (signal, w) in signals.iter().zip(weights) {
            combined += w * signal.values()[i];
        }
        if combined > threshold {
            *slot = 1.0;
        } else if combined < -threshold {
            *slot = -1.0;
        }
    }
    SignalSeries::new(out).fill_default()
}

/// Resolve the vote inputs for a combine method: unanimous pins the
/// threshold to 1 with equal weights, majority keeps the caller's
/// threshold with equal weights, weighted uses both as supplied.
pub fn combine(
    signals: &[SignalSeries],
    method: CombineMethod,
    threshold: f64,
    weights: Option<&[f64]>,
) -> SignalSeries {
    let n = signals.len().max(1);
    let equal = vec![1.0 / n as f64; n];
    match method {
        CombineMethod::Unanimous => vote(signals, &equal, 1.0),
        CombineMethod::Majority => vote(signals, &equal, threshold),
        CombineMethod::Weighted => {
            let weights = weights.unwrap_or(&equal);
            vote(signals, weights, threshold)
        }
    }
}

/// +1 where the short average sits above the long one, else −1.
pub fn ma_crossover(short: &[f64], long: &[f64]) -> SignalSeries {
    debug_assert_eq!(short.len(), long.len());
    let values = short
        .iter()
        .zip(long)
        .map(|(s, l)| if s > l { 1.0 } else { -1.0 })
        .collect();
    SignalSeries::new(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_seeds_leading_nan_and_carries_forward() {
        let raw = SignalSeries::new(vec![f64::NAN, f64::NAN, -1.0, f64::NAN, 1.0, f64::NAN]);
        let filled = raw.fill_default();
        assert_eq!(filled.values(), &[1.0, 1.0, -1.0, -1.0, 1.0, 1.0]);
        assert!(filled.is_filled());
    }

    #[test]
    fn filled_series_matches_input_length() {
        let filled = SignalSeries::empty(17).fill_default();
        assert_eq!(filled.len(), 17);
        assert!(filled.values().iter().all(|v| *v == 1.0));
    }

    #[test]
    fn weighted_vote_applies_threshold() {
        let a = SignalSeries::new(vec![1.0, 1.0, -1.0]);
        let b = SignalSeries::new(vec![1.0, -1.0, -1.0]);
        let combined = vote(&[a, b], &[0.5, 0.5], 0.4);
        // Agreement clears the threshold; a split vote forward-fills.
        assert_eq!(combined.values(), &[1.0, 1.0, -1.0]);
    }

    #[test]
    fn vote_monotone_in_agreeing_weight() {
        let a = SignalSeries::new(vec![1.0, 1.0]);
        let b = SignalSeries::new(vec![-1.0, 1.0]);
        let low = vote(&[a.clone(), b.clone()], &[0.6, 0.4], 0.1);
        let high = vote(&[a, b], &[0.8, 0.2], 0.1);
        // Raising the weight of the +1 signal can only keep or raise
        // the combined outcome.
        for (l, h) in low.values().iter().zip(high.values()) {
            assert!(h >= l);
        }
    }

    #[test]
    fn ma_crossover_tracks_relative_position() {
        let short = [1.0, 3.0, 2.0];
        let long = [2.0, 2.0, 2.5];
        let signal = ma_crossover(&short, &long);
        assert_eq!(signal.values(), &[-1.0, 1.0, -1.0]);
    }

    #[test]
    fn majority_uses_equal_weights() {
        let a = SignalSeries::new(vec![1.0, -1.0]);
        let b = SignalSeries::new(vec![1.0, -1.0]);
        let c = SignalSeries::new(vec![-1.0, -1.0]);
        let combined = combine(&[a, b, c], CombineMethod::Majority, 0.2, None);
        assert_eq!(combined.values(), &[1.0, -1.0]);
    }
}
