use crate::application::signals::divergence::{
    divergence_signals, find_momentum_divergence, DivergenceParams,
};
use crate::application::signals::SignalSeries;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RsiExit {
    /// Signal when RSI crosses back through a bound.
    Reentry,
    /// Signal for as long as RSI sits beyond a bound.
    Exit,
}

/// RSI overbought/oversold signals.
///
/// Reentry mode shorts when RSI crosses down through `ub` and goes long
/// when it crosses up through `lb`. Exit mode holds −1 while RSI > ub
/// and +1 while RSI < lb. With `m_rev_bound`, a short flips long from
/// the bar RSI first touches the bound until the next short entry.
pub fn rsi_crossover(
    rsi: &[f64],
    ub: f64,
    lb: f64,
    exit: RsiExit,
    m_rev_bound: Option<f64>,
) -> SignalSeries {
    let n = rsi.len();
    let mut raw = vec![f64::NAN; n];
    let mut short_entries = vec![false; n];

    for i in 0..n {
        let prev = if i > 0 { rsi[i - 1] } else { f64::NAN };
        match exit {
            RsiExit::Reentry => {
                if prev > ub && rsi[i] < ub {
                    raw[i] = -1.0;
                } else if prev < lb && rsi[i] > lb {
                    raw[i] = 1.0;
                }
                short_entries[i] = prev > ub && rsi[i] < ub;
            }
            RsiExit::Exit => {
                if rsi[i] > ub {
                    raw[i] = -1.0;
                } else if rsi[i] < lb {
                    raw[i] = 1.0;
                }
                short_entries[i] = prev <= ub && rsi[i] > ub;
            }
        }
    }

    let filled = SignalSeries::new(raw).fill_default();
    let Some(bound) = m_rev_bound else {
        return filled;
    };

    // Mean reversion: within each short-entry group, once RSI dips to
    // the bound while short, stay long for the rest of the group.
    let mut out = filled.values().to_vec();
    let mut triggered = false;
    for i in 0..n {
        if short_entries[i] {
            triggered = false;
        }
        if rsi[i] <= bound && out[i] == -1.0 {
            triggered = true;
        }
        if triggered {
            out[i] = 1.0;
        }
    }
    SignalSeries::new(out)
}

/// Divergence between price and RSI, gated to overbought/oversold
/// territory.
pub fn rsi_divergence(
    rsi: &[f64],
    price: &[f64],
    hidden: bool,
    ub: f64,
    lb: f64,
) -> SignalSeries {
    let params = DivergenceParams {
        hidden,
        rsi_bounds: Some((ub, lb)),
        ..DivergenceParams::default()
    };
    let (bearish, bullish) = find_momentum_divergence(price, rsi, &params);
    divergence_signals(price.len(), &bearish, &bullish)
}
