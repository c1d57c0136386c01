use crate::application::signals::SignalSeries;
use crate::domain::bars::BarSeries;
use chrono::NaiveDate;

/// Returns of a signal-following simulation vs buy-and-hold over the
/// same window, both as total fractional returns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BacktestResult {
    pub hold_return: f64,
    pub strategy_return: f64,
    pub net: f64,
}

/// Per-bar equity of $1 following `prior_signal · log_ret`.
///
/// The position for bar `i` is the signal of bar `i − 1`; the first bar
/// of the series contributes to neither leg, so a constant +1 signal
/// reproduces buy-and-hold exactly.
pub fn backtest_signal(
    frame: &BarSeries,
    signal: &SignalSeries,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> BacktestResult {
    debug_assert_eq!(frame.len(), signal.len());
    let (lo, hi) = frame.range_indices(start, end);
    let log_rets = frame.log_rets();
    let positions = signal.values();

    let mut hold = 0.0;
    let mut strategy = 0.0;
    for i in lo..hi {
        if i == 0 || !log_rets[i].is_finite() {
            continue;
        }
        hold += log_rets[i];
        strategy += log_rets[i] * positions[i - 1];
    }

    let hold_return = hold.exp() - 1.0;
    let strategy_return = strategy.exp() - 1.0;
    BacktestResult {
        hold_return,
        strategy_return,
        net: strategy_return - hold_return,
    }
}
