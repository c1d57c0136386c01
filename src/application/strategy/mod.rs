pub mod backtest;
pub mod bollinger;
pub mod combined;
pub mod ma_crossover;
pub mod macd;
pub mod rsi;

pub use backtest::{backtest_signal, BacktestResult};
pub use bollinger::{BollingerParams, BollingerSignalKind, BollingerStrategy};
pub use combined::CombinedStrategy;
pub use ma_crossover::{MaCrossoverStrategy, MaParamType, MaParams};
pub use macd::{MacdParams, MacdSignalKind, MacdStrategy};
pub use rsi::{RsiParams, RsiSignalKind, RsiStrategy};

use crate::application::signals::SignalSeries;
use crate::domain::asset::{Asset, Timeframe};
use chrono::{DateTime, NaiveDate, Utc};

/// What a plotting layer renders for a strategy window: closes, the
/// strategy's indicator columns and the position signal, all on one
/// index. Numeric results never travel inside this type.
#[derive(Debug, Clone)]
pub struct PlotFrame {
    pub index: Vec<DateTime<Utc>>,
    pub close: Vec<f64>,
    pub indicators: Vec<(String, Vec<f64>)>,
    pub signal: Vec<f64>,
}

/// Assemble a [`PlotFrame`] from full-length columns and a date window.
fn plot_frame(
    asset: &Asset,
    timeframe: Timeframe,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    indicators: Vec<(String, &[f64])>,
    signal: &SignalSeries,
) -> PlotFrame {
    let frame = asset.frame(timeframe);
    let (lo, hi) = frame.range_indices(start, end);
    PlotFrame {
        index: frame.timestamps()[lo..hi].to_vec(),
        close: frame.closes()[lo..hi].to_vec(),
        indicators: indicators
            .into_iter()
            .map(|(name, col)| (name, col[lo..hi].to_vec()))
            .collect(),
        signal: signal.values()[lo..hi].to_vec(),
    }
}

/// A parameterized indicator strategy over one asset.
///
/// Implementations keep indicator columns and a filled ±1 signal for
/// both the daily and five-minute frames, recomputed whenever the
/// parameters change.
pub trait Strategy {
    fn name(&self) -> &'static str;

    fn asset(&self) -> &Asset;

    /// The filled signal aligned to the frame of `timeframe`.
    fn signal(&self, timeframe: Timeframe) -> &SignalSeries;

    /// Rebuild indicators and signals on both frames.
    fn recompute(&mut self);

    /// The indicator columns to hand to a plotting layer, with their
    /// display names.
    fn indicator_columns(&self, timeframe: Timeframe) -> Vec<(String, &[f64])>;

    /// The chart data for the given window.
    fn plot(
        &self,
        timeframe: Timeframe,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> PlotFrame {
        plot_frame(
            self.asset(),
            timeframe,
            start,
            end,
            self.indicator_columns(timeframe),
            self.signal(timeframe),
        )
    }

    /// Simulate $1 of equity following the signal over the window and
    /// compare against buy-and-hold.
    fn backtest(
        &self,
        timeframe: Timeframe,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> BacktestResult {
        backtest_signal(self.asset().frame(timeframe), self.signal(timeframe), start, end)
    }
}
