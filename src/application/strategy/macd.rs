use crate::application::signals::macd::{macd_crossover, macd_divergence, macd_double, macd_momentum};
use crate::application::signals::{self, CombineMethod, SignalSeries};
use crate::application::strategy::{backtest::BacktestResult, Strategy};
use crate::domain::asset::{Asset, Timeframe};
use crate::domain::errors::EngineError;
use chrono::NaiveDate;
use itertools::iproduct;
use serde::{Deserialize, Serialize};
use ta::indicators::MovingAverageConvergenceDivergence;
use ta::Next;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacdSignalKind {
    Crossover,
    Divergence,
    HiddenDivergence,
    Momentum,
    DoublePattern,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdParams {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
    pub signal_types: Vec<MacdSignalKind>,
    pub method: CombineMethod,
    pub weights: Option<Vec<f64>>,
    pub vote_threshold: f64,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            fast: 12,
            slow: 26,
            signal: 9,
            signal_types: vec![MacdSignalKind::Crossover],
            method: CombineMethod::Weighted,
            weights: None,
            vote_threshold: 0.0,
        }
    }
}

impl MacdParams {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.fast == 0 || self.slow == 0 || self.signal == 0 {
            return Err(EngineError::InvalidParameters(
                "MACD periods must be positive".to_string(),
            ));
        }
        if self.fast >= self.slow {
            return Err(EngineError::InvalidParameters(
                "MACD fast period must be below the slow period".to_string(),
            ));
        }
        if self.signal_types.is_empty() {
            return Err(EngineError::InvalidParameters(
                "at least one MACD signal type is required".to_string(),
            ));
        }
        if let Some(weights) = &self.weights {
            if weights.len() != self.signal_types.len() {
                return Err(EngineError::InvalidParameters(
                    "one weight per signal type is required".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// The three MACD columns for one frame.
#[derive(Debug, Clone, Default)]
pub struct MacdColumns {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// MACD strategy: histogram crossovers, divergence, momentum shifts and
/// double peaks/troughs, combined by vote.
#[derive(Debug, Clone)]
pub struct MacdStrategy {
    asset: Asset,
    params: MacdParams,
    daily: MacdColumns,
    five_minute: MacdColumns,
    daily_signal: SignalSeries,
    five_signal: SignalSeries,
}

impl MacdStrategy {
    pub fn new(asset: Asset) -> Self {
        let mut strategy = Self {
            asset,
            params: MacdParams::default(),
            daily: MacdColumns::default(),
            five_minute: MacdColumns::default(),
            daily_signal: SignalSeries::empty(0),
            five_signal: SignalSeries::empty(0),
        };
        strategy.recompute();
        strategy
    }

    pub fn params(&self) -> &MacdParams {
        &self.params
    }

    pub fn change_params(&mut self, params: MacdParams) -> Result<(), EngineError> {
        params.validate()?;
        self.params = params;
        self.recompute();
        Ok(())
    }

    pub fn columns(&self, timeframe: Timeframe) -> &MacdColumns {
        match timeframe {
            Timeframe::Daily => &self.daily,
            Timeframe::FiveMinute => &self.five_minute,
        }
    }

    fn compute_columns(&self, closes: &[f64]) -> MacdColumns {
        let mut indicator = MovingAverageConvergenceDivergence::new(
            self.params.fast,
            self.params.slow,
            self.params.signal,
        )
        .expect("periods validated to be positive and ordered");

        let mut columns = MacdColumns::default();
        for close in closes {
            let out = indicator.next(*close);
            columns.macd.push(out.macd);
            columns.signal.push(out.signal);
            columns.histogram.push(out.histogram);
        }
        columns
    }

    fn compute_signal(&self, columns: &MacdColumns, closes: &[f64]) -> SignalSeries {
        let p = &self.params;
        let mut parts = Vec::with_capacity(p.signal_types.len());
        for kind in &p.signal_types {
            let series = match kind {
                MacdSignalKind::Crossover => macd_crossover(&columns.histogram),
                MacdSignalKind::Divergence => macd_divergence(&columns.macd, closes, false),
                MacdSignalKind::HiddenDivergence => macd_divergence(&columns.macd, closes, true),
                MacdSignalKind::Momentum => macd_momentum(&columns.histogram),
                MacdSignalKind::DoublePattern => macd_double(&columns.histogram),
            };
            parts.push(series);
        }
        signals::combine(&parts, p.method, p.vote_threshold, p.weights.as_deref())
    }

    /// Grid search over the classic period triples.
    pub fn optimize(
        &mut self,
        timeframe: Timeframe,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<(MacdParams, BacktestResult), EngineError> {
        let fasts = [8usize, 12, 16];
        let slows = [21usize, 26, 31];
        let signal_periods = [7usize, 9, 11];

        let original = self.params.clone();
        let mut best: Option<(MacdParams, BacktestResult)> = None;
        for (&fast, &slow, &signal) in iproduct!(&fasts, &slows, &signal_periods) {
            let candidate = MacdParams {
                fast,
                slow,
                signal,
                ..original.clone()
            };
            if candidate.validate().is_err() {
                continue;
            }
            self.params = candidate.clone();
            self.recompute();
            let result = self.backtest(timeframe, start, end);
            if best
                .as_ref()
                .is_none_or(|(_, b)| result.strategy_return > b.strategy_return)
            {
                best = Some((candidate, result));
            }
        }

        self.params = original;
        self.recompute();
        best.ok_or_else(|| EngineError::InvalidParameters("empty parameter grid".to_string()))
    }
}

impl Strategy for MacdStrategy {
    fn name(&self) -> &'static str {
        "MACD"
    }

    fn asset(&self) -> &Asset {
        &self.asset
    }

    fn signal(&self, timeframe: Timeframe) -> &SignalSeries {
        match timeframe {
            Timeframe::Daily => &self.daily_signal,
            Timeframe::FiveMinute => &self.five_signal,
        }
    }

    fn indicator_columns(&self, timeframe: Timeframe) -> Vec<(String, &[f64])> {
        let columns = self.columns(timeframe);
        vec![
            ("MACD".to_string(), columns.macd.as_slice()),
            ("Signal".to_string(), columns.signal.as_slice()),
            ("Histogram".to_string(), columns.histogram.as_slice()),
        ]
    }

    fn recompute(&mut self) {
        let closes = self.asset.daily.closes();
        self.daily = self.compute_columns(&closes);
        self.daily_signal = self.compute_signal(&self.daily, &closes);

        let closes = self.asset.five_minute().closes();
        self.five_minute = self.compute_columns(&closes);
        self.five_signal = self.compute_signal(&self.five_minute, &closes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::asset::testing::daily_asset;
    use crate::domain::asset::AssetKind;

    fn wave_asset() -> Asset {
        let closes: Vec<f64> = (0..240)
            .map(|i| 100.0 + 15.0 * (i as f64 / 20.0).sin())
            .collect();
        daily_asset(
            "TEST",
            AssetKind::Equity,
            NaiveDate::from_ymd_opt(2022, 1, 3).unwrap(),
            &closes,
        )
    }

    #[test]
    fn histogram_sign_drives_the_crossover_signal() {
        let strategy = MacdStrategy::new(wave_asset());
        let columns = strategy.columns(Timeframe::Daily);
        let signal = strategy.signal(Timeframe::Daily);

        for i in 50..signal.len() {
            let expected = if columns.histogram[i] > 0.0 { 1.0 } else { -1.0 };
            assert_eq!(signal.values()[i], expected);
        }
    }

    #[test]
    fn fast_must_stay_below_slow() {
        let mut strategy = MacdStrategy::new(wave_asset());
        let err = strategy.change_params(MacdParams {
            fast: 26,
            slow: 12,
            ..MacdParams::default()
        });
        assert!(matches!(err, Err(EngineError::InvalidParameters(_))));
    }

    #[test]
    fn momentum_and_crossover_vote_together() {
        let mut strategy = MacdStrategy::new(wave_asset());
        strategy
            .change_params(MacdParams {
                signal_types: vec![MacdSignalKind::Crossover, MacdSignalKind::Momentum],
                method: CombineMethod::Majority,
                vote_threshold: 0.5,
                ..MacdParams::default()
            })
            .unwrap();
        let signal = strategy.signal(Timeframe::Daily);
        assert!(signal.is_filled());
        assert_eq!(signal.len(), 240);
    }

    #[test]
    fn optimize_restores_params() {
        let mut strategy = MacdStrategy::new(wave_asset());
        let original = strategy.params().clone();
        let (best, _) = strategy.optimize(Timeframe::Daily, None, None).unwrap();
        assert_eq!(strategy.params(), &original);
        assert!(best.fast < best.slow);
    }
}
