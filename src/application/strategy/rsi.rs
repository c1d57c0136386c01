use crate::application::signals::rsi::{rsi_crossover, rsi_divergence, RsiExit};
use crate::application::signals::{self, CombineMethod, SignalSeries};
use crate::application::strategy::{backtest::BacktestResult, Strategy};
use crate::domain::asset::{Asset, Timeframe};
use crate::domain::errors::EngineError;
use chrono::NaiveDate;
use itertools::iproduct;
use serde::{Deserialize, Serialize};
use ta::indicators::RelativeStrengthIndex;
use ta::Next;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RsiSignalKind {
    Crossover,
    Divergence,
    HiddenDivergence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsiParams {
    pub window: usize,
    pub ub: f64,
    pub lb: f64,
    pub exit: RsiExit,
    pub m_rev: bool,
    pub m_rev_bound: f64,
    pub signal_types: Vec<RsiSignalKind>,
    pub method: CombineMethod,
    pub weights: Option<Vec<f64>>,
    pub vote_threshold: f64,
}

impl Default for RsiParams {
    fn default() -> Self {
        Self {
            window: 14,
            ub: 70.0,
            lb: 30.0,
            exit: RsiExit::Reentry,
            m_rev: false,
            m_rev_bound: 50.0,
            signal_types: vec![RsiSignalKind::Crossover],
            method: CombineMethod::Weighted,
            weights: None,
            vote_threshold: 0.0,
        }
    }
}

impl RsiParams {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.window < 2 {
            return Err(EngineError::InvalidParameters(
                "RSI window must be at least 2".to_string(),
            ));
        }
        if self.ub <= self.lb {
            return Err(EngineError::InvalidParameters(
                "RSI upper bound must exceed lower bound".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.ub) || !(0.0..=100.0).contains(&self.lb) {
            return Err(EngineError::InvalidParameters(
                "RSI bounds must lie in [0, 100]".to_string(),
            ));
        }
        if self.signal_types.is_empty() {
            return Err(EngineError::InvalidParameters(
                "at least one RSI signal type is required".to_string(),
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

/// RSI strategy: overbought/oversold crossovers with optional mean
/// reversion, plus regular and hidden divergence, combined by vote.
#[derive(Debug, Clone)]
pub struct RsiStrategy {
    asset: Asset,
    params: RsiParams,
    daily_rsi: Vec<f64>,
    five_rsi: Vec<f64>,
    daily_signal: SignalSeries,
    five_signal: SignalSeries,
}

impl RsiStrategy {
    pub fn new(asset: Asset) -> Self {
        let mut strategy = Self {
            asset,
            params: RsiParams::default(),
            daily_rsi: Vec::new(),
            five_rsi: Vec::new(),
            daily_signal: SignalSeries::empty(0),
            five_signal: SignalSeries::empty(0),
        };
        strategy.recompute();
        strategy
    }

    pub fn params(&self) -> &RsiParams {
        &self.params
    }

    pub fn change_params(&mut self, params: RsiParams) -> Result<(), EngineError> {
        params.validate()?;
        self.params = params;
        self.recompute();
        Ok(())
    }

    pub fn rsi(&self, timeframe: Timeframe) -> &[f64] {
        match timeframe {
            Timeframe::Daily => &self.daily_rsi,
            Timeframe::FiveMinute => &self.five_rsi,
        }
    }

    fn compute_rsi(&self, closes: &[f64]) -> Vec<f64> {
        let mut indicator = RelativeStrengthIndex::new(self.params.window)
            .expect("window validated to be >= 2");
        closes.iter().map(|c| indicator.next(*c)).collect()
    }

    fn compute_signal(&self, rsi: &[f64], closes: &[f64]) -> SignalSeries {
        let p = &self.params;
        let mut parts = Vec::with_capacity(p.signal_types.len());
        for kind in &p.signal_types {
            let series = match kind {
                RsiSignalKind::Crossover => rsi_crossover(
                    rsi,
                    p.ub,
                    p.lb,
                    p.exit,
                    p.m_rev.then_some(p.m_rev_bound),
                ),
                RsiSignalKind::Divergence => rsi_divergence(rsi, closes, false, p.ub, p.lb),
                RsiSignalKind::HiddenDivergence => rsi_divergence(rsi, closes, true, p.ub, p.lb),
            };
            parts.push(series);
        }
        signals::combine(&parts, p.method, p.vote_threshold, p.weights.as_deref())
    }

    /// Grid search over window and bound combinations.
    pub fn optimize(
        &mut self,
        timeframe: Timeframe,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<(RsiParams, BacktestResult), EngineError> {
        let windows = [7usize, 14, 21, 28];
        let ubs = [65.0, 70.0, 75.0, 80.0];
        let lbs = [20.0, 25.0, 30.0, 35.0];

        let original = self.params.clone();
        let mut best: Option<(RsiParams, BacktestResult)> = None;
        for (&window, &ub, &lb) in iproduct!(&windows, &ubs, &lbs) {
            let candidate = RsiParams {
                window,
                ub,
                lb,
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

impl Strategy for RsiStrategy {
    fn name(&self) -> &'static str {
        "RSI"
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
        vec![(format!("RSI {}", self.params.window), self.rsi(timeframe))]
    }

    fn recompute(&mut self) {
        let closes = self.asset.daily.closes();
        self.daily_rsi = self.compute_rsi(&closes);
        self.daily_signal = self.compute_signal(&self.daily_rsi, &closes);

        let closes = self.asset.five_minute().closes();
        self.five_rsi = self.compute_rsi(&closes);
        self.five_signal = self.compute_signal(&self.five_rsi, &closes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::asset::testing::daily_asset;
    use crate::domain::asset::AssetKind;

    /// Price rallies hard, then collapses, then rallies: drives RSI
    /// through both bounds.
    fn oscillating_asset() -> Asset {
        let mut closes = vec![100.0];
        for i in 0..30 {
            closes.push(closes[i] * 1.03);
        }
        for _ in 0..30 {
            closes.push(closes.last().unwrap() * 0.96);
        }
        for _ in 0..30 {
            closes.push(closes.last().unwrap() * 1.02);
        }
        daily_asset(
            "TEST",
            AssetKind::Equity,
            NaiveDate::from_ymd_opt(2022, 1, 3).unwrap(),
            &closes,
        )
    }

    #[test]
    fn signal_is_filled_and_aligned() {
        let strategy = RsiStrategy::new(oscillating_asset());
        let signal = strategy.signal(Timeframe::Daily);
        assert_eq!(signal.len(), strategy.asset().daily.len());
        assert!(signal.is_filled());
    }

    #[test]
    fn relentless_rally_turns_short_on_the_cross_down() {
        let strategy = RsiStrategy::new(oscillating_asset());
        let signal = strategy.signal(Timeframe::Daily);
        let rsi = strategy.rsi(Timeframe::Daily);

        // Find the first bar where RSI crosses back under 70.
        let cross = (1..rsi.len())
            .find(|&i| rsi[i - 1] > 70.0 && rsi[i] < 70.0)
            .expect("synthetic series must cross down");
        assert_eq!(signal.values()[cross], -1.0);
        // Before that, the default long holds.
        assert!(signal.values()[..cross].iter().all(|v| *v == 1.0));
    }

    #[test]
    fn bad_bounds_are_rejected() {
        let mut strategy = RsiStrategy::new(oscillating_asset());
        let err = strategy.change_params(RsiParams {
            ub: 30.0,
            lb: 70.0,
            ..RsiParams::default()
        });
        assert!(matches!(err, Err(EngineError::InvalidParameters(_))));
    }

    #[test]
    fn weights_must_match_signal_types() {
        let params = RsiParams {
            signal_types: vec![RsiSignalKind::Crossover, RsiSignalKind::Divergence],
            weights: Some(vec![1.0]),
            ..RsiParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn optimize_searches_and_restores() {
        let mut strategy = RsiStrategy::new(oscillating_asset());
        let original = strategy.params().clone();
        let (best, _) = strategy.optimize(Timeframe::Daily, None, None).unwrap();
        assert_eq!(strategy.params(), &original);
        assert!(best.ub > best.lb);
    }
}
