use crate::application::signals::bollinger::{
    bb_bounce, bb_breakout, bb_double, bb_pct_b, bb_squeeze, bb_walks,
};
use crate::application::signals::{self, CombineMethod, SignalSeries};
use crate::application::strategy::{backtest::BacktestResult, Strategy};
use crate::domain::asset::{Asset, Timeframe};
use crate::domain::errors::EngineError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ta::indicators::BollingerBands;
use ta::Next;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BollingerSignalKind {
    Bounce,
    Double,
    Walks,
    Squeeze,
    Breakout,
    PctB,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BollingerParams {
    pub window: usize,
    pub num_std: f64,
    pub signal_types: Vec<BollingerSignalKind>,
    pub method: CombineMethod,
    pub weights: Option<Vec<f64>>,
    pub vote_threshold: f64,
}

impl Default for BollingerParams {
    fn default() -> Self {
        Self {
            window: 20,
            num_std: 2.0,
            signal_types: vec![BollingerSignalKind::Bounce],
            method: CombineMethod::Weighted,
            weights: None,
            vote_threshold: 0.0,
        }
    }
}

impl BollingerParams {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.window < 2 {
            return Err(EngineError::InvalidParameters(
                "Bollinger window must be at least 2".to_string(),
            ));
        }
        if self.num_std <= 0.0 {
            return Err(EngineError::InvalidParameters(
                "Bollinger band width must be positive".to_string(),
            ));
        }
        if self.signal_types.is_empty() {
            return Err(EngineError::InvalidParameters(
                "at least one Bollinger signal type is required".to_string(),
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

/// Upper/middle/lower band columns for one frame.
#[derive(Debug, Clone, Default)]
pub struct BollingerColumns {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Bollinger Bands strategy: bounces, double touches, band walks,
/// squeezes, breakouts and %B, combined by vote.
#[derive(Debug, Clone)]
pub struct BollingerStrategy {
    asset: Asset,
    params: BollingerParams,
    daily: BollingerColumns,
    five_minute: BollingerColumns,
    daily_signal: SignalSeries,
    five_signal: SignalSeries,
}

impl BollingerStrategy {
    pub fn new(asset: Asset) -> Self {
        let mut strategy = Self {
            asset,
            params: BollingerParams::default(),
            daily: BollingerColumns::default(),
            five_minute: BollingerColumns::default(),
            daily_signal: SignalSeries::empty(0),
            five_signal: SignalSeries::empty(0),
        };
        strategy.recompute();
        strategy
    }

    pub fn params(&self) -> &BollingerParams {
        &self.params
    }

    pub fn change_params(&mut self, params: BollingerParams) -> Result<(), EngineError> {
        params.validate()?;
        self.params = params;
        self.recompute();
        Ok(())
    }

    pub fn columns(&self, timeframe: Timeframe) -> &BollingerColumns {
        match timeframe {
            Timeframe::Daily => &self.daily,
            Timeframe::FiveMinute => &self.five_minute,
        }
    }

    fn compute_columns(&self, closes: &[f64]) -> BollingerColumns {
        let mut indicator = BollingerBands::new(self.params.window, self.params.num_std)
            .expect("window validated to be >= 2");
        let mut columns = BollingerColumns::default();
        for close in closes {
            let out = indicator.next(*close);
            columns.upper.push(out.upper);
            columns.middle.push(out.average);
            columns.lower.push(out.lower);
        }
        columns
    }

    fn compute_signal(&self, columns: &BollingerColumns, closes: &[f64]) -> SignalSeries {
        let p = &self.params;
        let mut parts = Vec::with_capacity(p.signal_types.len());
        for kind in &p.signal_types {
            let series = match kind {
                BollingerSignalKind::Bounce => bb_bounce(closes, &columns.upper, &columns.lower),
                BollingerSignalKind::Double => bb_double(closes, &columns.upper, &columns.lower),
                BollingerSignalKind::Walks => {
                    bb_walks(closes, &columns.upper, &columns.lower, 0.2, 5)
                }
                BollingerSignalKind::Squeeze => {
                    bb_squeeze(closes, &columns.upper, &columns.lower, false)
                }
                BollingerSignalKind::Breakout => {
                    bb_breakout(closes, &columns.upper, &columns.lower, 0.3)
                }
                BollingerSignalKind::PctB => {
                    bb_pct_b(closes, &columns.upper, &columns.lower, 0.8, 0.2)
                }
            };
            parts.push(series);
        }
        signals::combine(&parts, p.method, p.vote_threshold, p.weights.as_deref())
    }

    /// Grid search over window and band width.
    pub fn optimize(
        &mut self,
        timeframe: Timeframe,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<(BollingerParams, BacktestResult), EngineError> {
        let windows = [10usize, 15, 20, 25, 30];
        let stds = [1.5, 2.0, 2.5, 3.0];

        let original = self.params.clone();
        let mut best: Option<(BollingerParams, BacktestResult)> = None;
        for &window in &windows {
            for &num_std in &stds {
                let candidate = BollingerParams {
                    window,
                    num_std,
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
        }

        self.params = original;
        self.recompute();
        best.ok_or_else(|| EngineError::InvalidParameters("empty parameter grid".to_string()))
    }
}

impl Strategy for BollingerStrategy {
    fn name(&self) -> &'static str {
        "BB"
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
            ("Upper Band".to_string(), columns.upper.as_slice()),
            ("Middle Band".to_string(), columns.middle.as_slice()),
            ("Lower Band".to_string(), columns.lower.as_slice()),
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
