use crate::application::analytics::{ewm_alpha, ewm_mean_std, rolling_mean};
use crate::application::signals::{self, SignalSeries};
use crate::application::strategy::{backtest::BacktestResult, Strategy};
use crate::domain::asset::{Asset, Timeframe};
use crate::domain::errors::EngineError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaParamType {
    Window,
    Alpha,
    Halflife,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaParams {
    pub short: f64,
    pub long: f64,
    pub param_type: MaParamType,
    pub ewm: bool,
}

impl Default for MaParams {
    fn default() -> Self {
        Self {
            short: 50.0,
            long: 200.0,
            param_type: MaParamType::Window,
            ewm: false,
        }
    }
}

impl MaParams {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.short <= 0.0 || self.long <= 0.0 {
            return Err(EngineError::InvalidParameters(
                "moving-average spans must be positive".to_string(),
            ));
        }
        match self.param_type {
            // A faster average means a shorter window but a *larger* alpha.
            MaParamType::Alpha => {
                if self.short > 1.0 || self.long > 1.0 {
                    return Err(EngineError::InvalidParameters(
                        "alpha must lie in (0, 1]".to_string(),
                    ));
                }
                if self.short <= self.long {
                    return Err(EngineError::InvalidParameters(
                        "short alpha must exceed long alpha".to_string(),
                    ));
                }
            }
            MaParamType::Window | MaParamType::Halflife => {
                if self.short >= self.long {
                    return Err(EngineError::InvalidParameters(
                        "short span must be below long span".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Classic fast/slow moving-average crossover: long while the short
/// average sits above the long one.
#[derive(Debug, Clone)]
pub struct MaCrossoverStrategy {
    asset: Asset,
    params: MaParams,
    daily_short: Vec<f64>,
    daily_long: Vec<f64>,
    five_short: Vec<f64>,
    five_long: Vec<f64>,
    daily_signal: SignalSeries,
    five_signal: SignalSeries,
}

impl MaCrossoverStrategy {
    pub fn new(asset: Asset) -> Self {
        let mut strategy = Self {
            asset,
            params: MaParams::default(),
            daily_short: Vec::new(),
            daily_long: Vec::new(),
            five_short: Vec::new(),
            five_long: Vec::new(),
            daily_signal: SignalSeries::empty(0),
            five_signal: SignalSeries::empty(0),
        };
        strategy.recompute();
        strategy
    }

    pub fn params(&self) -> MaParams {
        self.params
    }

    pub fn change_params(&mut self, params: MaParams) -> Result<(), EngineError> {
        params.validate()?;
        self.params = params;
        self.recompute();
        Ok(())
    }

    /// The short and long average columns for the given frame.
    pub fn averages(&self, timeframe: Timeframe) -> (&[f64], &[f64]) {
        match timeframe {
            Timeframe::Daily => (&self.daily_short, &self.daily_long),
            Timeframe::FiveMinute => (&self.five_short, &self.five_long),
        }
    }

    fn average(&self, closes: &[f64], span: f64) -> Vec<f64> {
        match self.params.param_type {
            MaParamType::Window if !self.params.ewm => rolling_mean(closes, span as usize),
            MaParamType::Window => {
                let alpha = ewm_alpha(None, None, span as usize);
                ewm_mean_std(closes, alpha).0
            }
            MaParamType::Alpha => ewm_mean_std(closes, span).0,
            MaParamType::Halflife => {
                let alpha = ewm_alpha(None, Some(span), 0);
                ewm_mean_std(closes, alpha).0
            }
        }
    }

    fn compute_frame(&self, timeframe: Timeframe) -> (Vec<f64>, Vec<f64>, SignalSeries) {
        let closes = self.asset.frame(timeframe).closes();
        let short = self.average(&closes, self.params.short);
        let long = self.average(&closes, self.params.long);
        let signal = signals::ma_crossover(&short, &long);
        (short, long, signal)
    }

    /// Grid search over span pairs of the current parameter type,
    /// maximizing strategy return. Restores the original parameters.
    pub fn optimize(
        &mut self,
        timeframe: Timeframe,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<(MaParams, BacktestResult), EngineError> {
        let candidates: Vec<(f64, f64)> = match self.params.param_type {
            MaParamType::Window => {
                let shorts = [5.0, 10.0, 20.0, 30.0, 50.0];
                let longs = [20.0, 50.0, 100.0, 150.0, 200.0, 250.0];
                shorts
                    .iter()
                    .flat_map(|s| longs.iter().map(move |l| (*s, *l)))
                    .filter(|(s, l)| s < l)
                    .collect()
            }
            MaParamType::Alpha => {
                let shorts = [0.3, 0.4, 0.5];
                let longs = [0.05, 0.1, 0.2];
                shorts
                    .iter()
                    .flat_map(|s| longs.iter().map(move |l| (*s, *l)))
                    .collect()
            }
            MaParamType::Halflife => {
                let shorts = [2.0, 5.0, 10.0];
                let longs = [20.0, 50.0, 100.0];
                shorts
                    .iter()
                    .flat_map(|s| longs.iter().map(move |l| (*s, *l)))
                    .collect()
            }
        };

        let original = self.params;
        let mut best: Option<(MaParams, BacktestResult)> = None;
        for (short, long) in candidates {
            let candidate = MaParams {
                short,
                long,
                ..original
            };
            if candidate.validate().is_err() {
                continue;
            }
            self.params = candidate;
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

impl Strategy for MaCrossoverStrategy {
    fn name(&self) -> &'static str {
        "MA_Crossover"
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
        let (short, long) = self.averages(timeframe);
        vec![
            (format!("MA {}", self.params.short), short),
            (format!("MA {}", self.params.long), long),
        ]
    }

    fn recompute(&mut self) {
        let (short, long, signal) = self.compute_frame(Timeframe::Daily);
        self.daily_short = short;
        self.daily_long = long;
        self.daily_signal = signal;

        let (short, long, signal) = self.compute_frame(Timeframe::FiveMinute);
        self.five_short = short;
        self.five_long = long;
        self.five_signal = signal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::asset::testing::daily_asset;
    use crate::domain::asset::AssetKind;

    fn trending_asset() -> Asset {
        // 150 bars up, 150 bars down.
        let mut closes: Vec<f64> = (0..150).map(|i| 100.0 + i as f64).collect();
        closes.extend((0..150).map(|i| 250.0 - i as f64));
        daily_asset(
            "TEST",
            AssetKind::Equity,
            NaiveDate::from_ymd_opt(2022, 1, 3).unwrap(),
            &closes,
        )
    }

    #[test]
    fn crossover_goes_long_in_uptrend_short_in_downtrend() {
        let mut strategy = MaCrossoverStrategy::new(trending_asset());
        strategy
            .change_params(MaParams {
                short: 5.0,
                long: 20.0,
                ..MaParams::default()
            })
            .unwrap();

        let signal = strategy.signal(Timeframe::Daily);
        assert_eq!(signal.len(), 300);
        // Deep in the uptrend the fast average leads.
        assert_eq!(signal.values()[100], 1.0);
        // Deep in the downtrend it trails.
        assert_eq!(signal.values()[280], -1.0);
    }

    #[test]
    fn invalid_spans_are_rejected_without_recompute() {
        let mut strategy = MaCrossoverStrategy::new(trending_asset());
        let before = strategy.params();
        let err = strategy.change_params(MaParams {
            short: 200.0,
            long: 50.0,
            ..MaParams::default()
        });
        assert!(matches!(err, Err(EngineError::InvalidParameters(_))));
        assert_eq!(strategy.params(), before);
    }

    #[test]
    fn alpha_params_invert_the_ordering_rule() {
        assert!(MaParams {
            short: 0.5,
            long: 0.1,
            param_type: MaParamType::Alpha,
            ewm: true,
        }
        .validate()
        .is_ok());
        assert!(MaParams {
            short: 0.1,
            long: 0.5,
            param_type: MaParamType::Alpha,
            ewm: true,
        }
        .validate()
        .is_err());
    }

    #[test]
    fn optimize_restores_original_params() {
        let mut strategy = MaCrossoverStrategy::new(trending_asset());
        let original = strategy.params();
        let (best, result) = strategy.optimize(Timeframe::Daily, None, None).unwrap();

        assert_eq!(strategy.params(), original);
        assert!(best.short < best.long);
        assert!(result.strategy_return.is_finite());
    }
}
