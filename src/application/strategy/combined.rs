use crate::application::signals::{vote, SignalSeries};
use crate::application::strategy::{backtest::BacktestResult, Strategy};
use crate::domain::asset::{Asset, Timeframe};
use crate::domain::errors::EngineError;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// The weights and threshold found by `optimize_weights`.
#[derive(Debug, Clone)]
pub struct WeightSearchOutcome {
    pub weights: Vec<f64>,
    pub vote_threshold: f64,
    pub results: BacktestResult,
}

/// An ordered set of strategies on the same asset whose signals are
/// combined by weighted vote.
pub struct CombinedStrategy {
    asset: Asset,
    children: Vec<Box<dyn Strategy>>,
    weights: Vec<f64>,
    vote_threshold: f64,
    daily_signal: SignalSeries,
    five_signal: SignalSeries,
}

impl CombinedStrategy {
    pub fn new(asset: Asset) -> Self {
        let daily_len = asset.daily.len();
        let five_len = asset.five_minute().len();
        Self {
            asset,
            children: Vec::new(),
            weights: Vec::new(),
            vote_threshold: 0.0,
            daily_signal: SignalSeries::empty(daily_len).fill_default(),
            five_signal: SignalSeries::empty(five_len).fill_default(),
        }
    }

    pub fn children(&self) -> &[Box<dyn Strategy>] {
        &self.children
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn vote_threshold(&self) -> f64 {
        self.vote_threshold
    }

    pub fn add_strategy(
        &mut self,
        strategy: Box<dyn Strategy>,
        weight: f64,
    ) -> Result<(), EngineError> {
        if strategy.asset().ticker() != self.asset.ticker() {
            return Err(EngineError::InvalidParameters(format!(
                "strategy asset {} does not match {}",
                strategy.asset().ticker(),
                self.asset.ticker()
            )));
        }
        if weight <= 0.0 {
            return Err(EngineError::InvalidParameters(
                "strategy weight must be positive".to_string(),
            ));
        }
        self.children.push(strategy);
        self.weights.push(weight);
        self.recompute();
        Ok(())
    }

    pub fn remove_strategy(&mut self, index: usize) -> Result<Box<dyn Strategy>, EngineError> {
        if index >= self.children.len() {
            return Err(EngineError::InvalidParameters(format!(
                "no strategy at index {index}"
            )));
        }
        let removed = self.children.remove(index);
        self.weights.remove(index);
        self.recompute();
        Ok(removed)
    }

    pub fn set_vote_threshold(&mut self, threshold: f64) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(EngineError::InvalidParameters(
                "vote threshold must lie in [0, 1]".to_string(),
            ));
        }
        self.vote_threshold = threshold;
        self.recompute();
        Ok(())
    }

    pub fn set_weights(&mut self, weights: Vec<f64>) -> Result<(), EngineError> {
        if weights.len() != self.children.len() {
            return Err(EngineError::InvalidParameters(
                "one weight per child strategy is required".to_string(),
            ));
        }
        self.weights = weights;
        self.recompute();
        Ok(())
    }

    fn combined_signal(&self, timeframe: Timeframe) -> SignalSeries {
        let len = self.asset.frame(timeframe).len();
        if self.children.is_empty() {
            return SignalSeries::empty(len).fill_default();
        }
        let parts: Vec<SignalSeries> = self
            .children
            .iter()
            .map(|c| c.signal(timeframe).clone())
            .collect();
        vote(&parts, &self.weights, self.vote_threshold)
    }

    /// Random search over the weight simplex plus a threshold sampled
    /// from [0, 1], maximizing strategy return over the window. The
    /// original weights and threshold are restored afterwards.
    pub fn optimize_weights(
        &mut self,
        timeframe: Timeframe,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        runs: usize,
        seed: Option<u64>,
    ) -> Result<WeightSearchOutcome, EngineError> {
        if self.children.is_empty() {
            return Err(EngineError::InvalidParameters(
                "combined strategy has no children to weight".to_string(),
            ));
        }

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let n = self.children.len();
        let original_weights = self.weights.clone();
        let original_threshold = self.vote_threshold;

        let mut best: Option<WeightSearchOutcome> = None;
        for run in 0..runs.max(1) {
            // Exponential draws normalized: uniform on the simplex.
            let mut weights: Vec<f64> = (0..n)
                .map(|_| -(1.0 - rng.random::<f64>()).ln())
                .collect();
            let total: f64 = weights.iter().sum();
            for w in &mut weights {
                *w /= total;
            }
            let threshold: f64 = rng.random::<f64>();

            self.weights = weights.clone();
            self.vote_threshold = threshold;
            self.recompute();
            let results = self.backtest(timeframe, start, end);

            if best
                .as_ref()
                .is_none_or(|b| results.strategy_return > b.results.strategy_return)
            {
                debug!(run, strategy_return = results.strategy_return, "new best weights");
                best = Some(WeightSearchOutcome {
                    weights,
                    vote_threshold: threshold,
                    results,
                });
            }
        }

        self.weights = original_weights;
        self.vote_threshold = original_threshold;
        self.recompute();
        best.ok_or_else(|| EngineError::InvalidParameters("no weight candidates tried".to_string()))
    }
}

impl Strategy for CombinedStrategy {
    fn name(&self) -> &'static str {
        "CombinedStrategy"
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
        // Children carry the indicators; the combination itself only
        // contributes the voted signal.
        self.children
            .iter()
            .flat_map(|child| {
                child
                    .indicator_columns(timeframe)
                    .into_iter()
                    .map(|(name, col)| (format!("{}: {name}", child.name()), col))
            })
            .collect()
    }

    fn recompute(&mut self) {
        for child in &mut self.children {
            child.recompute();
        }
        self.daily_signal = self.combined_signal(Timeframe::Daily);
        self.five_signal = self.combined_signal(Timeframe::FiveMinute);
    }
}
