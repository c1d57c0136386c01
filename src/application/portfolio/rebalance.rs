use crate::application::portfolio::{Portfolio, TradeAmount};
use crate::domain::errors::EngineError;
use crate::domain::transaction::Transaction;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use tracing::debug;

/// Trade-value differences below this are ignored as dust.
const REBALANCE_THRESHOLD: f64 = 1e-2;

impl Portfolio {
    /// Trade toward target weights.
    ///
    /// Targets are normalized to sum to 1 and are relative to the total
    /// holdings value (cash keeps whatever is left over). Held assets
    /// missing from the target are liquidated. Trades run in ascending
    /// `target − current` order, so sells free up cash before buys
    /// spend it.
    ///
    /// With `inplace` the trades execute on this portfolio; otherwise
    /// they run against a deep copy and are only returned.
    pub fn rebalance(
        &mut self,
        target_weights: &HashMap<String, f64>,
        inplace: bool,
        date: Option<NaiveDateTime>,
    ) -> Result<Vec<Transaction>, EngineError> {
        for ticker in target_weights.keys() {
            if self.asset(ticker).is_none() {
                return Err(EngineError::InvalidAsset(ticker.clone()));
            }
        }

        let total_weight: f64 = target_weights.values().sum();
        if total_weight <= 0.0 {
            return Err(EngineError::InvalidParameters(
                "target weights must sum to a positive total".to_string(),
            ));
        }
        let targets: HashMap<&str, f64> = target_weights
            .iter()
            .map(|(k, w)| (k.as_str(), w / total_weight))
            .collect();

        let asof = date.map(|d| d.date());
        let values = self.holdings_value(asof)?;
        let total_value: f64 = values.values().sum();
        let current = self.weights(asof)?;

        // Union of held and targeted assets, sells first.
        let mut tickers: Vec<String> = self.holdings().keys().cloned().collect();
        for ticker in target_weights.keys() {
            if !tickers.contains(ticker) {
                tickers.push(ticker.clone());
            }
        }
        tickers.sort_by(|a, b| {
            let diff = |t: &String| {
                targets.get(t.as_str()).copied().unwrap_or(0.0)
                    - current.get(t).copied().unwrap_or(0.0)
            };
            diff(a)
                .partial_cmp(&diff(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if !inplace {
            let mut copy = self.clone();
            let before = copy.transactions().len();
            copy.apply_rebalance(&tickers, &targets, &values, total_value, date)?;
            return Ok(copy.transactions()[before..].to_vec());
        }

        let before = self.transactions().len();
        self.apply_rebalance(&tickers, &targets, &values, total_value, date)?;
        Ok(self.transactions()[before..].to_vec())
    }

    fn apply_rebalance(
        &mut self,
        tickers: &[String],
        targets: &HashMap<&str, f64>,
        values: &HashMap<String, f64>,
        total_value: f64,
        date: Option<NaiveDateTime>,
    ) -> Result<(), EngineError> {
        for ticker in tickers {
            let held_value = values.get(ticker).copied().unwrap_or(0.0);
            match targets.get(ticker.as_str()) {
                None => {
                    // Fully liquidate anything not in the target.
                    let shares = self.holdings().get(ticker).copied().unwrap_or(0.0);
                    if shares > 0.0 {
                        debug!(ticker, shares, "rebalance: liquidating");
                        self.sell(ticker, TradeAmount::Shares(shares), date, None)?;
                    }
                }
                Some(target) => {
                    let target_value = target * total_value;
                    let diff = target_value - held_value;
                    if diff < -REBALANCE_THRESHOLD {
                        debug!(ticker, value = -diff, "rebalance: selling");
                        self.sell(ticker, TradeAmount::Value(-diff), date, None)?;
                    } else if diff > REBALANCE_THRESHOLD {
                        debug!(ticker, value = diff, "rebalance: buying");
                        self.buy(ticker, TradeAmount::Value(diff), date, None)?;
                    }
                }
            }
        }
        Ok(())
    }
}
