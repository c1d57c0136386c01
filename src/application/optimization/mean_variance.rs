use crate::application::portfolio::Portfolio;
use crate::domain::errors::EngineError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

const SAMPLES: usize = 20_000;
const REFINE_DELTAS: [f64; 5] = [0.1, 0.03, 0.01, 0.003, 0.001];
/// Weight on the return-pinning penalty when tracing the frontier.
const TARGET_PENALTY: f64 = 1e3;

/// One portfolio on (or near) the efficient frontier.
#[derive(Debug, Clone)]
pub struct FrontierPoint {
    pub ret: f64,
    pub vol: f64,
    pub sharpe: f64,
    pub weights: Vec<(String, f64)>,
}

/// Mean-variance optimizer over the held assets' daily returns, with
/// box constraints `min_alloc ≤ w ≤ max_alloc` and full investment.
///
/// Uses seeded random sampling over the weight simplex plus pairwise
/// hill-climbing refinement; expected returns and covariance are
/// annualized with the portfolio's asset-mix factor.
#[derive(Debug, Clone)]
pub struct MeanVarianceOptimizer {
    tickers: Vec<String>,
    mu: Vec<f64>,
    cov: Vec<Vec<f64>>,
    r: f64,
    min_alloc: f64,
    max_alloc: f64,
}

impl MeanVarianceOptimizer {
    pub fn new(
        tickers: Vec<String>,
        mu: Vec<f64>,
        cov: Vec<Vec<f64>>,
        r: f64,
        min_alloc: f64,
        max_alloc: f64,
    ) -> Result<Self, EngineError> {
        let n = tickers.len();
        if n == 0 || mu.len() != n || cov.len() != n || cov.iter().any(|row| row.len() != n) {
            return Err(EngineError::InvalidParameters(
                "expected returns and covariance must match the asset count".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&min_alloc)
            || !(0.0..=1.0).contains(&max_alloc)
            || min_alloc > max_alloc
        {
            return Err(EngineError::InvalidParameters(
                "allocations must satisfy 0 <= min <= max <= 1".to_string(),
            ));
        }
        if max_alloc * (n as f64) < 1.0 || min_alloc * (n as f64) > 1.0 {
            return Err(EngineError::InvalidParameters(
                "box constraints leave no feasible fully-invested portfolio".to_string(),
            ));
        }
        Ok(Self {
            tickers,
            mu,
            cov,
            r,
            min_alloc,
            max_alloc,
        })
    }

    /// Build from a portfolio's held assets.
    pub fn from_portfolio(
        portfolio: &Portfolio,
        min_alloc: f64,
        max_alloc: f64,
    ) -> Result<Self, EngineError> {
        let (tickers, cov, aligned) = portfolio.holdings_covariance()?;
        let ann = portfolio.ann_factor();
        let mu: Vec<f64> = aligned
            .iter()
            .map(|rets| {
                if rets.is_empty() {
                    0.0
                } else {
                    rets.iter().sum::<f64>() / rets.len() as f64 * ann
                }
            })
            .collect();
        Self::new(
            tickers,
            mu,
            cov,
            portfolio.risk_free_rate(),
            min_alloc,
            max_alloc,
        )
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    fn portfolio_return(&self, weights: &[f64]) -> f64 {
        weights.iter().zip(&self.mu).map(|(w, m)| w * m).sum()
    }

    fn portfolio_vol(&self, weights: &[f64]) -> f64 {
        let n = weights.len();
        let mut var = 0.0;
        for i in 0..n {
            for j in 0..n {
                var += weights[i] * weights[j] * self.cov[i][j];
            }
        }
        var.max(0.0).sqrt()
    }

    fn sharpe(&self, weights: &[f64]) -> f64 {
        let vol = self.portfolio_vol(weights);
        if vol <= 1e-12 {
            return f64::MIN;
        }
        (self.portfolio_return(weights) - self.r) / vol
    }

    fn point(&self, weights: Vec<f64>) -> FrontierPoint {
        let ret = self.portfolio_return(&weights);
        let vol = self.portfolio_vol(&weights);
        let sharpe = if vol > 1e-12 { (ret - self.r) / vol } else { 0.0 };
        FrontierPoint {
            ret,
            vol,
            sharpe,
            weights: self.tickers.iter().cloned().zip(weights).collect(),
        }
    }

    /// Uniform simplex draw squeezed into the box by clamping and
    /// redistributing until feasible.
    fn sample_weights(&self, rng: &mut StdRng) -> Vec<f64> {
        let n = self.tickers.len();
        let mut weights: Vec<f64> = (0..n)
            .map(|_| -(1.0 - rng.random::<f64>()).ln())
            .collect();
        let total: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= total;
        }

        for _ in 0..32 {
            for w in &mut weights {
                *w = w.clamp(self.min_alloc, self.max_alloc);
            }
            let total: f64 = weights.iter().sum();
            if (total - 1.0).abs() < 1e-9 {
                break;
            }
            // Spread the imbalance over the weights with slack.
            let excess = total - 1.0;
            let movable: Vec<usize> = (0..n)
                .filter(|&i| {
                    if excess > 0.0 {
                        weights[i] > self.min_alloc
                    } else {
                        weights[i] < self.max_alloc
                    }
                })
                .collect();
            if movable.is_empty() {
                break;
            }
            let share = excess / movable.len() as f64;
            for i in movable {
                weights[i] -= share;
            }
        }
        weights
    }

    /// Pairwise-transfer hill climb: move probability mass between two
    /// assets while it improves the objective and stays in the box.
    fn refine(&self, mut weights: Vec<f64>, objective: impl Fn(&[f64]) -> f64) -> Vec<f64> {
        let n = weights.len();
        let mut best = objective(&weights);
        for &delta in &REFINE_DELTAS {
            loop {
                let mut improved = false;
                for from in 0..n {
                    for to in 0..n {
                        if from == to {
                            continue;
                        }
                        if weights[from] - delta < self.min_alloc - 1e-12
                            || weights[to] + delta > self.max_alloc + 1e-12
                        {
                            continue;
                        }
                        weights[from] -= delta;
                        weights[to] += delta;
                        let candidate = objective(&weights);
                        if candidate > best + 1e-12 {
                            best = candidate;
                            improved = true;
                        } else {
                            weights[from] += delta;
                            weights[to] -= delta;
                        }
                    }
                }
                if !improved {
                    break;
                }
            }
        }
        weights
    }

    fn best_by<F: Fn(&[f64]) -> f64>(
        &self,
        rng: &mut StdRng,
        samples: usize,
        objective: F,
    ) -> Vec<f64> {
        let n = self.tickers.len();
        let mut best_weights = vec![1.0 / n as f64; n];
        // Equal weights may violate the box; squeeze them in first.
        for w in &mut best_weights {
            *w = w.clamp(self.min_alloc, self.max_alloc);
        }
        let mut best = objective(&best_weights);
        for _ in 0..samples {
            let candidate = self.sample_weights(rng);
            let score = objective(&candidate);
            if score > best {
                best = score;
                best_weights = candidate;
            }
        }
        self.refine(best_weights, objective)
    }

    /// The portfolio maximizing `(wᵀμ − r) / √(wᵀΣw)`.
    pub fn optimal_sharpe_portfolio(&self, seed: Option<u64>) -> FrontierPoint {
        let mut rng = seeded(seed);
        let weights = self.best_by(&mut rng, SAMPLES, |w| self.sharpe(w));
        let point = self.point(weights);
        debug!(ret = point.ret, vol = point.vol, sharpe = point.sharpe, "optimal sharpe");
        point
    }

    /// The minimum-variance portfolio.
    pub fn min_variance_portfolio(&self, seed: Option<u64>) -> FrontierPoint {
        let mut rng = seeded(seed);
        let weights = self.best_by(&mut rng, SAMPLES, |w| -self.portfolio_vol(w));
        self.point(weights)
    }

    /// Feasible portfolio with the highest attainable expected return:
    /// floor everything, then fill the best-returning assets to the cap.
    fn max_return_weights(&self) -> Vec<f64> {
        let n = self.tickers.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            self.mu[b]
                .partial_cmp(&self.mu[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut weights = vec![self.min_alloc; n];
        let mut remaining = 1.0 - self.min_alloc * n as f64;
        for i in order {
            let room = self.max_alloc - self.min_alloc;
            let add = room.min(remaining);
            weights[i] += add;
            remaining -= add;
            if remaining <= 1e-12 {
                break;
            }
        }
        weights
    }

    /// `points` evenly spaced target returns between the min-variance
    /// and max-return portfolios; per target, minimize variance with
    /// the return pinned. Output is sorted by return.
    pub fn efficient_frontier(
        &self,
        points: usize,
        seed: Option<u64>,
    ) -> Result<Vec<FrontierPoint>, EngineError> {
        if points < 2 {
            return Err(EngineError::InvalidParameters(
                "the frontier needs at least two points".to_string(),
            ));
        }

        let min_var = self.min_variance_portfolio(seed);
        let max_ret_weights = self.max_return_weights();
        let low = min_var.ret;
        let high = self.portfolio_return(&max_ret_weights);
        let span = high - low;

        let min_var_weights: Vec<f64> = min_var.weights.iter().map(|(_, w)| *w).collect();
        let mut frontier = Vec::with_capacity(points);
        for k in 0..points {
            let a = k as f64 / (points - 1) as f64;
            let target = low + a * span;

            // Expected return is linear in the weights, so this blend
            // hits the target exactly and stays inside the box.
            let start: Vec<f64> = min_var_weights
                .iter()
                .zip(&max_ret_weights)
                .map(|(lo_w, hi_w)| (1.0 - a) * lo_w + a * hi_w)
                .collect();

            let weights = self.refine(start, |w| {
                -(self.portfolio_vol(w) + TARGET_PENALTY * (self.portfolio_return(w) - target).abs())
            });
            frontier.push(self.point(weights));
        }

        frontier.sort_by(|a, b| a.ret.partial_cmp(&b.ret).unwrap_or(std::cmp::Ordering::Equal));
        Ok(frontier)
    }
}

fn seeded(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two uncorrelated assets, equal expected returns, different vols.
    fn two_asset() -> MeanVarianceOptimizer {
        MeanVarianceOptimizer::new(
            vec!["A".to_string(), "B".to_string()],
            vec![0.10, 0.10],
            vec![vec![0.04, 0.0], vec![0.0, 0.01]],
            0.02,
            0.0,
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn min_variance_is_inverse_variance_weighted() {
        let optimizer = two_asset();
        let point = optimizer.min_variance_portfolio(Some(11));
        // 1/σ² weighting: (1/0.04) : (1/0.01) = 0.2 : 0.8.
        let w: std::collections::HashMap<_, _> = point.weights.iter().cloned().collect();
        assert!((w["A"] - 0.2).abs() < 0.01, "A weight {}", w["A"]);
        assert!((w["B"] - 0.8).abs() < 0.01, "B weight {}", w["B"]);
    }

    #[test]
    fn equal_returns_put_max_sharpe_at_min_variance() {
        let optimizer = two_asset();
        let sharpe = optimizer.optimal_sharpe_portfolio(Some(11));
        let min_var = optimizer.min_variance_portfolio(Some(11));
        // With identical expected returns, maximizing Sharpe is
        // minimizing vol: an interior point, not a corner.
        assert!((sharpe.vol - min_var.vol).abs() < 1e-3);
        for (_, w) in &sharpe.weights {
            assert!(*w > 0.05 && *w < 0.95);
        }
    }

    #[test]
    fn frontier_is_sorted_and_spans_the_return_range() {
        let optimizer = MeanVarianceOptimizer::new(
            vec!["A".to_string(), "B".to_string()],
            vec![0.06, 0.14],
            vec![vec![0.02, 0.002], vec![0.002, 0.05]],
            0.02,
            0.0,
            1.0,
        )
        .unwrap();

        let frontier = optimizer.efficient_frontier(11, Some(3)).unwrap();
        assert_eq!(frontier.len(), 11);
        for pair in frontier.windows(2) {
            assert!(pair[0].ret <= pair[1].ret + 1e-9);
        }
        // The top of the frontier is the max-return corner.
        let last = frontier.last().unwrap();
        assert!((last.ret - 0.14).abs() < 5e-3);
        // Volatility rises toward the high-return end past the
        // min-variance point.
        let min_vol = frontier
            .iter()
            .map(|p| p.vol)
            .fold(f64::MAX, f64::min);
        assert!(last.vol > min_vol);
    }

    #[test]
    fn weights_respect_the_box() {
        let optimizer = MeanVarianceOptimizer::new(
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
            vec![0.05, 0.10, 0.15],
            vec![
                vec![0.02, 0.0, 0.0],
                vec![0.0, 0.03, 0.0],
                vec![0.0, 0.0, 0.06],
            ],
            0.02,
            0.1,
            0.5,
        )
        .unwrap();

        let point = optimizer.optimal_sharpe_portfolio(Some(5));
        let total: f64 = point.weights.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-6);
        for (_, w) in &point.weights {
            assert!(*w >= 0.1 - 1e-9 && *w <= 0.5 + 1e-9);
        }
    }

    #[test]
    fn infeasible_box_is_rejected() {
        let result = MeanVarianceOptimizer::new(
            vec!["A".to_string(), "B".to_string()],
            vec![0.1, 0.1],
            vec![vec![0.01, 0.0], vec![0.0, 0.01]],
            0.02,
            0.0,
            0.4, // two assets capped at 0.4 cannot reach 1.0
        );
        assert!(matches!(result, Err(EngineError::InvalidParameters(_))));
    }
}
