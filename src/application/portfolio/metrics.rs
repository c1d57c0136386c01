use crate::application::analytics::{kurtosis, quantile, skewness};
use crate::application::portfolio::drawdown::{self, LongestDrawdown};
use crate::application::portfolio::Portfolio;
use crate::domain::errors::EngineError;
use crate::domain::transaction::{Transaction, TxKind};
use chrono::{Datelike, Days, NaiveDate, Weekday};
use rust_decimal::prelude::ToPrimitive;
use std::collections::{BTreeMap, HashMap};

/// Aligned daily equity curves reconstructed from the transaction log.
#[derive(Debug, Clone)]
pub(crate) struct EquityCurves {
    pub index: Vec<NaiveDate>,
    /// Cumulative net deposits.
    pub deposits: Vec<f64>,
    /// Cumulative cash effect of every transaction.
    pub cash: Vec<f64>,
    /// Holdings marked to forward-filled prices.
    pub values: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct DailyReturnStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub skewness: f64,
    pub kurtosis: f64,
}

#[derive(Debug, Clone)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub trading_return: f64,
    pub annualized_return: f64,
    pub daily_returns: DailyReturnStats,
    pub best_day: f64,
    pub worst_day: f64,
    pub positive_days: f64,
}

#[derive(Debug, Clone)]
pub struct RiskMetrics {
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub beta: f64,
    pub value_at_risk: f64,
    pub tracking_error: f64,
    pub information_ratio: f64,
    pub treynor_ratio: f64,
}

#[derive(Debug, Clone)]
pub struct DrawdownMetrics {
    pub max_drawdown: f64,
    pub average_drawdown: f64,
    pub drawdown_ratio: f64,
    pub calmar_ratio: f64,
    pub longest_drawdown: Option<LongestDrawdown>,
    pub time_to_recovery: f64,
    pub avg_drawdown_duration: f64,
}

#[derive(Debug, Clone)]
pub struct PositionMetrics {
    pub total_value: f64,
    pub cash: f64,
    pub cash_weight: f64,
    pub number_of_positions: usize,
    pub largest_position: f64,
    pub smallest_position: f64,
    pub concentration: f64,
}

#[derive(Debug, Clone)]
pub struct ActivityMetrics {
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub total_pnl: f64,
    pub investment_pnl: f64,
    pub net_deposits: f64,
    pub number_of_trades: usize,
    pub win_rate: f64,
}

#[derive(Debug, Clone)]
pub struct PortfolioStats {
    pub performance: PerformanceMetrics,
    pub risk: RiskMetrics,
    pub drawdown: DrawdownMetrics,
    pub position: PositionMetrics,
    pub activity: ActivityMetrics,
}

/// Per-holding snapshot used by the holdings view.
#[derive(Debug, Clone)]
pub struct HoldingStats {
    pub shares: f64,
    pub weight: f64,
    pub pnl: f64,
    pub returns: f64,
    pub value: f64,
    pub cost_basis: f64,
    pub deposited: f64,
}

/// Marginal and component risk per held asset against the annualized
/// covariance of daily returns.
#[derive(Debug, Clone)]
pub struct RiskDecomposition {
    pub tickers: Vec<String>,
    pub weights: Vec<f64>,
    pub marginal_risk: Vec<f64>,
    pub component_risk: Vec<f64>,
    pub risk_contribution_pct: Vec<f64>,
    pub portfolio_vol: f64,
}

fn round2(x: f64) -> f64 {
    if x.is_finite() { (x * 100.0).round() / 100.0 } else { x }
}

fn round3(x: f64) -> f64 {
    if x.is_finite() { (x * 1000.0).round() / 1000.0 } else { x }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn sample_std(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return f64::NAN;
    }
    let m = mean(xs);
    (xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() as f64 - 1.0)).sqrt()
}

fn population_std(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    let m = mean(xs);
    (xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64).sqrt()
}

/// Sample covariance (ddof = 1) of two equal-length slices.
fn covariance(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len();
    if n < 2 {
        return f64::NAN;
    }
    let (ma, mb) = (mean(a), mean(b));
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - ma) * (y - mb))
        .sum::<f64>()
        / (n as f64 - 1.0)
}

impl Portfolio {
    /// Replay the ledger into aligned daily curves over
    /// `[first transaction, today]`. Calendar days when any crypto is
    /// involved, business days otherwise.
    pub(crate) fn equity_curves(&self) -> Option<EquityCurves> {
        if self.transactions().is_empty() {
            return None;
        }

        let mut sorted: Vec<&Transaction> = self.transactions().iter().collect();
        sorted.sort_by_key(|t| t.date); // stable: same-date keeps id order

        // Holdings snapshot after the last transaction of each date,
        // plus per-date deposit and cash deltas.
        let mut holdings_at: BTreeMap<NaiveDate, HashMap<String, f64>> = BTreeMap::new();
        let mut deposit_delta: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        let mut cash_delta: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        let mut running: HashMap<String, f64> = HashMap::new();

        for t in &sorted {
            let day = t.date.date();
            let value = t.value.to_f64().unwrap_or(0.0);
            match t.kind {
                TxKind::Buy => {
                    if let Some(ticker) = t.asset.ticker() {
                        *running.entry(ticker.to_string()).or_default() += t.shares;
                    }
                    *cash_delta.entry(day).or_default() -= value;
                }
                TxKind::Sell => {
                    if let Some(ticker) = t.asset.ticker() {
                        *running.entry(ticker.to_string()).or_default() -= t.shares;
                    }
                    *cash_delta.entry(day).or_default() += value;
                }
                TxKind::Deposit => {
                    *deposit_delta.entry(day).or_default() += value;
                    *cash_delta.entry(day).or_default() += value;
                }
                TxKind::Withdraw => {
                    *deposit_delta.entry(day).or_default() -= value;
                    *cash_delta.entry(day).or_default() -= value;
                }
            }
            holdings_at.insert(day, running.clone());
        }

        let start = sorted.first()?.date.date();
        let end = self.asof_today().max(start);
        let business_only = !self.touches_crypto();

        let mut index = Vec::new();
        let mut day = start;
        while day <= end {
            let weekend = matches!(day.weekday(), Weekday::Sat | Weekday::Sun);
            if !(business_only && weekend) {
                index.push(day);
            }
            day = day.checked_add_days(Days::new(1))?;
        }

        let tickers: Vec<String> = {
            let mut seen = Vec::new();
            for snapshot in holdings_at.values() {
                for ticker in snapshot.keys() {
                    if !seen.contains(ticker) {
                        seen.push(ticker.clone());
                    }
                }
            }
            seen
        };

        let mut deposits = Vec::with_capacity(index.len());
        let mut cash = Vec::with_capacity(index.len());
        let mut values = Vec::with_capacity(index.len());
        let mut dep_sum = 0.0;
        let mut cash_sum = 0.0;
        let mut dep_iter = deposit_delta.iter().peekable();
        let mut cash_iter = cash_delta.iter().peekable();

        for &date in &index {
            while dep_iter.peek().is_some_and(|(d, _)| **d <= date) {
                dep_sum += dep_iter.next().map(|(_, v)| *v).unwrap_or(0.0);
            }
            while cash_iter.peek().is_some_and(|(d, _)| **d <= date) {
                cash_sum += cash_iter.next().map(|(_, v)| *v).unwrap_or(0.0);
            }
            deposits.push(dep_sum);
            cash.push(cash_sum);

            let snapshot = holdings_at
                .range(..=date)
                .next_back()
                .map(|(_, s)| s)
                .cloned()
                .unwrap_or_default();
            let mut total = 0.0;
            for ticker in &tickers {
                let shares = snapshot.get(ticker).copied().unwrap_or(0.0);
                if shares.abs() < 1e-12 {
                    continue;
                }
                if let Some(asset) = self.asset(ticker) {
                    if let Some(price) = asset.daily.adj_close_at_or_before(date) {
                        total += shares * price;
                    }
                }
            }
            values.push(total);
        }

        Some(EquityCurves {
            index,
            deposits,
            cash,
            values,
        })
    }

    /// Daily portfolio returns: percent change of
    /// `(value + cash) / running deposits`, leading NaN dropped.
    pub fn returns(&self) -> Vec<(NaiveDate, f64)> {
        let Some(curves) = self.equity_curves() else {
            return Vec::new();
        };
        let ratio: Vec<f64> = (0..curves.index.len())
            .map(|i| {
                if curves.deposits[i] > 0.0 {
                    (curves.values[i] + curves.cash[i]) / curves.deposits[i]
                } else {
                    f64::NAN
                }
            })
            .collect();

        let mut out = Vec::with_capacity(ratio.len().saturating_sub(1));
        for i in 1..ratio.len() {
            let ret = ratio[i] / ratio[i - 1] - 1.0;
            if ret.is_finite() {
                out.push((curves.index[i], ret));
            }
        }
        out
    }

    pub fn log_returns(&self) -> Vec<(NaiveDate, f64)> {
        self.returns()
            .into_iter()
            .map(|(d, r)| (d, (1.0 + r).ln()))
            .collect()
    }

    /// Daily PnL: first difference of `value + cash − deposits`.
    pub fn pnls(&self) -> Vec<(NaiveDate, f64)> {
        let Some(curves) = self.equity_curves() else {
            return Vec::new();
        };
        let equity: Vec<f64> = (0..curves.index.len())
            .map(|i| curves.values[i] + curves.cash[i] - curves.deposits[i])
            .collect();
        (1..equity.len())
            .map(|i| (curves.index[i], equity[i] - equity[i - 1]))
            .collect()
    }

    pub fn total_return(&self) -> f64 {
        let sum: f64 = self.log_returns().iter().map(|(_, r)| r).sum();
        sum.exp() - 1.0
    }

    pub fn annualized_return(&self) -> f64 {
        let rets: Vec<f64> = self.returns().into_iter().map(|(_, r)| r).collect();
        if rets.is_empty() {
            return 0.0;
        }
        (1.0 + mean(&rets)).powf(self.ann_factor()) - 1.0
    }

    /// Trading PnL over the cost basis of the current holdings.
    pub fn trading_return(&self, date: Option<NaiveDate>) -> Result<f64, EngineError> {
        let invested: f64 = self
            .holdings()
            .iter()
            .map(|(ticker, shares)| shares * self.cost_bases().get(ticker).copied().unwrap_or(0.0))
            .sum();
        if invested == 0.0 {
            return Ok(0.0);
        }
        Ok(self.trading_pnl(date)? / invested)
    }

    pub fn volatility(&self) -> f64 {
        let rets: Vec<f64> = self.returns().into_iter().map(|(_, r)| r).collect();
        if rets.is_empty() {
            return 0.0;
        }
        sample_std(&rets) * self.ann_factor().sqrt()
    }

    pub fn sharpe_ratio(&self) -> f64 {
        let rets: Vec<f64> = self.returns().into_iter().map(|(_, r)| r).collect();
        if rets.is_empty() {
            return 0.0;
        }
        let ann = self.ann_factor();
        let daily_rf = self.risk_free_rate() / ann;
        let mean_excess = (mean(&rets) - daily_rf) * ann;
        let vol = self.volatility();
        if vol == 0.0 { 0.0 } else { mean_excess / vol }
    }

    pub fn downside_deviation(&self) -> f64 {
        let rets: Vec<f64> = self.returns().into_iter().map(|(_, r)| r).collect();
        if rets.is_empty() {
            return 0.0;
        }
        (rets.iter().map(|r| r.min(0.0).powi(2)).sum::<f64>() / rets.len() as f64).sqrt()
    }

    pub fn sortino_ratio(&self) -> f64 {
        let rets: Vec<f64> = self.returns().into_iter().map(|(_, r)| r).collect();
        if rets.is_empty() {
            return 0.0;
        }
        let downside = self.downside_deviation();
        if downside == 0.0 {
            return 0.0;
        }
        let ann = self.ann_factor();
        let daily_rf = self.risk_free_rate() / ann;
        let mean_excess = (mean(&rets) - daily_rf) * ann;
        mean_excess / (downside * ann.sqrt())
    }

    /// Value at risk at the given confidence (default 0.95 via `stats`):
    /// the magnitude of the return quantile scaled by current value.
    pub fn value_at_risk(&self, confidence: f64) -> Result<f64, EngineError> {
        let rets: Vec<f64> = self.returns().into_iter().map(|(_, r)| r).collect();
        if rets.is_empty() {
            return Ok(0.0);
        }
        let q = quantile(&rets, 1.0 - confidence);
        Ok((q * self.get_value(None)?).abs())
    }

    /// Market returns aligned on the portfolio's return dates.
    fn aligned_market_returns(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        let market = self.market()?;
        let market_rets: HashMap<NaiveDate, f64> = market
            .daily
            .bars()
            .iter()
            .zip(market.daily.rets())
            .filter(|(_, r)| r.is_finite())
            .map(|(b, r)| (b.date(), *r))
            .collect();

        let mut ours = Vec::new();
        let mut theirs = Vec::new();
        for (date, ret) in self.returns() {
            if let Some(m) = market_rets.get(&date) {
                ours.push(ret);
                theirs.push(*m);
            }
        }
        (!ours.is_empty()).then_some((ours, theirs))
    }

    pub fn tracking_error(&self) -> f64 {
        let Some((ours, theirs)) = self.aligned_market_returns() else {
            return 0.0;
        };
        let active: Vec<f64> = ours.iter().zip(&theirs).map(|(a, b)| a - b).collect();
        population_std(&active)
    }

    pub fn information_ratio(&self) -> f64 {
        let te = self.tracking_error();
        if te == 0.0 {
            return 0.0;
        }
        let Some((ours, theirs)) = self.aligned_market_returns() else {
            return 0.0;
        };
        let active: Vec<f64> = ours.iter().zip(&theirs).map(|(a, b)| a - b).collect();
        mean(&active) / te
    }

    /// Portfolio beta: weighted sum of per-asset betas, each regressed
    /// from monthly exponentiated log returns against the market.
    pub fn beta(&self) -> f64 {
        let Some(market) = self.market() else {
            return 0.0;
        };
        let weights = match self.weights(None) {
            Ok(w) if !w.is_empty() => w,
            _ => return 0.0,
        };

        // Columns of daily log returns keyed by date.
        let column = |asset: &crate::domain::asset::Asset| -> HashMap<NaiveDate, f64> {
            asset
                .daily
                .bars()
                .iter()
                .zip(asset.daily.log_rets())
                .filter(|(_, r)| r.is_finite())
                .map(|(b, r)| (b.date(), *r))
                .collect()
        };
        let market_col = column(market);
        let asset_cols: Vec<(String, HashMap<NaiveDate, f64>)> = weights
            .keys()
            .filter_map(|ticker| self.asset(ticker).map(|a| (ticker.clone(), column(a))))
            .collect();
        if asset_cols.is_empty() {
            return 0.0;
        }

        let mut dates: Vec<NaiveDate> = market_col
            .keys()
            .chain(asset_cols.iter().flat_map(|(_, c)| c.keys()))
            .copied()
            .collect();
        dates.sort_unstable();
        dates.dedup();

        // Crypto holdings leave gaps on market holidays: forward-fill
        // those instead of dropping the rows.
        let ffill = self.touches_crypto();
        let mut rows: Vec<(NaiveDate, Vec<f64>)> = Vec::with_capacity(dates.len());
        let mut last: Vec<f64> = vec![f64::NAN; 1 + asset_cols.len()];
        for date in dates {
            let mut row = Vec::with_capacity(1 + asset_cols.len());
            for (slot, col) in std::iter::once(&market_col)
                .chain(asset_cols.iter().map(|(_, c)| c))
                .enumerate()
            {
                let value = col.get(&date).copied();
                let value = match (value, ffill) {
                    (Some(v), _) => v,
                    (None, true) => last[slot],
                    (None, false) => f64::NAN,
                };
                row.push(value);
            }
            for (slot, v) in row.iter().enumerate() {
                if v.is_finite() {
                    last[slot] = *v;
                }
            }
            if row.iter().all(|v| v.is_finite()) {
                rows.push((date, row));
            }
        }
        if rows.is_empty() {
            return 0.0;
        }

        // Monthly sums of log returns, exponentiated.
        let mut monthly: BTreeMap<(i32, u32), Vec<f64>> = BTreeMap::new();
        for (date, row) in rows {
            let entry = monthly
                .entry((date.year(), date.month()))
                .or_insert_with(|| vec![0.0; row.len()]);
            for (slot, v) in row.iter().enumerate() {
                entry[slot] += v;
            }
        }
        let months: Vec<Vec<f64>> = monthly
            .into_values()
            .map(|row| row.into_iter().map(f64::exp).collect())
            .collect();
        if months.len() < 2 {
            return 0.0;
        }

        let market_series: Vec<f64> = months.iter().map(|row| row[0]).collect();
        let market_var = {
            let m = mean(&market_series);
            market_series.iter().map(|v| (v - m).powi(2)).sum::<f64>()
                / (market_series.len() as f64 - 1.0)
        };
        if market_var == 0.0 {
            return 0.0;
        }

        let mut beta = 0.0;
        for (slot, (ticker, _)) in asset_cols.iter().enumerate() {
            let series: Vec<f64> = months.iter().map(|row| row[slot + 1]).collect();
            let asset_beta = covariance(&series, &market_series) / market_var;
            beta += weights.get(ticker).copied().unwrap_or(0.0) * asset_beta;
        }
        beta
    }

    pub fn treynor_ratio(&self) -> f64 {
        let beta = self.beta();
        if beta == 0.0 {
            return 0.0;
        }
        let rets: Vec<f64> = self.returns().into_iter().map(|(_, r)| r).collect();
        if rets.is_empty() {
            return 0.0;
        }
        let ann = self.ann_factor();
        let daily_rf = self.risk_free_rate() / ann;
        (mean(&rets) - daily_rf) * ann / beta
    }

    /// Pairwise correlation of the held assets' daily returns.
    pub fn correlation_matrix(&self) -> (Vec<String>, Vec<Vec<f64>>) {
        let mut tickers: Vec<String> = self.holdings().keys().cloned().collect();
        tickers.sort();

        let cols: Vec<HashMap<NaiveDate, f64>> = tickers
            .iter()
            .filter_map(|t| self.asset(t))
            .map(|a| {
                a.daily
                    .bars()
                    .iter()
                    .zip(a.daily.rets())
                    .filter(|(_, r)| r.is_finite())
                    .map(|(b, r)| (b.date(), *r))
                    .collect()
            })
            .collect();

        let n = tickers.len();
        let mut matrix = vec![vec![f64::NAN; n]; n];
        for i in 0..n {
            matrix[i][i] = 1.0;
            for j in 0..i {
                let mut a = Vec::new();
                let mut b = Vec::new();
                for (date, x) in &cols[i] {
                    if let Some(y) = cols[j].get(date) {
                        a.push(*x);
                        b.push(*y);
                    }
                }
                let denom = sample_std(&a) * sample_std(&b);
                let corr = if denom > 0.0 {
                    covariance(&a, &b) / denom
                } else {
                    f64::NAN
                };
                matrix[i][j] = corr;
                matrix[j][i] = corr;
            }
        }
        (tickers, matrix)
    }

    /// Annualized covariance of the held assets' daily returns over the
    /// intersection of their histories, with the tickers in sorted order.
    pub(crate) fn holdings_covariance(&self) -> Result<(Vec<String>, Vec<Vec<f64>>, Vec<Vec<f64>>), EngineError> {
        let mut tickers: Vec<String> = self.holdings().keys().cloned().collect();
        tickers.sort();
        if tickers.is_empty() {
            return Err(EngineError::InvalidParameters(
                "no holdings to analyze".to_string(),
            ));
        }

        let cols: Vec<HashMap<NaiveDate, f64>> = tickers
            .iter()
            .map(|t| {
                let asset = self
                    .asset(t)
                    .ok_or_else(|| EngineError::InvalidAsset(t.clone()))?;
                Ok(asset
                    .daily
                    .bars()
                    .iter()
                    .zip(asset.daily.rets())
                    .filter(|(_, r)| r.is_finite())
                    .map(|(b, r)| (b.date(), *r))
                    .collect())
            })
            .collect::<Result<_, EngineError>>()?;

        let mut dates: Vec<NaiveDate> = cols[0].keys().copied().collect();
        dates.retain(|d| cols.iter().all(|c| c.contains_key(d)));
        dates.sort_unstable();

        let aligned: Vec<Vec<f64>> = cols
            .iter()
            .map(|c| dates.iter().map(|d| c[d]).collect())
            .collect();

        let ann = self.ann_factor();
        let n = tickers.len();
        let mut cov = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..=i {
                let c = covariance(&aligned[i], &aligned[j]) * ann;
                cov[i][j] = c;
                cov[j][i] = c;
            }
        }
        Ok((tickers, cov, aligned))
    }

    /// Weight, marginal and component risk per held asset.
    pub fn risk_decomposition(&self) -> Result<RiskDecomposition, EngineError> {
        let (tickers, cov, _) = self.holdings_covariance()?;
        let weights_map = self.weights(None)?;
        let weights: Vec<f64> = tickers
            .iter()
            .map(|t| weights_map.get(t).copied().unwrap_or(0.0))
            .collect();

        let n = tickers.len();
        let mut cov_w = vec![0.0; n];
        for i in 0..n {
            cov_w[i] = (0..n).map(|j| cov[i][j] * weights[j]).sum();
        }
        let variance: f64 = (0..n).map(|i| weights[i] * cov_w[i]).sum();
        let port_vol = variance.max(0.0).sqrt();
        if port_vol == 0.0 {
            return Err(EngineError::InvalidParameters(
                "degenerate covariance: zero portfolio volatility".to_string(),
            ));
        }

        let marginal_risk: Vec<f64> = cov_w.iter().map(|c| c / port_vol).collect();
        let component_risk: Vec<f64> = marginal_risk
            .iter()
            .zip(&weights)
            .map(|(m, w)| m * w)
            .collect();
        let risk_contribution_pct: Vec<f64> = component_risk
            .iter()
            .map(|c| c / port_vol * 100.0)
            .collect();

        Ok(RiskDecomposition {
            tickers,
            weights,
            marginal_risk,
            component_risk,
            risk_contribution_pct,
            portfolio_vol: port_vol,
        })
    }

    /// Per-holding stats keyed by ticker.
    pub fn holdings_stats(&self) -> Result<HashMap<String, HoldingStats>, EngineError> {
        let weights = self.weights(None)?;
        let values = self.holdings_value(None)?;
        let pnl = self.holdings_pnl(None)?;
        let returns = self.holdings_returns(None)?;

        Ok(self
            .holdings()
            .iter()
            .map(|(ticker, shares)| {
                let cost_basis = self.cost_bases().get(ticker).copied().unwrap_or(0.0);
                (
                    ticker.clone(),
                    HoldingStats {
                        shares: *shares,
                        weight: weights.get(ticker).copied().unwrap_or(0.0),
                        pnl: pnl.get(ticker).copied().unwrap_or(0.0),
                        returns: returns.get(ticker).copied().unwrap_or(0.0),
                        value: values.get(ticker).copied().unwrap_or(0.0),
                        cost_basis,
                        deposited: shares * cost_basis,
                    },
                )
            })
            .collect())
    }

    /// The full metrics bundle: monetary values rounded to 2 decimals,
    /// ratios to 3.
    pub fn stats(&self) -> Result<PortfolioStats, EngineError> {
        let rets: Vec<f64> = self.returns().into_iter().map(|(_, r)| r).collect();

        let performance = PerformanceMetrics {
            total_return: round3(self.total_return()),
            trading_return: round3(self.trading_return(None)?),
            annualized_return: round3(self.annualized_return()),
            daily_returns: DailyReturnStats {
                mean: round3(mean(&rets)),
                median: round3(quantile(&rets, 0.5)),
                std: round3(sample_std(&rets)),
                skewness: round3(skewness(&rets)),
                kurtosis: round3(kurtosis(&rets)),
            },
            best_day: round3(rets.iter().copied().fold(f64::NAN, f64::max)),
            worst_day: round3(rets.iter().copied().fold(f64::NAN, f64::min)),
            positive_days: if rets.is_empty() {
                0.0
            } else {
                round3(rets.iter().filter(|r| **r > 0.0).count() as f64 / rets.len() as f64)
            },
        };

        let risk = RiskMetrics {
            volatility: round3(self.volatility()),
            sharpe_ratio: round3(self.sharpe_ratio()),
            sortino_ratio: round3(self.sortino_ratio()),
            beta: round3(self.beta()),
            value_at_risk: round2(self.value_at_risk(0.95)?),
            tracking_error: round3(self.tracking_error()),
            information_ratio: round3(self.information_ratio()),
            treynor_ratio: round3(self.treynor_ratio()),
        };

        let dd = self.drawdowns();
        let periods = drawdown::drawdown_periods(&dd);
        let max_dd = drawdown::max_drawdown(&dd);
        let avg_dd = drawdown::average_drawdown(&dd);
        let drawdown_metrics = DrawdownMetrics {
            max_drawdown: round3(max_dd),
            average_drawdown: round3(avg_dd),
            drawdown_ratio: round3(if avg_dd != 0.0 { max_dd / avg_dd } else { 0.0 }),
            calmar_ratio: round3(self.calmar_ratio()),
            longest_drawdown: drawdown::longest_drawdown(&dd),
            time_to_recovery: round3(drawdown::time_to_recovery(&periods, 3, 0.05)),
            avg_drawdown_duration: round3(drawdown::average_drawdown_duration(&periods, 3, 0.05)),
        };

        let total_value = self.get_value(None)?;
        let weights = self.weights(None)?;
        let cash = self.cash().to_f64().unwrap_or(0.0);
        let position = PositionMetrics {
            total_value: round2(total_value),
            cash: round2(cash),
            cash_weight: round3(if total_value != 0.0 {
                cash / total_value
            } else {
                0.0
            }),
            number_of_positions: self.holdings().len(),
            largest_position: round3(weights.values().copied().fold(0.0, f64::max)),
            smallest_position: round3(if weights.is_empty() {
                0.0
            } else {
                weights.values().copied().fold(f64::MAX, f64::min)
            }),
            concentration: round3(weights.values().map(|w| w * w).sum()),
        };

        let activity = ActivityMetrics {
            realized_pnl: round2(self.realized_pnl().to_f64().unwrap_or(0.0)),
            unrealized_pnl: round2(self.unrealized_pnl(None)?),
            total_pnl: round2(self.trading_pnl(None)?),
            investment_pnl: round2(self.investment_pnl(None)?),
            net_deposits: round2(self.net_deposits().to_f64().unwrap_or(0.0)),
            number_of_trades: self
                .transactions()
                .iter()
                .filter(|t| t.kind.is_trade())
                .count(),
            win_rate: round3(self.win_rate()),
        };

        Ok(PortfolioStats {
            performance,
            risk,
            drawdown: drawdown_metrics,
            position,
            activity,
        })
    }
}
