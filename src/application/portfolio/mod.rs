pub mod drawdown;
pub mod metrics;
pub mod rebalance;

use crate::domain::asset::{Asset, AssetKind};
use crate::domain::errors::EngineError;
use crate::domain::fx::FxSeries;
use crate::domain::transaction::{AssetRef, Transaction, TxKind};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Holdings below this are treated as fully sold.
const SHARE_EPSILON: f64 = 1e-8;
/// Buys may overdraw cash by up to a cent of rounding slack.
const BUY_TOLERANCE: &str = "-0.01";

/// Trade sizing: callers give shares or value; replays give both to
/// skip the price lookup.
#[derive(Debug, Clone, Copy)]
pub enum TradeAmount {
    Shares(f64),
    Value(f64),
    Exact { shares: f64, value: f64 },
}

/// Seed for building a portfolio from existing positions.
#[derive(Debug, Clone, Copy)]
pub struct InitialHolding {
    pub shares: f64,
    pub avg_price: f64,
}

/// Snapshot of everything but the transaction log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioState {
    pub holdings: BTreeMap<String, f64>,
    pub cost_bases: BTreeMap<String, f64>,
    pub assets: Vec<String>,
    pub cash: Decimal,
    pub r: f64,
    pub currency: String,
    pub next_id: u64,
}

/// A transaction ledger with weighted-average cost-basis accounting.
///
/// The portfolio owns daily-only copies of its assets, already
/// converted into the reference currency. All mutation goes through
/// deposit/withdraw/buy/sell (and rebalance on top of them); a failed
/// operation leaves the state untouched.
#[derive(Debug, Clone)]
pub struct Portfolio {
    currency: String,
    r: f64,
    cash: Decimal,
    holdings: HashMap<String, f64>,
    cost_bases: HashMap<String, f64>,
    transactions: Vec<Transaction>,
    next_id: u64,
    /// Data for every asset that ever entered the ledger, keyed by
    /// ticker. Sold-out assets stay here so re-buys and PnL of past
    /// trades keep working; `holdings` alone defines what is held.
    assets: HashMap<String, Asset>,
    /// Reference market used for beta and tracking error.
    market: Option<Asset>,
    fx: HashMap<String, FxSeries>,
}

impl Portfolio {
    pub fn new(currency: &str, r: f64) -> Self {
        Self {
            currency: currency.to_string(),
            r,
            cash: Decimal::ZERO,
            holdings: HashMap::new(),
            cost_bases: HashMap::new(),
            transactions: Vec::new(),
            next_id: 0,
            assets: HashMap::new(),
            market: None,
            fx: HashMap::new(),
        }
    }

    /// Build from existing positions. Without an explicit currency the
    /// modal currency of the seeded assets wins, defaulting to USD.
    pub fn from_holdings(
        seeds: Vec<(Asset, InitialHolding)>,
        currency: Option<&str>,
        r: f64,
        fx: Vec<FxSeries>,
    ) -> Result<Self, EngineError> {
        let currency = match currency {
            Some(c) => c.to_string(),
            None => {
                let mut counts: HashMap<&str, usize> = HashMap::new();
                for (asset, _) in &seeds {
                    *counts.entry(asset.meta.currency.as_str()).or_default() += 1;
                }
                counts
                    .into_iter()
                    .max_by_key(|(_, n)| *n)
                    .map(|(c, _)| c.to_string())
                    .unwrap_or_else(|| "USD".to_string())
            }
        };

        let mut portfolio = Self::new(&currency, r);
        for series in fx {
            portfolio.add_fx(series);
        }
        for (asset, holding) in seeds {
            let native = asset.meta.currency.clone();
            let ticker = asset.ticker().to_string();
            portfolio.register_asset(asset)?;
            let avg_price = if native != portfolio.currency {
                // Seed prices arrive in the asset's native currency.
                let today = portfolio.asof_today();
                portfolio.convert_to_ref(holding.avg_price, &native, today)?
            } else {
                holding.avg_price
            };
            portfolio.holdings.insert(ticker.clone(), holding.shares);
            portfolio.cost_bases.insert(ticker, avg_price);
        }
        Ok(portfolio)
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn risk_free_rate(&self) -> f64 {
        self.r
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn holdings(&self) -> &HashMap<String, f64> {
        &self.holdings
    }

    pub fn cost_bases(&self) -> &HashMap<String, f64> {
        &self.cost_bases
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn asset(&self, ticker: &str) -> Option<&Asset> {
        self.assets.get(ticker)
    }

    pub fn market(&self) -> Option<&Asset> {
        self.market.as_ref()
    }

    pub fn add_fx(&mut self, series: FxSeries) {
        self.fx.insert(series.pair(), series);
    }

    /// Install the reference market asset, converting it into the
    /// reference currency if needed.
    pub fn set_market(&mut self, market: Asset) -> Result<(), EngineError> {
        let converted = self.converted_copy(market)?;
        self.market = Some(converted);
        Ok(())
    }

    /// Register an asset for trading: stores a daily-only copy in the
    /// reference currency. Idempotent per ticker.
    pub fn register_asset(&mut self, asset: Asset) -> Result<(), EngineError> {
        if self.assets.contains_key(asset.ticker()) {
            return Ok(());
        }
        let converted = self.converted_copy(asset)?;
        self.assets.insert(converted.ticker().to_string(), converted);
        Ok(())
    }

    fn converted_copy(&self, asset: Asset) -> Result<Asset, EngineError> {
        let mut copy = asset.into_daily_only();
        if copy.meta.currency != self.currency {
            let pair = format!("{}/{}", copy.meta.currency, self.currency);
            let series = self.fx.get(&pair).ok_or_else(|| EngineError::MissingData {
                what: format!("fx series {pair}"),
                date: self.asof_today(),
            })?;
            series.convert_asset(&mut copy)?;
        }
        Ok(copy)
    }

    /// The engine's "today": the latest bar or transaction date it
    /// knows about, so analytics stay deterministic for stored data.
    pub fn asof_today(&self) -> NaiveDate {
        let mut today = None;
        for asset in self.assets.values().chain(self.market.as_ref()) {
            today = today.max(asset.daily.last_date());
        }
        today = today.max(self.transactions.last().map(|t| t.date.date()));
        today.unwrap_or_else(|| Utc::now().date_naive())
    }

    fn parse_date(date: Option<NaiveDateTime>) -> NaiveDateTime {
        date.unwrap_or_else(|| Utc::now().naive_utc())
    }

    fn convert_to_ref(
        &self,
        value: f64,
        currency: &str,
        date: NaiveDate,
    ) -> Result<f64, EngineError> {
        if currency == self.currency {
            return Ok(value);
        }
        let pair = format!("{}/{}", currency, self.currency);
        let series = self.fx.get(&pair).ok_or_else(|| EngineError::MissingData {
            what: format!("fx series {pair}"),
            date,
        })?;
        series.convert_value(value, date)
    }

    fn round_value(value: f64) -> Decimal {
        Decimal::from_f64(value)
            .unwrap_or(Decimal::ZERO)
            .round_dp(2)
    }

    fn push_transaction(
        &mut self,
        kind: TxKind,
        asset: AssetRef,
        shares: f64,
        value: Decimal,
        profit: Decimal,
        date: NaiveDateTime,
    ) -> &Transaction {
        let tx = Transaction {
            kind,
            asset,
            shares: (shares * 1e5).round() / 1e5,
            value,
            profit,
            date,
            id: self.next_id,
        };
        self.transactions.push(tx);
        self.next_id += 1;
        self.debug_check_invariants();
        self.transactions.last().expect("just pushed")
    }

    pub fn deposit(
        &mut self,
        value: f64,
        currency: Option<&str>,
        date: Option<NaiveDateTime>,
    ) -> Result<&Transaction, EngineError> {
        let date = Self::parse_date(date);
        let currency = currency.unwrap_or(&self.currency).to_string();
        let value = self.convert_to_ref(value, &currency, date.date())?;
        let value = Self::round_value(value);

        self.cash += value;
        Ok(self.push_transaction(TxKind::Deposit, AssetRef::Cash, 0.0, value, Decimal::ZERO, date))
    }

    pub fn withdraw(
        &mut self,
        value: f64,
        currency: Option<&str>,
        date: Option<NaiveDateTime>,
    ) -> Result<&Transaction, EngineError> {
        let date = Self::parse_date(date);
        let currency = currency.unwrap_or(&self.currency).to_string();
        let value = self.convert_to_ref(value, &currency, date.date())?;
        let value = Self::round_value(value);

        if self.cash - value < Decimal::ZERO {
            return Err(EngineError::InsufficientFunds {
                need: value,
                available: self.cash,
            });
        }

        self.cash -= value;
        Ok(self.push_transaction(
            TxKind::Withdraw,
            AssetRef::Cash,
            0.0,
            value,
            Decimal::ZERO,
            date,
        ))
    }

    /// Resolve a trade amount into (shares, value-in-reference-currency).
    fn resolve_amount(
        &self,
        ticker: &str,
        amount: TradeAmount,
        currency: &str,
        date: NaiveDate,
    ) -> Result<(f64, f64), EngineError> {
        let asset = self
            .assets
            .get(ticker)
            .ok_or_else(|| EngineError::InvalidAsset(ticker.to_string()))?;
        match amount {
            TradeAmount::Shares(shares) => {
                let price = asset.daily.price_on(date)?;
                Ok((shares, shares * price))
            }
            TradeAmount::Value(value) => {
                let value = self.convert_to_ref(value, currency, date)?;
                let price = asset.daily.price_on(date)?;
                Ok((value / price, value))
            }
            TradeAmount::Exact { shares, value } => {
                let value = self.convert_to_ref(value, currency, date)?;
                Ok((shares, value))
            }
        }
    }

    pub fn buy(
        &mut self,
        ticker: &str,
        amount: TradeAmount,
        date: Option<NaiveDateTime>,
        currency: Option<&str>,
    ) -> Result<&Transaction, EngineError> {
        let date = Self::parse_date(date);
        let currency = currency.unwrap_or(&self.currency).to_string();
        let (shares, value) = self.resolve_amount(ticker, amount, &currency, date.date())?;
        let value = Self::round_value(value);

        let tolerance: Decimal = BUY_TOLERANCE.parse().expect("tolerance literal");
        if self.cash - value < tolerance {
            return Err(EngineError::InsufficientFunds {
                need: value,
                available: self.cash,
            });
        }

        let held = self.holdings.get(ticker).copied().unwrap_or(0.0);
        let old_cost = self.cost_bases.get(ticker).copied().unwrap_or(0.0) * held;
        let new_held = held + shares;
        self.holdings.insert(ticker.to_string(), new_held);
        self.cost_bases.insert(
            ticker.to_string(),
            (old_cost + value.to_f64().unwrap_or(0.0)) / new_held,
        );
        self.cash -= value;

        debug!(ticker, shares, %value, "buy");
        Ok(self.push_transaction(
            TxKind::Buy,
            AssetRef::Ticker(ticker.to_string()),
            shares,
            value,
            Decimal::ZERO,
            date,
        ))
    }

    pub fn sell(
        &mut self,
        ticker: &str,
        amount: TradeAmount,
        date: Option<NaiveDateTime>,
        currency: Option<&str>,
    ) -> Result<&Transaction, EngineError> {
        let date = Self::parse_date(date);
        let currency = currency.unwrap_or(&self.currency).to_string();
        let (shares, value) = self.resolve_amount(ticker, amount, &currency, date.date())?;
        let value = Self::round_value(value);

        let held = self.holdings.get(ticker).copied().unwrap_or(0.0);
        if shares > held + SHARE_EPSILON {
            return Err(EngineError::NotEnoughShares {
                ticker: ticker.to_string(),
                want: shares,
                held,
            });
        }

        let basis = self.cost_bases.get(ticker).copied().unwrap_or(0.0);
        let profit =
            Self::round_value(value.to_f64().unwrap_or(0.0) - basis * shares);

        let remaining = held - shares;
        if remaining < SHARE_EPSILON {
            // Cost basis stays for the PnL of any later re-buy.
            self.holdings.remove(ticker);
        } else {
            self.holdings.insert(ticker.to_string(), remaining);
        }
        self.cash += value;

        debug!(ticker, shares, %value, %profit, "sell");
        Ok(self.push_transaction(
            TxKind::Sell,
            AssetRef::Ticker(ticker.to_string()),
            shares,
            value,
            profit,
            date,
        ))
    }

    /// Replay a transaction list through the ledger primitives.
    /// Trades carry both shares and value so no price lookup happens.
    pub fn from_transactions(&mut self, transactions: &[Transaction]) -> Result<(), EngineError> {
        for t in transactions {
            let value = t.value.to_f64().unwrap_or(0.0);
            match t.kind {
                TxKind::Deposit => {
                    self.deposit(value, None, Some(t.date))?;
                }
                TxKind::Withdraw => {
                    self.withdraw(value, None, Some(t.date))?;
                }
                TxKind::Buy => {
                    let ticker = t.asset.ticker().ok_or_else(|| {
                        EngineError::InvalidAsset("buy without ticker".to_string())
                    })?;
                    self.buy(
                        ticker,
                        TradeAmount::Exact {
                            shares: t.shares,
                            value,
                        },
                        Some(t.date),
                        None,
                    )?;
                }
                TxKind::Sell => {
                    let ticker = t.asset.ticker().ok_or_else(|| {
                        EngineError::InvalidAsset("sell without ticker".to_string())
                    })?;
                    self.sell(
                        ticker,
                        TradeAmount::Exact {
                            shares: t.shares,
                            value,
                        },
                        Some(t.date),
                        None,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Market value per held asset at `date` (default: the engine's
    /// today), in the reference currency.
    pub fn holdings_value(
        &self,
        date: Option<NaiveDate>,
    ) -> Result<HashMap<String, f64>, EngineError> {
        let date = date.unwrap_or_else(|| self.asof_today());
        let mut out = HashMap::with_capacity(self.holdings.len());
        for (ticker, shares) in &self.holdings {
            let asset = self
                .assets
                .get(ticker)
                .ok_or_else(|| EngineError::InvalidAsset(ticker.clone()))?;
            out.insert(ticker.clone(), asset.daily.price_on(date)? * shares);
        }
        Ok(out)
    }

    /// Portfolio weights over held assets; empty map when nothing is
    /// held.
    pub fn weights(&self, date: Option<NaiveDate>) -> Result<HashMap<String, f64>, EngineError> {
        let values = self.holdings_value(date)?;
        let total: f64 = values.values().sum();
        if total <= 0.0 {
            return Ok(HashMap::new());
        }
        Ok(values.into_iter().map(|(k, v)| (k, v / total)).collect())
    }

    /// Total portfolio market value (holdings + cash).
    pub fn get_value(&self, date: Option<NaiveDate>) -> Result<f64, EngineError> {
        let holdings: f64 = self.holdings_value(date)?.values().sum();
        Ok(holdings + self.cash.to_f64().unwrap_or(0.0))
    }

    /// Absolute PnL per held asset vs its cost basis.
    pub fn holdings_pnl(
        &self,
        date: Option<NaiveDate>,
    ) -> Result<HashMap<String, f64>, EngineError> {
        let values = self.holdings_value(date)?;
        Ok(values
            .into_iter()
            .map(|(ticker, value)| {
                let invested = self.holdings.get(&ticker).copied().unwrap_or(0.0)
                    * self.cost_bases.get(&ticker).copied().unwrap_or(0.0);
                (ticker, value - invested)
            })
            .collect())
    }

    /// Fractional return per held asset vs its cost basis.
    pub fn holdings_returns(
        &self,
        date: Option<NaiveDate>,
    ) -> Result<HashMap<String, f64>, EngineError> {
        let pnl = self.holdings_pnl(date)?;
        Ok(pnl
            .into_iter()
            .map(|(ticker, p)| {
                let invested = self.holdings.get(&ticker).copied().unwrap_or(0.0)
                    * self.cost_bases.get(&ticker).copied().unwrap_or(0.0);
                let ret = if invested != 0.0 { p / invested } else { 0.0 };
                (ticker, ret)
            })
            .collect())
    }

    pub fn net_deposits(&self) -> Decimal {
        self.transactions
            .iter()
            .map(|t| match t.kind {
                TxKind::Deposit => t.value,
                TxKind::Withdraw => -t.value,
                _ => Decimal::ZERO,
            })
            .sum()
    }

    /// Profit realized by sells: proceeds minus cost basis of the sold
    /// shares.
    pub fn realized_pnl(&self) -> Decimal {
        self.transactions
            .iter()
            .filter(|t| t.kind == TxKind::Sell)
            .map(|t| t.profit)
            .sum()
    }

    /// Paper profit of the current holdings.
    pub fn unrealized_pnl(&self, date: Option<NaiveDate>) -> Result<f64, EngineError> {
        Ok(self.holdings_pnl(date)?.values().sum())
    }

    /// Realized plus unrealized.
    pub fn trading_pnl(&self, date: Option<NaiveDate>) -> Result<f64, EngineError> {
        Ok(self.realized_pnl().to_f64().unwrap_or(0.0) + self.unrealized_pnl(date)?)
    }

    /// Portfolio value growth over net deposits.
    pub fn investment_pnl(&self, date: Option<NaiveDate>) -> Result<f64, EngineError> {
        Ok(self.get_value(date)? - self.net_deposits().to_f64().unwrap_or(0.0))
    }

    /// Fraction of sells that realized a profit.
    pub fn win_rate(&self) -> f64 {
        let sells: Vec<_> = self
            .transactions
            .iter()
            .filter(|t| t.kind == TxKind::Sell)
            .collect();
        if sells.is_empty() {
            return 0.0;
        }
        sells.iter().filter(|t| t.profit > Decimal::ZERO).count() as f64 / sells.len() as f64
    }

    /// Whether any asset in the ledger (or currently held) is crypto;
    /// drives calendar-vs-business-day indexing and annualization.
    pub(crate) fn touches_crypto(&self) -> bool {
        self.transactions.iter().any(|t| {
            t.asset
                .ticker()
                .and_then(|ticker| self.assets.get(ticker))
                .is_some_and(|a| a.meta.kind.is_crypto())
        }) || self
            .holdings
            .keys()
            .filter_map(|t| self.assets.get(t))
            .any(|a| a.meta.kind.is_crypto())
    }

    /// Snapshot for persistence: JSON-ready state plus the full log.
    pub fn save(&self) -> (PortfolioState, Vec<Transaction>) {
        let state = PortfolioState {
            holdings: self.holdings.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            cost_bases: self
                .cost_bases
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            assets: {
                let mut tickers: Vec<String> = self.assets.keys().cloned().collect();
                tickers.sort();
                tickers
            },
            cash: self.cash,
            r: self.r,
            currency: self.currency.clone(),
            next_id: self.next_id,
        };
        (state, self.transactions.clone())
    }

    /// Rebuild from a snapshot. `assets` must cover every ticker in the
    /// state (the loader fetches them from the store); FX series are
    /// needed for any asset not quoted in the reference currency.
    pub fn load(
        state: PortfolioState,
        transactions: Vec<Transaction>,
        assets: Vec<Asset>,
        market: Option<Asset>,
        fx: Vec<FxSeries>,
    ) -> Result<Self, EngineError> {
        let mut portfolio = Self::new(&state.currency, state.r);
        for series in fx {
            portfolio.add_fx(series);
        }
        for asset in assets {
            portfolio.register_asset(asset)?;
        }
        if let Some(market) = market {
            portfolio.set_market(market)?;
        }
        for ticker in &state.assets {
            if !portfolio.assets.contains_key(ticker) {
                return Err(EngineError::InvalidAsset(ticker.clone()));
            }
        }

        portfolio.cash = state.cash;
        portfolio.next_id = state.next_id;
        portfolio.holdings = state.holdings.into_iter().collect();
        portfolio.cost_bases = state.cost_bases.into_iter().collect();
        portfolio.transactions = transactions;
        portfolio.debug_check_invariants();
        Ok(portfolio)
    }

    /// The asset mix weights used to annualize: 252 per stock weight,
    /// 365 per crypto weight, 252 when nothing is held.
    pub fn ann_factor(&self) -> f64 {
        let Ok(weights) = self.weights(None) else {
            return 252.0;
        };
        if weights.is_empty() {
            return 252.0;
        }
        let crypto_weight: f64 = weights
            .iter()
            .filter(|(ticker, _)| {
                self.assets
                    .get(*ticker)
                    .is_some_and(|a| a.meta.kind == AssetKind::Crypto)
            })
            .map(|(_, w)| w)
            .sum();
        let stock_weight: f64 = 1.0 - crypto_weight;
        let factor = stock_weight * 252.0 + crypto_weight * 365.0;
        if factor > 0.0 { factor } else { 252.0 }
    }

    fn debug_check_invariants(&self) {
        #[cfg(debug_assertions)]
        {
            assert!(self.cash >= Decimal::ZERO - Decimal::new(1, 2), "cash went negative");
            assert_eq!(self.transactions.len() as u64, self.next_id);
            for (i, t) in self.transactions.iter().enumerate() {
                assert_eq!(t.id, i as u64, "transaction ids must be dense");
            }
            for (ticker, shares) in &self.holdings {
                assert!(*shares > 0.0, "non-positive holding for {ticker}");
                assert!(
                    self.cost_bases.contains_key(ticker) && self.assets.contains_key(ticker),
                    "holding {ticker} without cost basis or asset data"
                );
            }
        }
    }
}
