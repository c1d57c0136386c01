pub mod trading212;
pub mod vanguard;

use crate::application::portfolio::{Portfolio, TradeAmount};
use crate::domain::errors::EngineError;
use crate::domain::transaction::Transaction;
use chrono::NaiveDate;

/// One typed row parsed out of a broker statement.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementEntry {
    pub action: StatementAction,
    pub ticker: Option<String>,
    pub shares: Option<f64>,
    /// Signed positive; the action carries the direction.
    pub value: f64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementAction {
    Deposit,
    Withdraw,
    Buy,
    Sell,
}

/// Replay statement entries through the ledger. Every traded ticker
/// must already be registered on the portfolio (the hosting layer
/// loads them from the statement's ticker set first). Returns the
/// transactions appended by this statement.
pub fn apply_statement(
    portfolio: &mut Portfolio,
    entries: &[StatementEntry],
) -> Result<Vec<Transaction>, EngineError> {
    let before = portfolio.transactions().len();
    for entry in entries {
        let date = entry.date.and_hms_opt(0, 0, 0);
        match entry.action {
            StatementAction::Deposit => {
                portfolio.deposit(entry.value, None, date)?;
            }
            StatementAction::Withdraw => {
                portfolio.withdraw(entry.value, None, date)?;
            }
            StatementAction::Buy | StatementAction::Sell => {
                let ticker = entry.ticker.as_deref().ok_or_else(|| {
                    EngineError::InvalidAsset("statement trade without ticker".to_string())
                })?;
                let amount = match entry.shares {
                    Some(shares) => TradeAmount::Exact {
                        shares,
                        value: entry.value,
                    },
                    None => TradeAmount::Value(entry.value),
                };
                if entry.action == StatementAction::Buy {
                    portfolio.buy(ticker, amount, date, None)?;
                } else {
                    portfolio.sell(ticker, amount, date, None)?;
                }
            }
        }
    }
    Ok(portfolio.transactions()[before..].to_vec())
}
