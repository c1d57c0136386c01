use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by ledger, analytics and strategy operations.
///
/// Every failed mutation leaves the portfolio state unchanged.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Insufficient funds: need {need}, available {available}")]
    InsufficientFunds { need: Decimal, available: Decimal },

    #[error("Not enough shares of {ticker}: want {want}, held {held}")]
    NotEnoughShares { ticker: String, want: f64, held: f64 },

    #[error("Invalid asset: {0}")]
    InvalidAsset(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Missing data: {what} at {date}")]
    MissingData { what: String, date: NaiveDate },

    #[error("External failure: {0}")]
    ExternalFailure(#[from] anyhow::Error),
}
