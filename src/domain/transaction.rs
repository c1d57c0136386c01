use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TxKind {
    Deposit,
    Withdraw,
    Buy,
    Sell,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Deposit => "DEPOSIT",
            TxKind::Withdraw => "WITHDRAW",
            TxKind::Buy => "BUY",
            TxKind::Sell => "SELL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "DEPOSIT" => Some(TxKind::Deposit),
            "WITHDRAW" => Some(TxKind::Withdraw),
            "BUY" => Some(TxKind::Buy),
            "SELL" => Some(TxKind::Sell),
            _ => None,
        }
    }

    pub fn is_trade(&self) -> bool {
        matches!(self, TxKind::Buy | TxKind::Sell)
    }
}

/// What a transaction is anchored to: a held asset, or the cash
/// sentinel for deposits and withdrawals.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AssetRef {
    Ticker(String),
    Cash,
}

impl AssetRef {
    /// The value stored in the `asset` column: ticker, or `"Cash"`.
    pub fn as_column(&self) -> &str {
        match self {
            AssetRef::Ticker(t) => t.as_str(),
            AssetRef::Cash => "Cash",
        }
    }

    pub fn from_column(s: &str) -> Self {
        if s == "Cash" {
            AssetRef::Cash
        } else {
            AssetRef::Ticker(s.to_string())
        }
    }

    pub fn ticker(&self) -> Option<&str> {
        match self {
            AssetRef::Ticker(t) => Some(t),
            AssetRef::Cash => None,
        }
    }
}

impl Serialize for AssetRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_column())
    }
}

impl<'de> Deserialize<'de> for AssetRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(AssetRef::from_column(&s))
    }
}

/// An immutable ledger record. `id` is dense and strictly increasing
/// within a portfolio and is the sole total order; `date` may run
/// backwards because of back-dated statement imports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub kind: TxKind,
    pub asset: AssetRef,
    /// 0 for cash moves; rounded to 5 decimals for trades.
    pub shares: f64,
    /// Always in the portfolio reference currency, rounded to 2 decimals.
    pub value: Decimal,
    /// 0 except for sells: value minus cost basis of the sold shares.
    pub profit: Decimal,
    pub date: chrono::NaiveDateTime,
    pub id: u64,
}
