pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::Config;
pub use domain::asset::{Asset, AssetKind, AssetMeta, Timeframe};
pub use domain::bars::{Bar, BarSeries, ResamplePeriod};
pub use domain::errors::EngineError;
pub use domain::fx::FxSeries;
pub use domain::transaction::{AssetRef, Transaction, TxKind};

pub use application::portfolio::{Portfolio, TradeAmount};
pub use application::signals::SignalSeries;
pub use application::strategy::{BacktestResult, Strategy};
