pub mod store;

pub use store::{MarketStore, PgMarketStore, TickerRow};
