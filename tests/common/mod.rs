use chrono::{Days, NaiveDate, NaiveDateTime};
use quantfolio::domain::bars::daily_bar;
use quantfolio::{Asset, AssetKind, AssetMeta, BarSeries, Portfolio};

pub fn meta(ticker: &str, kind: AssetKind) -> AssetMeta {
    AssetMeta {
        ticker: ticker.to_string(),
        name: ticker.to_string(),
        kind,
        currency: "USD".to_string(),
        sector: None,
        exchange: "NYSE".to_string(),
        timezone: "America/New_York".to_string(),
    }
}

/// Daily asset over consecutive calendar days with the given closes.
pub fn daily_asset(ticker: &str, kind: AssetKind, start: NaiveDate, closes: &[f64]) -> Asset {
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| daily_bar(start + Days::new(i as u64), c, c, c, c, 1000.0))
        .collect();
    Asset::daily_only(meta(ticker, kind), BarSeries::from_bars(bars))
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// USD portfolio holding data for AAPL (100 then 120 halfway) and a
/// flat MSFT, plus a flat SPY reference market.
pub fn seeded_portfolio() -> Portfolio {
    quantfolio::config::init_tracing();
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let mut aapl = vec![100.0; 120];
    aapl.extend(vec![120.0; 120]);

    let mut portfolio = Portfolio::new("USD", 0.02);
    portfolio
        .register_asset(daily_asset("AAPL", AssetKind::Equity, start, &aapl))
        .unwrap();
    portfolio
        .register_asset(daily_asset("MSFT", AssetKind::Equity, start, &vec![50.0; 240]))
        .unwrap();
    portfolio
        .set_market(daily_asset("SPY", AssetKind::Etf, start, &vec![400.0; 240]))
        .unwrap();
    portfolio
}
