mod common;

use common::{date, daily_asset};
use chrono::NaiveDate;
use quantfolio::application::optimization::MeanVarianceOptimizer;
use quantfolio::application::portfolio::TradeAmount;
use quantfolio::{AssetKind, Portfolio};

/// Two alternating-return assets with different volatilities and the
/// same mean return, uncorrelated by phase shift.
fn volatile_portfolio() -> Portfolio {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let n = 200;

    // Asset A: ±2% alternating. Asset B: ±1% with a two-day period so
    // the pairwise correlation stays near zero.
    let mut a = vec![100.0];
    let mut b = vec![100.0];
    for i in 0..n {
        let ra = if i % 2 == 0 { 0.02 } else { -0.0196078431372549 };
        let rb = match i % 4 {
            0 | 1 => 0.01,
            _ => -0.00990099009900990,
        };
        a.push(a.last().unwrap() * (1.0 + ra));
        b.push(b.last().unwrap() * (1.0 + rb));
    }

    let mut portfolio = Portfolio::new("USD", 0.02);
    portfolio
        .register_asset(daily_asset("VOLA", AssetKind::Equity, start, &a))
        .unwrap();
    portfolio
        .register_asset(daily_asset("CALM", AssetKind::Equity, start, &b))
        .unwrap();
    portfolio
        .deposit(10_000.0, None, Some(date(2023, 1, 3)))
        .unwrap();
    portfolio
        .buy("VOLA", TradeAmount::Value(4_000.0), Some(date(2023, 1, 3)), None)
        .unwrap();
    portfolio
        .buy("CALM", TradeAmount::Value(4_000.0), Some(date(2023, 1, 3)), None)
        .unwrap();
    portfolio
}

#[test]
fn optimizer_builds_from_held_assets() {
    let portfolio = volatile_portfolio();
    let optimizer = MeanVarianceOptimizer::from_portfolio(&portfolio, 0.0, 1.0).unwrap();
    let mut tickers = optimizer.tickers().to_vec();
    tickers.sort();
    assert_eq!(tickers, vec!["CALM".to_string(), "VOLA".to_string()]);
}

#[test]
fn min_variance_tilts_toward_the_calm_asset() {
    let portfolio = volatile_portfolio();
    let optimizer = MeanVarianceOptimizer::from_portfolio(&portfolio, 0.0, 1.0).unwrap();
    let point = optimizer.min_variance_portfolio(Some(17));

    let weights: std::collections::HashMap<_, _> = point.weights.iter().cloned().collect();
    assert!(
        weights["CALM"] > weights["VOLA"],
        "low-vol asset should dominate the minimum-variance portfolio"
    );
    let total: f64 = point.weights.iter().map(|(_, w)| w).sum();
    assert!((total - 1.0).abs() < 1e-6);
}

#[test]
fn frontier_spans_sorted_returns_with_interior_sharpe_peak() {
    // Controlled inputs mirroring the two-uncorrelated-assets case:
    // equal returns, variances 0.04 and 0.01.
    let optimizer = MeanVarianceOptimizer::new(
        vec!["A".to_string(), "B".to_string()],
        vec![0.10, 0.10],
        vec![vec![0.04, 0.0], vec![0.0, 0.01]],
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

    // Inverse-variance minimum-variance point: (0.2, 0.8).
    let min_var = frontier
        .iter()
        .min_by(|a, b| a.vol.partial_cmp(&b.vol).unwrap())
        .unwrap();
    let weights: std::collections::HashMap<_, _> = min_var.weights.iter().cloned().collect();
    assert!((weights["A"] - 0.2).abs() < 0.02);
    assert!((weights["B"] - 0.8).abs() < 0.02);

    // With equal expected returns the best Sharpe sits at that same
    // interior point, not at a corner.
    let sharpe = optimizer.optimal_sharpe_portfolio(Some(3));
    for (_, w) in &sharpe.weights {
        assert!(*w > 0.05 && *w < 0.95);
    }
    assert!(sharpe.sharpe >= min_var.sharpe - 1e-6);
}

#[test]
fn box_constraints_bind_the_whole_frontier() {
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
        0.6,
    )
    .unwrap();

    let frontier = optimizer.efficient_frontier(7, Some(9)).unwrap();
    for point in &frontier {
        let total: f64 = point.weights.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-6);
        for (_, w) in &point.weights {
            assert!(*w >= 0.1 - 1e-6 && *w <= 0.6 + 1e-6);
        }
    }
}
