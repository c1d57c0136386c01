mod common;

use common::daily_asset;
use chrono::NaiveDate;
use quantfolio::application::signals::divergence::{
    double_pattern_signals, find_double_patterns,
};
use quantfolio::application::signals::rsi::{rsi_crossover, RsiExit};
use quantfolio::application::strategy::{RsiStrategy, Strategy};
use quantfolio::domain::asset::Timeframe;
use quantfolio::AssetKind;

#[test]
fn rsi_reentry_shorts_on_the_cross_then_longs_after_oversold() {
    // Enters overbought, crosses back down, dips oversold, recovers.
    let rsi = [
        55.0, 62.0, 71.0, 76.0, 74.0, 66.0, 52.0, 40.0, 27.0, 25.0, 33.0, 45.0,
    ];
    let signal = rsi_crossover(&rsi, 70.0, 30.0, RsiExit::Reentry, None);

    // Long by default before any signal.
    assert!(signal.values()[..5].iter().all(|v| *v == 1.0));
    // First emitted signal: -1 at the cross down through 70.
    assert_eq!(signal.values()[5], -1.0);
    // Stays short through the oversold dip...
    assert!(signal.values()[6..10].iter().all(|v| *v == -1.0));
    // ...and flips long only after the cross up through 30.
    assert_eq!(signal.values()[10], 1.0);
    assert_eq!(signal.values()[11], 1.0);
}

#[test]
fn rsi_strategy_end_to_end_over_prices() {
    // Rally, crash, recovery drives RSI through both bounds.
    let mut closes = vec![100.0];
    for _ in 0..30 {
        closes.push(closes.last().unwrap() * 1.03);
    }
    for _ in 0..30 {
        closes.push(closes.last().unwrap() * 0.96);
    }
    for _ in 0..30 {
        closes.push(closes.last().unwrap() * 1.02);
    }
    let asset = daily_asset(
        "TEST",
        AssetKind::Equity,
        NaiveDate::from_ymd_opt(2022, 1, 3).unwrap(),
        &closes,
    );

    let strategy = RsiStrategy::new(asset);
    let signal = strategy.signal(Timeframe::Daily);
    let rsi = strategy.rsi(Timeframe::Daily);

    assert_eq!(signal.len(), rsi.len());
    assert!(signal.is_filled());

    let cross_down = (1..rsi.len())
        .find(|&i| rsi[i - 1] > 70.0 && rsi[i] < 70.0)
        .expect("the crash must cross down through 70");
    assert_eq!(signal.values()[cross_down], -1.0);

    let cross_up = (cross_down..rsi.len())
        .find(|&i| rsi[i - 1] < 30.0 && rsi[i] > 30.0)
        .expect("the recovery must cross up through 30");
    assert_eq!(signal.values()[cross_up], 1.0);
}

#[test]
fn macd_double_top_emits_one_short_at_the_second_peak() {
    // A histogram with exactly one double top: first peak higher,
    // valley strictly below the second peak, inside the max spacing.
    let mut hist = vec![0.05f64; 60];
    for (offset, scale) in [(0i64, 1.0), (1, 0.75), (2, 0.5), (3, 0.25)] {
        for (center, height) in [(20i64, 4.0), (35, 2.5)] {
            let left = (center - offset) as usize;
            let right = (center + offset) as usize;
            hist[left] = hist[left].max(height * scale);
            hist[right] = hist[right].max(height * scale);
        }
    }

    let (tops, bottoms) = find_double_patterns(&hist, 7, 25, 0.05);
    assert_eq!(bottoms.len(), 0);
    assert_eq!(tops.len(), 1);
    assert_eq!(tops[0], (20, 35));

    let signal = double_pattern_signals(hist.len(), &tops, &bottoms);
    // Exactly one flip from long to short, at the confirmation index.
    let flips: Vec<usize> = (1..signal.len())
        .filter(|&i| signal.values()[i] != signal.values()[i - 1])
        .collect();
    assert_eq!(flips, vec![35]);
    assert_eq!(signal.values()[35], -1.0);
}
