mod common;

use common::seeded_portfolio;
use chrono::NaiveDate;
use quantfolio::domain::transaction::TxKind;
use quantfolio::infrastructure::importers::{apply_statement, trading212};
use rust_decimal_macros::dec;

const STATEMENT: &str = "\
Action,Time,Ticker,No. of shares,Currency (Price / share),Total
Deposit,2023-01-03 09:15:02,,,,5000.00
Market buy,2023-01-04 14:30:00,AAPL,10.0,USD,1000.00
Market buy,2023-01-05 10:00:00,MSFT,8.0,USD,400.00
Market sell,2023-02-01 11:00:00,AAPL,4.0,USD,400.00
";

#[test]
fn imported_csv_reproduces_every_row_in_the_ledger() {
    let entries = trading212::parse_statement(STATEMENT.as_bytes()).unwrap();
    assert_eq!(entries.len(), 4);

    let mut portfolio = seeded_portfolio();
    let transactions = apply_statement(&mut portfolio, &entries).unwrap();
    assert_eq!(transactions.len(), entries.len());

    // Each statement row maps onto one typed transaction with the same
    // date and value.
    let expected = [
        (TxKind::Deposit, None, dec!(5000.00), (2023, 1, 3)),
        (TxKind::Buy, Some("AAPL"), dec!(1000.00), (2023, 1, 4)),
        (TxKind::Buy, Some("MSFT"), dec!(400.00), (2023, 1, 5)),
        (TxKind::Sell, Some("AAPL"), dec!(400.00), (2023, 2, 1)),
    ];
    for (t, (kind, ticker, value, (y, m, d))) in transactions.iter().zip(expected) {
        assert_eq!(t.kind, kind);
        assert_eq!(t.asset.ticker(), ticker);
        assert_eq!(t.value, value);
        assert_eq!(t.date.date(), NaiveDate::from_ymd_opt(y, m, d).unwrap());
    }

    // And the ledger state reflects the replay.
    assert_eq!(portfolio.cash(), dec!(4000.00));
    assert!((portfolio.holdings()["AAPL"] - 6.0).abs() < 1e-9);
    assert!((portfolio.holdings()["MSFT"] - 8.0).abs() < 1e-9);
    assert_eq!(portfolio.transactions().len(), 4);
}
