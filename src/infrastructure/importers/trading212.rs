use crate::infrastructure::importers::{StatementAction, StatementEntry};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::io::Read;
use tracing::warn;

/// Raw CSV row as Trading 212 exports it.
#[derive(Debug, Deserialize)]
struct Row {
    #[serde(rename = "Action")]
    action: String,
    #[serde(rename = "Time")]
    time: String,
    #[serde(rename = "Ticker")]
    ticker: Option<String>,
    #[serde(rename = "No. of shares")]
    shares: Option<f64>,
    #[serde(rename = "Currency (Price / share)")]
    currency: Option<String>,
    #[serde(rename = "Total")]
    total: Option<f64>,
}

/// Explicit mapping of the documented Trading 212 action labels.
fn parse_action(label: &str) -> Option<StatementAction> {
    match label {
        "Deposit" => Some(StatementAction::Deposit),
        "Withdrawal" => Some(StatementAction::Withdraw),
        "Market buy" | "Limit buy" | "Stop buy" => Some(StatementAction::Buy),
        "Market sell" | "Limit sell" | "Stop sell" => Some(StatementAction::Sell),
        _ => None,
    }
}

/// Parse a Trading 212 CSV statement into typed entries.
///
/// GBX-quoted rows are treated as GBP, and LSE tickers (anything
/// quoted in GBP) get their `.L` suffix. Unknown action labels are
/// skipped with a warning.
pub fn parse_statement<R: Read>(reader: R) -> Result<Vec<StatementEntry>> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut entries = Vec::new();

    for record in csv_reader.deserialize::<Row>() {
        let row = record.context("Malformed trading212 row")?;

        let Some(action) = parse_action(&row.action) else {
            warn!(action = %row.action, "skipping unknown trading212 action");
            continue;
        };

        let date = NaiveDate::parse_from_str(&row.time[..10.min(row.time.len())], "%Y-%m-%d")
            .with_context(|| format!("Bad trading212 timestamp: {}", row.time))?;

        let currency = row.currency.as_deref().map(|c| match c {
            "GBX" => "GBP",
            other => other,
        });
        let ticker = row.ticker.map(|t| {
            if currency == Some("GBP") && !t.ends_with(".L") {
                format!("{t}.L")
            } else {
                t
            }
        });

        entries.push(StatementEntry {
            action,
            ticker,
            shares: row.shares,
            value: row.total.unwrap_or(0.0),
            date,
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Action,Time,Ticker,No. of shares,Currency (Price / share),Total
Deposit,2023-01-03 09:15:02,,,,1000.00
Market buy,2023-01-04 14:30:00,AAPL,5.0,USD,650.00
Market buy,2023-01-05 10:00:00,HSBA,100.0,GBX,520.00
Limit sell,2023-02-01 11:00:00,AAPL,2.0,USD,270.00
Interest on cash,2023-02-02 00:00:00,,,,0.42
";

    #[test]
    fn parses_known_actions_and_skips_the_rest() {
        let entries = parse_statement(SAMPLE.as_bytes()).unwrap();
        assert_eq!(entries.len(), 4); // interest row skipped

        assert_eq!(entries[0].action, StatementAction::Deposit);
        assert_eq!(entries[0].value, 1000.0);
        assert_eq!(
            entries[0].date,
            NaiveDate::from_ymd_opt(2023, 1, 3).unwrap()
        );

        assert_eq!(entries[1].action, StatementAction::Buy);
        assert_eq!(entries[1].ticker.as_deref(), Some("AAPL"));
        assert_eq!(entries[1].shares, Some(5.0));

        assert_eq!(entries[3].action, StatementAction::Sell);
        assert_eq!(entries[3].value, 270.0);
    }

    #[test]
    fn gbx_rows_become_gbp_with_lse_suffix() {
        let entries = parse_statement(SAMPLE.as_bytes()).unwrap();
        let hsba = &entries[2];
        assert_eq!(hsba.ticker.as_deref(), Some("HSBA.L"));
    }

    #[test]
    fn truncates_timestamps_to_the_day() {
        let entries = parse_statement(SAMPLE.as_bytes()).unwrap();
        assert_eq!(
            entries[1].date,
            NaiveDate::from_ymd_opt(2023, 1, 4).unwrap()
        );
    }
}
