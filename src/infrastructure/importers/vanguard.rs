use crate::infrastructure::importers::{StatementAction, StatementEntry};
use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook_auto, Data, DataType, Range, Reader};
use chrono::NaiveDate;
use std::path::Path;
use tracing::warn;

/// Fund names as they appear on the statement, mapped to tickers.
const FUND_TICKERS: &[(&str, &str)] = &[
    ("LifeStrategy 100% Equity Fund - Accumulation", "0P0000TKZO.L"),
    ("LifeStrategy 80% Equity Fund - Accumulation", "0P0000TKZP.L"),
    ("LifeStrategy 60% Equity Fund - Accumulation", "0P0000TKZQ.L"),
];

/// Parse a Vanguard ISA statement workbook: the "Cash Transactions"
/// section yields deposits and withdrawals, "Investment Transactions"
/// yields buys and sells (negative quantities are sells). Output is
/// sorted by date.
pub fn parse_statement(path: &Path) -> Result<Vec<StatementEntry>> {
    let mut workbook = open_workbook_auto(path).context("Failed to open vanguard workbook")?;
    let range = workbook
        .worksheet_range_at(1)
        .ok_or_else(|| anyhow!("vanguard workbook has no second sheet"))?
        .context("Failed to read vanguard sheet")?;

    let mut entries = parse_cash_section(&range)?;
    entries.extend(parse_investment_section(&range)?);
    entries.sort_by_key(|e| e.date);
    Ok(entries)
}

fn cell_string(range: &Range<Data>, row: usize, col: usize) -> Option<String> {
    range
        .get((row, col))
        .and_then(|c| c.get_string())
        .map(|s| s.trim().to_string())
}

fn cell_number(range: &Range<Data>, row: usize, col: usize) -> Option<f64> {
    range.get((row, col)).and_then(|c| c.as_f64())
}

fn cell_date(range: &Range<Data>, row: usize, col: usize) -> Option<NaiveDate> {
    let cell = range.get((row, col))?;
    if let Some(dt) = cell.as_datetime() {
        return Some(dt.date());
    }
    let text = cell.get_string()?;
    NaiveDate::parse_from_str(&text[..10.min(text.len())], "%Y-%m-%d").ok()
}

/// Row index of the first cell in column 0 equal to `marker`, starting
/// at `from`.
fn find_marker(range: &Range<Data>, marker: &str, from: usize) -> Option<usize> {
    (from..range.height()).find(|&row| cell_string(range, row, 0).as_deref() == Some(marker))
}

/// Column indices of the named headers in `header_row`.
fn header_columns(
    range: &Range<Data>,
    header_row: usize,
    names: &[&str],
) -> Result<Vec<usize>> {
    names
        .iter()
        .map(|name| {
            (0..range.width())
                .find(|&col| cell_string(range, header_row, col).as_deref() == Some(*name))
                .ok_or_else(|| anyhow!("vanguard sheet is missing the {name} column"))
        })
        .collect()
}

fn parse_cash_section(range: &Range<Data>) -> Result<Vec<StatementEntry>> {
    let start = find_marker(range, "Cash Transactions", 0)
        .ok_or_else(|| anyhow!("no Cash Transactions section"))?;
    let end = find_marker(range, "Balance", start)
        .ok_or_else(|| anyhow!("no Balance row closing the cash section"))?;

    let header_row = start + 2;
    let columns = header_columns(range, header_row, &["Date", "Details", "Amount"])?;
    let (date_col, details_col, amount_col) = (columns[0], columns[1], columns[2]);

    let mut entries = Vec::new();
    for row in header_row + 1..end {
        let Some(details) = cell_string(range, row, details_col) else {
            continue;
        };
        let action = if details.contains("Deposit") {
            StatementAction::Deposit
        } else if details.contains("Withdrawal") {
            StatementAction::Withdraw
        } else {
            continue;
        };
        let Some(date) = cell_date(range, row, date_col) else {
            continue;
        };
        let Some(amount) = cell_number(range, row, amount_col) else {
            continue;
        };
        entries.push(StatementEntry {
            action,
            ticker: None,
            shares: None,
            value: amount.abs(),
            date,
        });
    }
    Ok(entries)
}

fn parse_investment_section(range: &Range<Data>) -> Result<Vec<StatementEntry>> {
    let start = find_marker(range, "Investment Transactions", 0)
        .ok_or_else(|| anyhow!("no Investment Transactions section"))?;

    let header_row = start + 2;
    let columns = header_columns(
        range,
        header_row,
        &["Date", "InvestmentName", "Quantity", "Cost"],
    )?;
    let (date_col, name_col, qty_col, cost_col) = (columns[0], columns[1], columns[2], columns[3]);

    let mut entries = Vec::new();
    for row in header_row + 1..range.height() {
        let Some(name) = cell_string(range, row, name_col) else {
            continue;
        };
        let Some(ticker) = FUND_TICKERS
            .iter()
            .find(|(fund, _)| *fund == name)
            .map(|(_, t)| t.to_string())
        else {
            warn!(fund = %name, "no ticker mapping for vanguard fund");
            continue;
        };
        let (Some(date), Some(quantity), Some(cost)) = (
            cell_date(range, row, date_col),
            cell_number(range, row, qty_col),
            cell_number(range, row, cost_col),
        ) else {
            continue;
        };

        let action = if quantity < 0.0 {
            StatementAction::Sell
        } else {
            StatementAction::Buy
        };
        entries.push(StatementEntry {
            action,
            ticker: Some(ticker),
            shares: Some(quantity.abs()),
            value: cost.abs(),
            date,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(rows: Vec<Vec<Data>>) -> Range<Data> {
        let height = rows.len() as u32;
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0) as u32;
        let mut range = Range::new((0, 0), (height - 1, width - 1));
        for (i, row) in rows.into_iter().enumerate() {
            for (j, cell) in row.into_iter().enumerate() {
                range.set_value((i as u32, j as u32), cell);
            }
        }
        range
    }

    fn s(text: &str) -> Data {
        Data::String(text.to_string())
    }

    fn n(value: f64) -> Data {
        Data::Float(value)
    }

    fn sample_sheet() -> Range<Data> {
        sheet(vec![
            vec![s("Cash Transactions")],
            vec![],
            vec![s(""), s("Date"), s("Details"), s("Amount")],
            vec![s(""), s("2023-01-03"), s("Deposit via debit card"), n(1000.0)],
            vec![s(""), s("2023-03-01"), s("Withdrawal to bank"), n(-200.0)],
            vec![s(""), s("2023-03-02"), s("Management fee"), n(-1.50)],
            vec![s("Balance")],
            vec![],
            vec![s("Investment Transactions")],
            vec![],
            vec![s(""), s("Date"), s("InvestmentName"), s("Quantity"), s("Cost")],
            vec![
                s(""),
                s("2023-01-05"),
                s("LifeStrategy 100% Equity Fund - Accumulation"),
                n(3.5),
                n(800.0),
            ],
            vec![
                s(""),
                s("2023-02-10"),
                s("LifeStrategy 100% Equity Fund - Accumulation"),
                n(-1.5),
                n(-360.0),
            ],
            vec![
                s(""),
                s("2023-02-11"),
                s("Some Unmapped Fund"),
                n(1.0),
                n(100.0),
            ],
        ])
    }

    #[test]
    fn cash_section_maps_deposits_and_withdrawals() {
        let entries = parse_cash_section(&sample_sheet()).unwrap();
        assert_eq!(entries.len(), 2); // the fee row is ignored
        assert_eq!(entries[0].action, StatementAction::Deposit);
        assert_eq!(entries[0].value, 1000.0);
        assert_eq!(entries[1].action, StatementAction::Withdraw);
        assert_eq!(entries[1].value, 200.0);
    }

    #[test]
    fn negative_quantities_are_sells() {
        let entries = parse_investment_section(&sample_sheet()).unwrap();
        assert_eq!(entries.len(), 2); // unmapped fund skipped
        assert_eq!(entries[0].action, StatementAction::Buy);
        assert_eq!(entries[0].shares, Some(3.5));
        assert_eq!(entries[1].action, StatementAction::Sell);
        assert_eq!(entries[1].shares, Some(1.5));
        assert_eq!(entries[1].value, 360.0);
        assert_eq!(entries[1].ticker.as_deref(), Some("0P0000TKZO.L"));
    }

    #[test]
    fn sections_combine_sorted_by_date() {
        let range = sample_sheet();
        let mut entries = parse_cash_section(&range).unwrap();
        entries.extend(parse_investment_section(&range).unwrap());
        entries.sort_by_key(|e| e.date);

        let dates: Vec<NaiveDate> = entries.iter().map(|e| e.date).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
        assert_eq!(entries.first().unwrap().action, StatementAction::Deposit);
    }
}
