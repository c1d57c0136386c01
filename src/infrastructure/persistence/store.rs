use crate::application::portfolio::PortfolioState;
use crate::domain::asset::{AssetKind, AssetMeta};
use crate::domain::bars::Bar;
use crate::domain::transaction::{AssetRef, Transaction, TxKind};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::info;

/// Rows are committed in groups of this size so a mid-stream failure
/// never corrupts previously inserted batches.
const BATCH_SIZE: usize = 1000;

/// One row of the `tickers` table.
#[derive(Debug, Clone)]
pub struct TickerRow {
    pub ticker: String,
    pub comp_name: String,
    pub exchange: String,
    pub sector: Option<String>,
    pub market_cap: Option<f64>,
    pub start_date: NaiveDate,
    pub currency: String,
    pub asset_type: String,
    pub timezone: String,
}

impl TickerRow {
    pub fn meta(&self) -> AssetMeta {
        AssetMeta {
            ticker: self.ticker.clone(),
            name: self.comp_name.clone(),
            kind: AssetKind::from_provider_label(&self.asset_type),
            currency: self.currency.clone(),
            sector: self.sector.clone(),
            exchange: self.exchange.clone(),
            timezone: self.timezone.clone(),
        }
    }
}

/// Read/write surface of the market-data store.
#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn ticker_meta(&self, ticker: &str) -> Result<Option<TickerRow>>;
    async fn daily_bars(&self, ticker: &str) -> Result<Vec<Bar>>;
    async fn five_minute_bars(&self, ticker: &str) -> Result<Vec<Bar>>;
    /// Daily closes for a `"XXX/YYY"` pair.
    async fn forex_series(&self, pair: &str) -> Result<Vec<(NaiveDate, f64)>>;

    async fn insert_ticker(&self, row: &TickerRow) -> Result<()>;
    async fn insert_daily_bars(&self, ticker: &str, bars: &[Bar]) -> Result<usize>;
    async fn insert_five_minute_bars(&self, ticker: &str, bars: &[Bar]) -> Result<usize>;
    /// `(date, open, high, low, close)` rows for a forex pair.
    async fn insert_forex_rows(
        &self,
        pair: &str,
        rows: &[(NaiveDate, f64, f64, f64, f64)],
    ) -> Result<usize>;

    async fn distinct_values(&self, column: &str, table: &str) -> Result<Vec<String>>;
    async fn max_date(&self, table: &str, key_column: &str, key: &str) -> Result<Option<NaiveDate>>;
    async fn max_datetime(&self, ticker: &str) -> Result<Option<DateTime<Utc>>>;
    /// Drop five-minute bars beyond the provider's horizon.
    async fn delete_old_data(&self, horizon_days: i64) -> Result<u64>;

    async fn save_portfolio(
        &self,
        name: &str,
        state: &PortfolioState,
        transactions: &[Transaction],
    ) -> Result<()>;
    async fn load_portfolio(&self, name: &str)
        -> Result<Option<(PortfolioState, Vec<Transaction>)>>;
}

/// Postgres-backed market store.
#[derive(Clone)]
pub struct PgMarketStore {
    pool: PgPool,
}

impl PgMarketStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to Postgres market store")?;
        info!("Connected to market store");

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the schema if it does not exist yet.
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tickers (
                ticker TEXT PRIMARY KEY,
                comp_name TEXT NOT NULL,
                exchange TEXT NOT NULL,
                sector TEXT,
                market_cap DOUBLE PRECISION,
                start_date DATE NOT NULL,
                currency TEXT NOT NULL,
                asset_type TEXT NOT NULL,
                timezone TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create tickers table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily (
                ticker TEXT NOT NULL,
                date DATE NOT NULL,
                open DOUBLE PRECISION NOT NULL,
                high DOUBLE PRECISION NOT NULL,
                low DOUBLE PRECISION NOT NULL,
                close DOUBLE PRECISION NOT NULL,
                adj_close DOUBLE PRECISION NOT NULL,
                volume DOUBLE PRECISION NOT NULL,
                PRIMARY KEY (ticker, date),
                CHECK (high >= GREATEST(open, close)),
                CHECK (low <= LEAST(open, close))
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create daily table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS five_minute (
                ticker TEXT NOT NULL,
                date TIMESTAMPTZ NOT NULL,
                open DOUBLE PRECISION NOT NULL,
                high DOUBLE PRECISION NOT NULL,
                low DOUBLE PRECISION NOT NULL,
                close DOUBLE PRECISION NOT NULL,
                adj_close DOUBLE PRECISION NOT NULL,
                volume DOUBLE PRECISION NOT NULL,
                PRIMARY KEY (ticker, date),
                CHECK (high >= GREATEST(open, close)),
                CHECK (low <= LEAST(open, close))
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create five_minute table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_forex (
                currency_pair TEXT NOT NULL,
                date DATE NOT NULL,
                open DOUBLE PRECISION NOT NULL,
                high DOUBLE PRECISION NOT NULL,
                low DOUBLE PRECISION NOT NULL,
                close DOUBLE PRECISION NOT NULL,
                PRIMARY KEY (currency_pair, date)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create daily_forex table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS portfolio_states (
                name TEXT PRIMARY KEY,
                state JSONB NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create portfolio_states table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS portfolio_transactions (
                name TEXT NOT NULL,
                id BIGINT NOT NULL,
                type TEXT NOT NULL,
                asset TEXT NOT NULL,
                shares DOUBLE PRECISION NOT NULL,
                value NUMERIC NOT NULL,
                profit NUMERIC NOT NULL,
                date TIMESTAMP NOT NULL,
                PRIMARY KEY (name, id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create portfolio_transactions table")?;

        Ok(())
    }

    fn bar_from_daily_row(row: &sqlx::postgres::PgRow) -> Result<Bar> {
        let date: NaiveDate = row.try_get("date")?;
        Ok(Bar {
            ts: date
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| anyhow!("invalid date"))?
                .and_utc(),
            open: row.try_get("open")?,
            high: row.try_get("high")?,
            low: row.try_get("low")?,
            close: row.try_get("close")?,
            adj_close: row.try_get("adj_close")?,
            volume: row.try_get("volume")?,
        })
    }
}

#[async_trait]
impl MarketStore for PgMarketStore {
    async fn ticker_meta(&self, ticker: &str) -> Result<Option<TickerRow>> {
        let row = sqlx::query(
            "SELECT ticker, comp_name, exchange, sector, market_cap, start_date, currency, asset_type, timezone \
             FROM tickers WHERE ticker = $1",
        )
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query ticker metadata")?;

        row.map(|row| {
            Ok(TickerRow {
                ticker: row.try_get("ticker")?,
                comp_name: row.try_get("comp_name")?,
                exchange: row.try_get("exchange")?,
                sector: row.try_get("sector")?,
                market_cap: row.try_get("market_cap")?,
                start_date: row.try_get("start_date")?,
                currency: row.try_get("currency")?,
                asset_type: row.try_get("asset_type")?,
                timezone: row.try_get("timezone")?,
            })
        })
        .transpose()
    }

    async fn daily_bars(&self, ticker: &str) -> Result<Vec<Bar>> {
        let rows = sqlx::query(
            "SELECT date, open, high, low, close, adj_close, volume \
             FROM daily WHERE ticker = $1 ORDER BY date",
        )
        .bind(ticker)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query daily bars")?;

        rows.iter().map(Self::bar_from_daily_row).collect()
    }

    async fn five_minute_bars(&self, ticker: &str) -> Result<Vec<Bar>> {
        let rows = sqlx::query(
            "SELECT date, open, high, low, close, adj_close, volume \
             FROM five_minute WHERE ticker = $1 ORDER BY date",
        )
        .bind(ticker)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query five-minute bars")?;

        rows.iter()
            .map(|row| {
                Ok(Bar {
                    ts: row.try_get::<DateTime<Utc>, _>("date")?,
                    open: row.try_get("open")?,
                    high: row.try_get("high")?,
                    low: row.try_get("low")?,
                    close: row.try_get("close")?,
                    adj_close: row.try_get("adj_close")?,
                    volume: row.try_get("volume")?,
                })
            })
            .collect()
    }

    async fn forex_series(&self, pair: &str) -> Result<Vec<(NaiveDate, f64)>> {
        let rows = sqlx::query(
            "SELECT date, close FROM daily_forex WHERE currency_pair = $1 ORDER BY date",
        )
        .bind(pair)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query forex series")?;

        rows.iter()
            .map(|row| Ok((row.try_get("date")?, row.try_get("close")?)))
            .collect()
    }

    async fn insert_ticker(&self, row: &TickerRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO tickers (ticker, comp_name, exchange, sector, market_cap, start_date, currency, asset_type, timezone) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) ON CONFLICT (ticker) DO NOTHING",
        )
        .bind(&row.ticker)
        .bind(&row.comp_name)
        .bind(&row.exchange)
        .bind(&row.sector)
        .bind(row.market_cap)
        .bind(row.start_date)
        .bind(&row.currency)
        .bind(&row.asset_type)
        .bind(&row.timezone)
        .execute(&self.pool)
        .await
        .context("Failed to insert ticker metadata")?;
        Ok(())
    }

    async fn insert_daily_bars(&self, ticker: &str, bars: &[Bar]) -> Result<usize> {
        let mut inserted = 0;
        for batch in bars.chunks(BATCH_SIZE) {
            let mut tx = self.pool.begin().await?;
            for bar in batch {
                sqlx::query(
                    "INSERT INTO daily (ticker, date, open, high, low, close, adj_close, volume) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8) ON CONFLICT (ticker, date) DO NOTHING",
                )
                .bind(ticker)
                .bind(bar.ts.date_naive())
                .bind(bar.open)
                .bind(bar.high)
                .bind(bar.low)
                .bind(bar.close)
                .bind(bar.adj_close)
                .bind(bar.volume)
                .execute(&mut *tx)
                .await
                .context("Failed to insert daily bar")?;
                inserted += 1;
            }
            tx.commit().await.context("Failed to commit daily batch")?;
        }
        info!(ticker, inserted, "daily bars inserted");
        Ok(inserted)
    }

    async fn insert_five_minute_bars(&self, ticker: &str, bars: &[Bar]) -> Result<usize> {
        let mut inserted = 0;
        for batch in bars.chunks(BATCH_SIZE) {
            let mut tx = self.pool.begin().await?;
            for bar in batch {
                sqlx::query(
                    "INSERT INTO five_minute (ticker, date, open, high, low, close, adj_close, volume) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8) ON CONFLICT (ticker, date) DO NOTHING",
                )
                .bind(ticker)
                .bind(bar.ts)
                .bind(bar.open)
                .bind(bar.high)
                .bind(bar.low)
                .bind(bar.close)
                .bind(bar.adj_close)
                .bind(bar.volume)
                .execute(&mut *tx)
                .await
                .context("Failed to insert five-minute bar")?;
                inserted += 1;
            }
            tx.commit()
                .await
                .context("Failed to commit five-minute batch")?;
        }
        info!(ticker, inserted, "five-minute bars inserted");
        Ok(inserted)
    }

    async fn insert_forex_rows(
        &self,
        pair: &str,
        rows: &[(NaiveDate, f64, f64, f64, f64)],
    ) -> Result<usize> {
        let mut inserted = 0;
        for batch in rows.chunks(BATCH_SIZE) {
            let mut tx = self.pool.begin().await?;
            for (date, open, high, low, close) in batch {
                sqlx::query(
                    "INSERT INTO daily_forex (currency_pair, date, open, high, low, close) \
                     VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (currency_pair, date) DO NOTHING",
                )
                .bind(pair)
                .bind(date)
                .bind(open)
                .bind(high)
                .bind(low)
                .bind(close)
                .execute(&mut *tx)
                .await
                .context("Failed to insert forex row")?;
                inserted += 1;
            }
            tx.commit().await.context("Failed to commit forex batch")?;
        }
        Ok(inserted)
    }

    async fn distinct_values(&self, column: &str, table: &str) -> Result<Vec<String>> {
        // Identifiers cannot be bound; only known combinations pass.
        let allowed = [
            ("currency_pair", "daily_forex"),
            ("exchange", "tickers"),
            ("currency", "tickers"),
            ("ticker", "tickers"),
        ];
        if !allowed.contains(&(column, table)) {
            return Err(anyhow!("distinct_values: unsupported {table}.{column}"));
        }
        let rows = sqlx::query(&format!("SELECT DISTINCT {column} FROM {table}"))
            .fetch_all(&self.pool)
            .await
            .context("Failed to query distinct values")?;
        rows.iter().map(|row| Ok(row.try_get(0)?)).collect()
    }

    async fn max_date(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
    ) -> Result<Option<NaiveDate>> {
        let allowed = [("daily", "ticker"), ("daily_forex", "currency_pair")];
        if !allowed.contains(&(table, key_column)) {
            return Err(anyhow!("max_date: unsupported {table}.{key_column}"));
        }
        let row = sqlx::query(&format!(
            "SELECT MAX(date) AS max_date FROM {table} WHERE {key_column} = $1"
        ))
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .context("Failed to query max date")?;
        Ok(row.try_get("max_date")?)
    }

    async fn max_datetime(&self, ticker: &str) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT MAX(date) AS max_date FROM five_minute WHERE ticker = $1")
            .bind(ticker)
            .fetch_one(&self.pool)
            .await
            .context("Failed to query max datetime")?;
        Ok(row.try_get("max_date")?)
    }

    async fn delete_old_data(&self, horizon_days: i64) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(horizon_days);
        let result = sqlx::query("DELETE FROM five_minute WHERE date < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("Failed to delete stale five-minute bars")?;
        info!(rows = result.rows_affected(), "stale five-minute bars removed");
        Ok(result.rows_affected())
    }

    async fn save_portfolio(
        &self,
        name: &str,
        state: &PortfolioState,
        transactions: &[Transaction],
    ) -> Result<()> {
        let state_json = serde_json::to_value(state).context("Failed to serialize state")?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO portfolio_states (name, state) VALUES ($1, $2) \
             ON CONFLICT (name) DO UPDATE SET state = EXCLUDED.state",
        )
        .bind(name)
        .bind(state_json)
        .execute(&mut *tx)
        .await
        .context("Failed to upsert portfolio state")?;

        for t in transactions {
            sqlx::query(
                "INSERT INTO portfolio_transactions (name, id, type, asset, shares, value, profit, date) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) ON CONFLICT (name, id) DO NOTHING",
            )
            .bind(name)
            .bind(t.id as i64)
            .bind(t.kind.as_str())
            .bind(t.asset.as_column())
            .bind(t.shares)
            .bind(t.value)
            .bind(t.profit)
            .bind(t.date)
            .execute(&mut *tx)
            .await
            .context("Failed to insert portfolio transaction")?;
        }
        tx.commit().await.context("Failed to commit portfolio save")?;
        Ok(())
    }

    async fn load_portfolio(
        &self,
        name: &str,
    ) -> Result<Option<(PortfolioState, Vec<Transaction>)>> {
        let state_row = sqlx::query("SELECT state FROM portfolio_states WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query portfolio state")?;
        let Some(state_row) = state_row else {
            return Ok(None);
        };
        let state: PortfolioState =
            serde_json::from_value(state_row.try_get::<serde_json::Value, _>("state")?)
                .context("Failed to parse portfolio state")?;

        let rows = sqlx::query(
            "SELECT id, type, asset, shares, value, profit, date \
             FROM portfolio_transactions WHERE name = $1 ORDER BY id",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query portfolio transactions")?;

        let transactions = rows
            .iter()
            .map(|row| {
                let kind_label: String = row.try_get("type")?;
                let kind = TxKind::from_str(&kind_label)
                    .ok_or_else(|| anyhow!("unknown transaction type {kind_label}"))?;
                let asset: String = row.try_get("asset")?;
                Ok(Transaction {
                    kind,
                    asset: AssetRef::from_column(&asset),
                    shares: row.try_get("shares")?,
                    value: row.try_get::<Decimal, _>("value")?,
                    profit: row.try_get::<Decimal, _>("profit")?,
                    date: row.try_get("date")?,
                    id: row.try_get::<i64, _>("id")? as u64,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some((state, transactions)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_row_maps_to_asset_meta() {
        let row = TickerRow {
            ticker: "BTC-USD".to_string(),
            comp_name: "Bitcoin USD".to_string(),
            exchange: "CCC".to_string(),
            sector: Some("Cryptocurrency".to_string()),
            market_cap: None,
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            currency: "USD".to_string(),
            asset_type: "CRYPTOCURRENCY".to_string(),
            timezone: "UTC".to_string(),
        };
        let meta = row.meta();
        assert_eq!(meta.kind, AssetKind::Crypto);
        assert_eq!(meta.currency, "USD");
        assert_eq!(meta.sector.as_deref(), Some("Cryptocurrency"));
    }
}
