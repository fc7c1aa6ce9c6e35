use crate::config::DatabaseConfig;
use crate::models::regions::{self, REGIONS};
use crate::models::{IntervalRow, SHARED_COLUMNS};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const TABLE: &str = "electricity_prices";

// ── Store trait ───────────────────────────────────────────────────────────────

/// Read/write seam the pipeline drives.
#[async_trait]
pub trait PriceStore: Send {
    /// Distinct delivery dates already stored.
    async fn existing_dates(&mut self) -> Result<BTreeSet<NaiveDate>>;

    /// Insert all rows in one transaction. Empty input is a no-op.
    async fn insert_rows(&mut self, rows: &[IntervalRow]) -> Result<u64>;
}

// ── Repository ────────────────────────────────────────────────────────────────

/// Owns the single PostgreSQL connection for the whole run.
pub struct Repository {
    pool: PgPool,
}

impl Repository {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = single_connection()
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_with(config.connect_options())
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to {}@{}:{}/{}",
                    config.user, config.host, config.port, config.name
                )
            })?;
        info!("Connected to {}:{}/{}", config.host, config.port, config.name);
        Ok(Self { pool })
    }

    /// Pool that dials on first use only.
    #[cfg(test)]
    pub(crate) fn connect_lazy(options: sqlx::postgres::PgConnectOptions) -> Self {
        Self {
            pool: single_connection().connect_lazy_with(options),
        }
    }

    /// Second handle on the same pool, to observe it after `close` consumed `self`.
    #[cfg(test)]
    pub(crate) fn pool_handle(&self) -> PgPool {
        self.pool.clone()
    }

    /// Release the connection. Every exit path of a run ends here.
    pub async fn close(self) {
        self.pool.close().await;
        debug!("Database connection closed");
    }

    pub async fn row_count(&self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", TABLE);
        sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .context("Row count query failed")
    }

    pub async fn date_range(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
        let sql = format!("SELECT MIN(delivery_date), MAX(delivery_date) FROM {}", TABLE);
        sqlx::query_as(&sql)
            .fetch_one(&self.pool)
            .await
            .context("Date range query failed")
    }
}

fn single_connection() -> PgPoolOptions {
    PgPoolOptions::new().min_connections(0).max_connections(1)
}

#[async_trait]
impl PriceStore for Repository {
    async fn existing_dates(&mut self) -> Result<BTreeSet<NaiveDate>> {
        let sql = format!("SELECT DISTINCT delivery_date FROM {}", TABLE);
        let dates: Vec<NaiveDate> = sqlx::query_scalar(&sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to read stored delivery dates")?;
        Ok(dates.into_iter().collect())
    }

    async fn insert_rows(&mut self, rows: &[IntervalRow]) -> Result<u64> {
        let Some(first) = rows.first() else {
            info!("No entries to insert");
            return Ok(0);
        };
        let date = first.delivery_date;

        let mut query = insert_query(rows);
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        match query.build().execute(&mut *tx).await {
            Ok(result) => {
                tx.commit()
                    .await
                    .with_context(|| format!("Commit failed for {}", date))?;
                info!("Successfully inserted {} entries for {}", result.rows_affected(), date);
                Ok(result.rows_affected())
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!("Rollback failed for {}: {}", date, rb);
                }
                Err(e).with_context(|| format!("Error inserting data for {}", date))
            }
        }
    }
}

// ── SQL ───────────────────────────────────────────────────────────────────────

/// `delivery_date, …, end_time, EE_price, …, SE4_price`
pub fn column_list() -> String {
    let mut columns = Vec::with_capacity(IntervalRow::FIELD_COUNT);
    columns.extend(SHARED_COLUMNS.iter().map(|c| c.to_string()));
    columns.extend(REGIONS.iter().map(|r| regions::price_column(r)));
    columns.join(", ")
}

/// One multi-row INSERT covering every row.
fn insert_query(rows: &[IntervalRow]) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new(format!("INSERT INTO {} ({}) ", TABLE, column_list()));

    qb.push_values(rows, |mut b, row| {
        b.push_bind(row.delivery_date)
            .push_bind(row.updated_at)
            .push_bind(row.currency.as_deref())
            .push_bind(row.resolution)
            .push_bind(row.start_time)
            .push_bind(row.end_time);
        for price in row.prices {
            b.push_bind(price);
        }
    });

    qb
}
