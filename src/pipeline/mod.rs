//! Gap-detection orchestrator: ties api → parser → storage together.
//!
//! ## Run
//!
//! `run()` — the scheduled job:
//!   1. Read the distinct delivery dates already in `electricity_prices`
//!   2. Diff them against every date from `sync.start_date` through tomorrow
//!   3. For each missing date, oldest first: fetch → parse → insert
//!
//! Idempotent: a stored date is never requested again. A date that comes back
//! empty, or comes back as some other delivery date, is not stored and so
//! shows up as missing on the next run. An insert failure stops the run;
//! dates committed before it stay committed.

use crate::api::parser::parse_day;
use crate::api::{NordPoolClient, PriceSource};
use crate::config::AppConfig;
use crate::storage::{PriceStore, Repository};
use anyhow::{Context, Result};
use chrono::{Days, Local, NaiveDate};
use std::collections::BTreeSet;
use tracing::{error, info, warn};

/// Every date in `[start, today + 1]`, ascending. The extra day picks up
/// next-day prices published ahead of time.
pub fn required_dates(start: NaiveDate, today: NaiveDate) -> Vec<NaiveDate> {
    let Some(last) = today.checked_add_days(Days::new(1)) else {
        return vec![];
    };
    start.iter_days().take_while(|d| *d <= last).collect()
}

/// Required dates not yet present, ascending.
pub fn missing_dates(
    start: NaiveDate,
    today: NaiveDate,
    present: &BTreeSet<NaiveDate>,
) -> Vec<NaiveDate> {
    required_dates(start, today)
        .into_iter()
        .filter(|d| !present.contains(d))
        .collect()
}

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Top-level entry point. Every error is logged here and the connection is
    /// closed whatever happened; `None` means the run did not complete.
    pub async fn run(&self) -> Option<SyncStats> {
        let repo = match Repository::connect(&self.config.database).await {
            Ok(repo) => repo,
            Err(e) => {
                error!("Database error: {:#}", e);
                return None;
            }
        };

        self.run_on(repo, Local::now().date_naive()).await
    }

    /// Everything after the connection is open. Consumes `repo` and closes it.
    async fn run_on(&self, mut repo: Repository, today: NaiveDate) -> Option<SyncStats> {
        let outcome = match NordPoolClient::new(&self.config.api) {
            Ok(client) => self.sync(&mut repo, &client, today).await,
            Err(e) => Err(e),
        };

        repo.close().await;

        match outcome {
            Ok(stats) => Some(stats),
            Err(e) => {
                error!("Run aborted: {:#}", e);
                None
            }
        }
    }

    /// Fill every gap between `sync.start_date` and `today + 1`, one date at a time.
    pub async fn sync<S, P>(&self, store: &mut S, source: &P, today: NaiveDate) -> Result<SyncStats>
    where
        S: PriceStore + ?Sized,
        P: PriceSource + ?Sized,
    {
        let present = store.existing_dates().await?;
        let missing = missing_dates(self.config.sync.start_date, today, &present);
        info!("Found {} missing dates to process", missing.len());

        let mut stats = SyncStats {
            dates_missing: missing.len(),
            ..SyncStats::default()
        };

        for date in missing {
            info!("Processing date: {}", date);

            let payload = source.fetch_day(date).await;
            let rows = parse_day(payload.as_ref());

            if rows.is_empty() {
                warn!("{}: nothing to store, will retry next run", date);
                stats.dates_skipped += 1;
            } else if let Some(other) = rows.iter().find(|r| r.delivery_date != date) {
                // Storing these would not fill `date` and would duplicate `other`.
                warn!(
                    "{}: response is for delivery date {}, will retry next run",
                    date, other.delivery_date
                );
                stats.dates_skipped += 1;
                continue;
            }

            let inserted = store
                .insert_rows(&rows)
                .await
                .with_context(|| format!("Failed to store prices for {}", date))?;

            if inserted > 0 {
                stats.dates_ingested += 1;
                stats.rows_inserted += inserted;
                info!("Inserted data for {}", date);
            }
        }

        info!(
            "=== Done: {} missing | {} ingested | {} skipped | {} rows ===",
            stats.dates_missing, stats.dates_ingested, stats.dates_skipped, stats.rows_inserted,
        );
        Ok(stats)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub dates_missing: usize,
    pub dates_ingested: usize,
    pub dates_skipped: usize,
    pub rows_inserted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::models::IntervalRow;
    use anyhow::bail;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn pipeline(start: NaiveDate) -> Pipeline {
        Pipeline::new(AppConfig {
            sync: SyncConfig { start_date: start },
            ..AppConfig::default()
        })
    }

    /// Two 15-minute intervals for `date`, EE priced.
    fn day_payload(date: NaiveDate) -> Value {
        let prev = date.pred_opt().unwrap();
        json!({
            "deliveryDateCET": date.to_string(),
            "updatedAt": format!("{}T12:00:00Z", prev),
            "currency": "EUR",
            "resolutionInMinutes": 15,
            "multiIndexEntries": [
                {
                    "deliveryStart": format!("{}T22:00:00Z", prev),
                    "deliveryEnd": format!("{}T22:15:00Z", prev),
                    "entryPerArea": { "EE": 70.5 }
                },
                {
                    "deliveryStart": format!("{}T22:15:00Z", prev),
                    "deliveryEnd": format!("{}T22:30:00Z", prev),
                    "entryPerArea": { "EE": 71.0 }
                }
            ]
        })
    }

    #[derive(Default)]
    struct MemoryStore {
        rows: Vec<IntervalRow>,
        fail_on: Option<NaiveDate>,
        insert_calls: usize,
    }

    #[async_trait]
    impl PriceStore for MemoryStore {
        async fn existing_dates(&mut self) -> Result<BTreeSet<NaiveDate>> {
            Ok(self.rows.iter().map(|r| r.delivery_date).collect())
        }

        async fn insert_rows(&mut self, rows: &[IntervalRow]) -> Result<u64> {
            let Some(first) = rows.first() else {
                return Ok(0);
            };
            self.insert_calls += 1;
            if self.fail_on == Some(first.delivery_date) {
                bail!("connection lost mid-batch");
            }
            self.rows.extend_from_slice(rows);
            Ok(rows.len() as u64)
        }
    }

    /// Serves `day_payload` except for dates listed in `unpublished`, and
    /// answers dates in `shifted` with the following day's prices.
    #[derive(Default)]
    struct ScriptedSource {
        unpublished: Vec<NaiveDate>,
        shifted: Vec<NaiveDate>,
        requested: Mutex<Vec<NaiveDate>>,
    }

    impl ScriptedSource {
        fn requested(&self) -> Vec<NaiveDate> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PriceSource for ScriptedSource {
        async fn fetch_day(&self, date: NaiveDate) -> Option<Value> {
            self.requested.lock().unwrap().push(date);
            if self.unpublished.contains(&date) {
                None
            } else if self.shifted.contains(&date) {
                Some(day_payload(date.succ_opt().unwrap()))
            } else {
                Some(day_payload(date))
            }
        }
    }

    #[test]
    fn required_dates_run_through_tomorrow() {
        let dates = required_dates(d(2025, 8, 1), d(2025, 8, 3));
        assert_eq!(
            dates,
            vec![d(2025, 8, 1), d(2025, 8, 2), d(2025, 8, 3), d(2025, 8, 4)]
        );
    }

    #[test]
    fn start_after_tomorrow_requires_nothing() {
        assert!(required_dates(d(2025, 8, 10), d(2025, 8, 3)).is_empty());
        assert_eq!(required_dates(d(2025, 8, 4), d(2025, 8, 3)), vec![d(2025, 8, 4)]);
    }

    #[test]
    fn present_dates_are_never_missing() {
        let present = BTreeSet::from([d(2025, 8, 2), d(2025, 8, 4)]);
        let missing = missing_dates(d(2025, 8, 1), d(2025, 8, 5), &present);
        assert_eq!(missing, vec![d(2025, 8, 1), d(2025, 8, 3), d(2025, 8, 5), d(2025, 8, 6)]);
        assert!(missing.iter().all(|m| !present.contains(m)));

        // Same inputs, same answer.
        assert_eq!(missing, missing_dates(d(2025, 8, 1), d(2025, 8, 5), &present));
    }

    #[test]
    fn missing_dates_cross_month_and_leap_day() {
        let missing = missing_dates(d(2028, 2, 28), d(2028, 2, 29), &BTreeSet::new());
        assert_eq!(missing, vec![d(2028, 2, 28), d(2028, 2, 29), d(2028, 3, 1)]);
    }

    #[tokio::test]
    async fn empty_store_is_filled_oldest_first() {
        let mut store = MemoryStore::default();
        let source = ScriptedSource::default();

        let stats = pipeline(d(2025, 8, 1))
            .sync(&mut store, &source, d(2025, 8, 3))
            .await
            .unwrap();

        assert_eq!(
            source.requested(),
            vec![d(2025, 8, 1), d(2025, 8, 2), d(2025, 8, 3), d(2025, 8, 4)]
        );
        assert_eq!(
            stats,
            SyncStats {
                dates_missing: 4,
                dates_ingested: 4,
                dates_skipped: 0,
                rows_inserted: 8,
            }
        );
    }

    #[tokio::test]
    async fn second_run_without_new_days_fetches_nothing() {
        let mut store = MemoryStore::default();
        let p = pipeline(d(2025, 8, 1));

        p.sync(&mut store, &ScriptedSource::default(), d(2025, 8, 3)).await.unwrap();

        let again = ScriptedSource::default();
        let stats = p.sync(&mut store, &again, d(2025, 8, 3)).await.unwrap();
        assert!(again.requested().is_empty());
        assert_eq!(stats.dates_missing, 0);
    }

    #[tokio::test]
    async fn unpublished_day_stays_missing() {
        let tomorrow = d(2025, 8, 4);
        let mut store = MemoryStore::default();
        let source = ScriptedSource {
            unpublished: vec![tomorrow],
            ..Default::default()
        };
        let p = pipeline(d(2025, 8, 1));

        let stats = p.sync(&mut store, &source, d(2025, 8, 3)).await.unwrap();
        assert_eq!(stats.dates_skipped, 1);
        assert_eq!(stats.dates_ingested, 3);
        assert_eq!(store.insert_calls, 3);

        let present = store.existing_dates().await.unwrap();
        assert_eq!(missing_dates(d(2025, 8, 1), d(2025, 8, 3), &present), vec![tomorrow]);
    }

    #[tokio::test]
    async fn insert_failure_stops_the_run_but_keeps_earlier_days() {
        let mut store = MemoryStore {
            fail_on: Some(d(2025, 8, 2)),
            ..Default::default()
        };
        let source = ScriptedSource::default();
        let p = pipeline(d(2025, 8, 1));

        let err = p.sync(&mut store, &source, d(2025, 8, 3)).await.unwrap_err();
        assert!(format!("{:#}", err).contains("2025-08-02"));

        // Nothing after the failing date was attempted.
        assert_eq!(source.requested(), vec![d(2025, 8, 1), d(2025, 8, 2)]);

        let present = store.existing_dates().await.unwrap();
        assert_eq!(present, BTreeSet::from([d(2025, 8, 1)]));
        assert_eq!(
            missing_dates(d(2025, 8, 1), d(2025, 8, 3), &present),
            vec![d(2025, 8, 2), d(2025, 8, 3), d(2025, 8, 4)]
        );
    }

    #[test]
    fn store_read_failure_aborts_before_fetching() {
        struct BrokenStore;

        #[async_trait]
        impl PriceStore for BrokenStore {
            async fn existing_dates(&mut self) -> Result<BTreeSet<NaiveDate>> {
                bail!("relation \"electricity_prices\" does not exist")
            }
            async fn insert_rows(&mut self, _rows: &[IntervalRow]) -> Result<u64> {
                unreachable!()
            }
        }

        let source = ScriptedSource::default();
        let result = tokio_test::block_on(
            pipeline(d(2025, 8, 1)).sync(&mut BrokenStore, &source, d(2025, 8, 3)),
        );
        assert!(result.is_err());
        assert!(source.requested().is_empty());
    }

    #[tokio::test]
    async fn payload_for_another_date_is_not_stored() {
        let mut store = MemoryStore::default();
        let source = ScriptedSource {
            shifted: vec![d(2025, 8, 2)],
            ..Default::default()
        };
        let p = pipeline(d(2025, 8, 1));

        let stats = p.sync(&mut store, &source, d(2025, 8, 3)).await.unwrap();
        assert_eq!(stats.dates_skipped, 1);
        assert_eq!(stats.dates_ingested, 3);
        assert_eq!(store.insert_calls, 3);
        // 2025-08-03 was stored once, from its own request.
        let aug3 = store.rows.iter().filter(|r| r.delivery_date == d(2025, 8, 3)).count();
        assert_eq!(aug3, 2);

        let present = store.existing_dates().await.unwrap();
        assert_eq!(missing_dates(d(2025, 8, 1), d(2025, 8, 3), &present), vec![d(2025, 8, 2)]);
    }

    #[tokio::test]
    async fn unreachable_database_is_logged_not_raised() {
        let mut config = AppConfig::default();
        config.database.host = "127.0.0.1".into();
        config.database.port = 9;
        config.database.connect_timeout_secs = 1;

        assert!(Pipeline::new(config).run().await.is_none());
    }

    #[tokio::test]
    async fn bad_api_config_still_closes_the_connection() {
        let mut config = AppConfig::default();
        config.api.base_url = "not a url".into();

        // Never dialled: the run stops before the first query.
        let opts = sqlx::postgres::PgConnectOptions::new().host("127.0.0.1").port(9);
        let repo = Repository::connect_lazy(opts);
        let pool = repo.pool_handle();
        assert!(!pool.is_closed());

        let outcome = Pipeline::new(config).run_on(repo, d(2025, 8, 3)).await;
        assert!(outcome.is_none());
        assert!(pool.is_closed());
    }
}
