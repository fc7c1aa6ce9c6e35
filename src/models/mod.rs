pub mod regions;

use chrono::{DateTime, NaiveDate, Utc};

use self::regions::REGION_COUNT;

/// Columns every interval row carries before the per-region prices.
pub const SHARED_COLUMNS: [&str; 6] = [
    "delivery_date",
    "updated_at",
    "currency",
    "resolution",
    "start_time",
    "end_time",
];

// ── Interval row ──────────────────────────────────────────────────────────────

/// One delivery interval of one trading day, flattened across all regions.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalRow {
    pub delivery_date: NaiveDate,
    pub updated_at: Option<DateTime<Utc>>,
    pub currency: Option<String>,
    pub resolution: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Indexed like `regions::REGIONS`; `None` when the API had no price.
    pub prices: [Option<f64>; REGION_COUNT],
}

impl IntervalRow {
    /// Number of column values this row writes.
    pub const FIELD_COUNT: usize = SHARED_COLUMNS.len() + REGION_COUNT;
}

#[cfg(test)]
impl IntervalRow {
    pub fn price(&self, region: &str) -> Option<f64> {
        regions::position(region).and_then(|i| self.prices[i])
    }
}

// ── Day header ────────────────────────────────────────────────────────────────

/// Fields shared by every interval of one payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DayHeader {
    pub delivery_date: NaiveDate,
    pub updated_at: Option<DateTime<Utc>>,
    pub currency: Option<String>,
    pub resolution: i32,
}

impl DayHeader {
    pub fn row(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        prices: [Option<f64>; REGION_COUNT],
    ) -> IntervalRow {
        IntervalRow {
            delivery_date: self.delivery_date,
            updated_at: self.updated_at,
            currency: self.currency.clone(),
            resolution: self.resolution,
            start_time,
            end_time,
            prices,
        }
    }
}
