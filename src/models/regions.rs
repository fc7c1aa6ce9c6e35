//! Bidding zones requested from the day-ahead index and stored as
//! `<REGION>_price` columns. The order here is the column order.

pub const REGIONS: [&str; 21] = [
    "EE", "LT", "LV", "AT", "BE", "FR", "GER", "NL", "PL",
    "DK1", "DK2", "FI", "NO1", "NO2", "NO3", "NO4", "NO5",
    "SE1", "SE2", "SE3", "SE4",
];

pub const REGION_COUNT: usize = REGIONS.len();

/// Value of the `indexNames` query parameter.
pub fn index_names() -> String {
    REGIONS.join(",")
}

/// "NO1" → "NO1_price"
pub fn price_column(region: &str) -> String {
    format!("{}_price", region)
}

pub fn position(region: &str) -> Option<usize> {
    REGIONS.iter().position(|r| *r == region)
}
