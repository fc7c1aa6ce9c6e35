pub mod http_client;
pub mod parser;

use crate::config::ApiConfig;
use crate::models::regions;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use tracing::{error, info};
use url::Url;

use self::http_client::HttpClient;

// ── Source trait ──────────────────────────────────────────────────────────────

/// Where one day's raw price payload comes from.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// `None` when nothing usable came back. Failures are logged, never returned.
    async fn fetch_day(&self, date: NaiveDate) -> Option<Value>;
}

// ── Nord Pool data portal ─────────────────────────────────────────────────────

pub struct NordPoolClient {
    client: HttpClient,
    base_url: Url,
    market: String,
    currency: String,
    resolution_minutes: u32,
}

impl NordPoolClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid API base URL {:?}", config.base_url))?;

        Ok(Self {
            client: HttpClient::new(config)?,
            base_url,
            market: config.market.clone(),
            currency: config.currency.clone(),
            resolution_minutes: config.resolution_minutes,
        })
    }

    /// e.g. `…/DayAheadPriceIndices?date=2025-08-01&market=DayAhead&indexNames=EE,…`
    fn day_url(&self, date: NaiveDate) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("date", &date.format("%Y-%m-%d").to_string())
            .append_pair("market", &self.market)
            .append_pair("indexNames", &regions::index_names())
            .append_pair("currency", &self.currency)
            .append_pair("resolutionInMinutes", &self.resolution_minutes.to_string());
        url
    }
}

#[async_trait]
impl PriceSource for NordPoolClient {
    async fn fetch_day(&self, date: NaiveDate) -> Option<Value> {
        let url = self.day_url(date);

        match self.client.get_json(&url).await {
            Ok(Some(body)) => Some(body),
            Ok(None) => {
                info!("{}: no prices published yet", date);
                None
            }
            Err(e) => {
                error!("Error fetching data for {}: {:#}", date, e);
                None
            }
        }
    }
}
