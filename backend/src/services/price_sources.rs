use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::errors::AppError;
use crate::models::{Currency, PriceCategory, PriceInterval};

/// Supplies the price list of one calendar day.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Returns the ordered price intervals of the day containing `day`.
    /// Fails with `AppError::NotFound` when no prices are published for it.
    async fn get_price_list(&self, day: DateTime<Utc>) -> Result<Vec<PriceInterval>, AppError>;
}

/// Midnight (in `time_zone`) of the given calendar date, as UTC.
pub fn start_of_day(date: NaiveDate, time_zone: &Tz) -> DateTime<Utc> {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    match time_zone.from_local_datetime(&midnight).earliest() {
        Some(local) => local.with_timezone(&Utc),
        // no local midnight on this date, count from UTC midnight instead
        None => Utc.from_utc_datetime(&midnight),
    }
}

/// Truncates an instant to the start of its local day.
pub fn cut_off_time(at: DateTime<Utc>, time_zone: &Tz) -> DateTime<Utc> {
    start_of_day(at.with_timezone(time_zone).date_naive(), time_zone)
}

/// Builds hourly intervals covering the local day, so DST days get 23 or 25 items.
fn hourly_intervals<F>(day: DateTime<Utc>, time_zone: &Tz, price_for: F) -> Vec<PriceInterval>
where
    F: Fn(DateTime<Tz>) -> (Currency, PriceCategory),
{
    let date = day.with_timezone(time_zone).date_naive();
    let start = start_of_day(date, time_zone);
    let end = date
        .succ_opt()
        .map(|next| start_of_day(next, time_zone))
        .unwrap_or(start + TimeDelta::days(1));

    let mut intervals = Vec::with_capacity(25);
    let mut starts_at = start;
    while starts_at < end {
        let duration = TimeDelta::hours(1).min(end - starts_at);
        let (price, category) = price_for(starts_at.with_timezone(time_zone));
        intervals.push(PriceInterval::new(starts_at, duration, price, category));
        starts_at += duration;
    }
    intervals
}

pub const W12_OFF_PEAK_PRICE: Currency = 80_000;
pub const W12_IN_PEAK_PRICE: Currency = 160_000;

/// Two-zone time-of-use tariff: off-peak 22:00-06:00 and 13:00-15:00 on
/// weekdays and all weekend; in-peak hours cost double.
#[derive(Debug, Clone)]
pub struct W12PriceSource {
    time_zone: Tz,
}

impl W12PriceSource {
    pub fn new(time_zone: Tz) -> Self {
        Self { time_zone }
    }

    fn price_at(local: DateTime<Tz>) -> (Currency, PriceCategory) {
        let hour = local.hour();
        let weekend = matches!(local.weekday(), Weekday::Sat | Weekday::Sun);
        if weekend || hour < 6 || hour == 13 || hour == 14 || hour > 21 {
            (W12_OFF_PEAK_PRICE, PriceCategory::Min)
        } else {
            (W12_IN_PEAK_PRICE, PriceCategory::Max)
        }
    }
}

#[async_trait]
impl PriceSource for W12PriceSource {
    async fn get_price_list(&self, day: DateTime<Utc>) -> Result<Vec<PriceInterval>, AppError> {
        Ok(hourly_intervals(day, &self.time_zone, Self::price_at))
    }
}

/// Single-zone tariff with one price for every hour.
#[derive(Debug, Clone)]
pub struct FlatRatePriceSource {
    time_zone: Tz,
    price: Currency,
}

impl FlatRatePriceSource {
    pub fn new(time_zone: Tz, price: Currency) -> Self {
        Self { time_zone, price }
    }
}

#[async_trait]
impl PriceSource for FlatRatePriceSource {
    async fn get_price_list(&self, day: DateTime<Utc>) -> Result<Vec<PriceInterval>, AppError> {
        let price = self.price;
        Ok(hourly_intervals(day, &self.time_zone, |_| {
            (price, PriceCategory::Medium)
        }))
    }
}

/// Keeps every fetched day for the lifetime of the process. Published prices
/// never change, so entries are never invalidated.
pub struct CachedPriceSource {
    inner: Arc<dyn PriceSource>,
    time_zone: Tz,
    cache: RwLock<HashMap<DateTime<Utc>, Arc<Vec<PriceInterval>>>>,
}

impl CachedPriceSource {
    pub fn new(inner: Arc<dyn PriceSource>, time_zone: Tz) -> Self {
        Self {
            inner,
            time_zone,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn cached(&self, key: &DateTime<Utc>) -> Option<Arc<Vec<PriceInterval>>> {
        self.cache
            .read()
            .ok()
            .and_then(|cache| cache.get(key).cloned())
    }

    pub fn cached_days(&self) -> usize {
        self.cache.read().map(|cache| cache.len()).unwrap_or(0)
    }

    /// Fetches the day into the cache ahead of time.
    pub async fn prefetch(&self, day: DateTime<Utc>) -> Result<usize, AppError> {
        let price_list = self.get_price_list(day).await?;
        Ok(price_list.len())
    }
}

#[async_trait]
impl PriceSource for CachedPriceSource {
    async fn get_price_list(&self, day: DateTime<Utc>) -> Result<Vec<PriceInterval>, AppError> {
        let key = cut_off_time(day, &self.time_zone);
        if let Some(price_list) = self.cached(&key) {
            debug!("Price list cache hit for {}", key);
            return Ok(price_list.as_ref().clone());
        }

        let price_list = Arc::new(self.inner.get_price_list(key).await?);
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key, price_list.clone());
        }
        info!("Cached price list for {} ({} items)", key, price_list.len());
        Ok(price_list.as_ref().clone())
    }
}

/// Tariff selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TariffType {
    W12,
    G11,
}

impl std::str::FromStr for TariffType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "w12" => Ok(TariffType::W12),
            "g11" => Ok(TariffType::G11),
            other => Err(format!("Unknown tariff: {}", other)),
        }
    }
}

pub fn build_price_source(tariff: TariffType, time_zone: Tz, flat_price: Currency) -> Arc<CachedPriceSource> {
    let inner: Arc<dyn PriceSource> = match tariff {
        TariffType::W12 => Arc::new(W12PriceSource::new(time_zone)),
        TariffType::G11 => Arc::new(FlatRatePriceSource::new(time_zone, flat_price)),
    };
    Arc::new(CachedPriceSource::new(inner, time_zone))
}
