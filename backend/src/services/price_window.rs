use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

use super::price_sources::{PriceSource, start_of_day};
use crate::errors::AppError;
use crate::models::PriceInterval;

/// Price sources answer for a single day while a consumption window may span
/// several. This service collects the daily lists covering `[from, to)` into
/// one ordered list, keeping every interval that overlaps the window.
pub struct PriceWindowService {
    price_source: Arc<dyn PriceSource>,
    time_zone: Tz,
}

impl PriceWindowService {
    pub fn new(price_source: Arc<dyn PriceSource>, time_zone: Tz) -> Self {
        Self {
            price_source,
            time_zone,
        }
    }

    pub fn time_zone(&self) -> &Tz {
        &self.time_zone
    }

    pub async fn get_price_list(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PriceInterval>, AppError> {
        let first_day = from.with_timezone(&self.time_zone).date_naive();
        let last_day = to.with_timezone(&self.time_zone).date_naive();

        let mut price_list = Vec::new();
        for day in first_day.iter_days().take_while(|day| *day <= last_day) {
            let day_price_list = self
                .price_source
                .get_price_list(start_of_day(day, &self.time_zone))
                .await?;
            price_list.extend(
                day_price_list
                    .into_iter()
                    .filter(|item| item.ends_at() > from && item.starts_at < to),
            );
        }

        Ok(price_list)
    }

    /// Full price list of the day containing `day`.
    pub async fn get_day_price_list(&self, day: DateTime<Utc>) -> Result<Vec<PriceInterval>, AppError> {
        self.price_source.get_price_list(day).await
    }
}
