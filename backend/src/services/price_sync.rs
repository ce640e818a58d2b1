use chrono::{TimeDelta, Utc};
use log::{info, warn};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use super::price_sources::CachedPriceSource;

async fn prefetch_day(price_source: &CachedPriceSource, days_ahead: i64) {
    let day = Utc::now() + TimeDelta::days(days_ahead);
    match price_source.prefetch(day).await {
        Ok(count) => info!("Price list for {} ready ({} intervals)", day.date_naive(), count),
        Err(e) => warn!("Price list for {} not available yet: {}", day.date_naive(), e),
    }
}

/// Warms the cache with today's prices and starts a daily job that fetches
/// tomorrow's list once it is expected to be published. The returned
/// scheduler must be kept alive.
pub async fn start_price_sync(
    price_source: Arc<CachedPriceSource>,
    cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    prefetch_day(&price_source, 0).await;

    let sched = JobScheduler::new().await?;
    let job = Job::new_async(cron, move |_uuid, _l| {
        let price_source = price_source.clone();
        Box::pin(async move {
            info!("Scheduled price sync triggered");
            prefetch_day(&price_source, 1).await;
        })
    })?;
    sched.add(job).await?;
    sched.start().await?;

    info!("Price sync scheduled ({})", cron);
    Ok(sched)
}
