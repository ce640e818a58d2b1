use chrono::{DateTime, Days, TimeDelta, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::collections::VecDeque;
use tokio::task::JoinHandle;

use crate::config::PowerConsumerConfig;
use crate::errors::AppError;
use crate::models::{ConsumptionPlan, PowerConsumerModel};

/// Day-ahead prices are published at most a few days in advance.
pub const MAX_PLANNING_WINDOW: TimeDelta = TimeDelta::days(7);

/// A switchable device with a single plan slot. Finished plans stay in the
/// slot until replaced and then move into a bounded history.
pub struct PowerConsumer {
    device_id: String,
    name: String,
    default_consumption_duration: TimeDelta,
    charging_status_url: Option<String>,
    consumption_plan: Option<ConsumptionPlan>,
    history: VecDeque<ConsumptionPlan>,
    history_size: usize,
    pending_timers: Vec<JoinHandle<()>>,
}

impl PowerConsumer {
    pub fn new(config: &PowerConsumerConfig, history_size: usize) -> Self {
        Self {
            device_id: config.device_id.clone(),
            name: config.name.clone(),
            default_consumption_duration: TimeDelta::try_minutes(config.default_duration_minutes).unwrap_or_default(),
            charging_status_url: config.charging_status_url.clone(),
            consumption_plan: None,
            history: VecDeque::with_capacity(history_size),
            history_size,
            pending_timers: Vec::new(),
        }
    }

    /// The Home Assistant entity id doubles as consumer id.
    pub fn id(&self) -> &str {
        &self.device_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn consumption_plan(&self) -> Option<&ConsumptionPlan> {
        self.consumption_plan.as_ref()
    }

    pub fn consumption_plan_mut(&mut self) -> Option<&mut ConsumptionPlan> {
        self.consumption_plan.as_mut()
    }

    /// Finished plans, newest first.
    pub fn history(&self) -> impl Iterator<Item = &ConsumptionPlan> {
        self.history.iter()
    }

    pub fn has_processing_plan(&self) -> bool {
        self.consumption_plan
            .as_ref()
            .is_some_and(ConsumptionPlan::is_processing)
    }

    pub fn validate_schedule_request(
        &self,
        consumption_duration: TimeDelta,
        finish_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if self.has_processing_plan() {
            return Err(AppError::user_error(format!(
                "Consumption plan for {} is already in progress",
                self.name
            )));
        }
        if consumption_duration <= TimeDelta::zero() {
            return Err(AppError::user_error("Consumption duration must be positive"));
        }
        if finish_at <= now {
            return Err(AppError::user_error("Finish time must be in the future"));
        }
        if finish_at - now > MAX_PLANNING_WINDOW {
            return Err(AppError::user_error(format!(
                "Finish time can be at most {} days ahead",
                MAX_PLANNING_WINDOW.num_days()
            )));
        }
        let latest_start = finish_at.checked_sub_signed(consumption_duration);
        if latest_start.is_none_or(|latest_start| now > latest_start) {
            return Err(AppError::user_error(format!(
                "Not enough time to consume {} min before the finish time",
                consumption_duration.num_minutes()
            )));
        }
        Ok(())
    }

    /// Installs a new plan, retiring the previous (finished) one to history.
    pub fn start_consumption_plan(&mut self, plan: ConsumptionPlan) {
        self.abort_pending_timers();
        if let Some(previous) = self.consumption_plan.replace(plan) {
            self.history.push_front(previous);
            self.history.truncate(self.history_size);
        }
    }

    pub fn set_pending_timers(&mut self, timers: Vec<JoinHandle<()>>) {
        self.pending_timers = timers;
    }

    fn abort_pending_timers(&mut self) {
        for timer in self.pending_timers.drain(..) {
            timer.abort();
        }
    }

    /// Cancels the processing plan and returns a snapshot of it, or `None`
    /// when there is nothing to cancel.
    pub fn cancel_consumption_plan(&mut self, now: DateTime<Utc>, time_zone: &Tz) -> Option<ConsumptionPlan> {
        let plan = self.consumption_plan.as_mut()?;
        if !plan.cancel(now, time_zone) {
            return None;
        }
        let snapshot = plan.clone();
        self.abort_pending_timers();
        Some(snapshot)
    }

    pub fn to_model(&self, now: DateTime<Utc>, time_zone: &Tz) -> PowerConsumerModel {
        PowerConsumerModel {
            id: self.device_id.clone(),
            name: self.name.clone(),
            default_finish_at: default_finish_at(now, time_zone),
            default_consumption_duration: self.default_consumption_duration,
            charging_status_url: self.charging_status_url.clone(),
            consumption_plan: self.consumption_plan.clone(),
        }
    }
}

/// Two hours from now during the day, 07:00 next morning from 16:00 on.
pub fn default_finish_at(now: DateTime<Utc>, time_zone: &Tz) -> DateTime<Utc> {
    let local_now = now.with_timezone(time_zone);
    if local_now.hour() < 16 {
        return now + TimeDelta::hours(2);
    }

    local_now
        .date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|tomorrow| tomorrow.and_hms_opt(7, 0, 0))
        .and_then(|morning| time_zone.from_local_datetime(&morning).earliest())
        .map_or(now + TimeDelta::hours(12), |morning| morning.with_timezone(&Utc))
}
