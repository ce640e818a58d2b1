use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use log::info;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::power_consumer::PowerConsumer;
use super::price_window::PriceWindowService;
use super::schedule_computation::compute_consumption_plan;
use super::scheduler::{SharedPowerConsumer, SwitchActionsScheduler};
use crate::config::PowerConsumerConfig;
use crate::errors::AppError;
use crate::models::{ConsumptionPlan, PowerConsumerModel, PriceInterval};

/// Entry point for plan operations. The consumer set is fixed at startup;
/// every operation locks one consumer for its whole duration.
pub struct PowerConsumersService {
    power_consumers: BTreeMap<String, SharedPowerConsumer>,
    price_window: Arc<PriceWindowService>,
    scheduler: SwitchActionsScheduler,
}

impl PowerConsumersService {
    pub fn new(
        configs: &[PowerConsumerConfig],
        history_size: usize,
        price_window: Arc<PriceWindowService>,
        scheduler: SwitchActionsScheduler,
    ) -> Self {
        let power_consumers = configs
            .iter()
            .map(|config| {
                (
                    config.device_id.clone(),
                    Arc::new(Mutex::new(PowerConsumer::new(config, history_size))),
                )
            })
            .collect();

        Self {
            power_consumers,
            price_window,
            scheduler,
        }
    }

    pub fn time_zone(&self) -> &Tz {
        self.price_window.time_zone()
    }

    fn get_power_consumer(&self, power_consumer_id: &str) -> Result<&SharedPowerConsumer, AppError> {
        self.power_consumers
            .get(power_consumer_id)
            .ok_or_else(|| AppError::not_found(format!("Power consumer {} not found", power_consumer_id)))
    }

    pub async fn power_consumer_models(&self) -> Vec<PowerConsumerModel> {
        let now = self.scheduler.now();
        let time_zone = self.price_window.time_zone();
        let mut models = Vec::with_capacity(self.power_consumers.len());
        for power_consumer in self.power_consumers.values() {
            models.push(power_consumer.lock().await.to_model(now, time_zone));
        }
        models
    }

    pub async fn power_consumer_model(&self, power_consumer_id: &str) -> Result<PowerConsumerModel, AppError> {
        let power_consumer = self.get_power_consumer(power_consumer_id)?.lock().await;
        Ok(power_consumer.to_model(self.scheduler.now(), self.price_window.time_zone()))
    }

    pub async fn schedule_consumption_plan(
        &self,
        power_consumer_id: &str,
        consumption_duration: TimeDelta,
        finish_at: DateTime<Utc>,
    ) -> Result<PowerConsumerModel, AppError> {
        let shared = self.get_power_consumer(power_consumer_id)?;
        let mut power_consumer = shared.lock().await;

        let now = self.scheduler.now();
        power_consumer.validate_schedule_request(consumption_duration, finish_at, now)?;
        let price_list = self.price_window.get_price_list(now, finish_at).await?;
        let plan = compute_consumption_plan(&price_list, consumption_duration, now, finish_at);
        info!(
            "Scheduling consumption plan {} for {}: {} min until {}",
            plan.id,
            power_consumer.name(),
            consumption_duration.num_minutes(),
            finish_at
        );

        power_consumer.start_consumption_plan(plan);
        self.scheduler
            .schedule_switch_actions(shared, &mut power_consumer)
            .await;
        // plans finished during scheduling were already announced as executed
        if let Some(plan) = power_consumer.consumption_plan().filter(|plan| plan.is_processing()) {
            self.scheduler
                .notify_plan_state(power_consumer.id().to_owned(), plan.clone());
        }

        Ok(power_consumer.to_model(now, self.price_window.time_zone()))
    }

    pub async fn delete_consumption_plan(&self, power_consumer_id: &str) -> Result<PowerConsumerModel, AppError> {
        let mut power_consumer = self.get_power_consumer(power_consumer_id)?.lock().await;
        let time_zone = self.price_window.time_zone();

        self.scheduler
            .cancel_consumption_plan(&mut power_consumer, time_zone)
            .await;

        Ok(power_consumer.to_model(self.scheduler.now(), time_zone))
    }

    pub async fn consumption_plan_history(&self, power_consumer_id: &str) -> Result<Vec<ConsumptionPlan>, AppError> {
        let power_consumer = self.get_power_consumer(power_consumer_id)?.lock().await;
        Ok(power_consumer.history().cloned().collect())
    }

    pub async fn get_day_price_list(&self, day: DateTime<Utc>) -> Result<Vec<PriceInterval>, AppError> {
        self.price_window.get_day_price_list(day).await
    }
}
