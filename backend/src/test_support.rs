//! Shared fixtures for unit tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::{Arc, Mutex};

use crate::config::PowerConsumerConfig;
use crate::integrations::{DeviceSwitch, PlanStateListener, SwitchError};
use crate::models::{ConsumptionPlan, ConsumptionPlanState};
use crate::services::clock::Clock;
use crate::services::power_consumers_service::PowerConsumersService;
use crate::services::price_sources::{PriceSource, W12PriceSource};
use crate::services::price_window::PriceWindowService;
use crate::services::scheduler::{DEFAULT_SWITCH_ACTION_THRESHOLD, SwitchActionsScheduler};

pub fn warsaw() -> Tz {
    chrono_tz::Europe::Warsaw
}

/// Warsaw wall-clock time as UTC.
pub fn local(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    warsaw()
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .unwrap()
        .with_timezone(&Utc)
}

/// Starts at a fixed instant and follows tokio's clock, so paused-time tests
/// see "now" advance together with their timers.
pub struct VirtualClock {
    base: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl VirtualClock {
    pub fn starting_at(base: DateTime<Utc>) -> Self {
        Self {
            base,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + TimeDelta::from_std(self.started.elapsed()).unwrap_or_default()
    }
}

#[derive(Default)]
pub struct RecordingSwitch {
    calls: Mutex<Vec<(String, bool)>>,
    fail: bool,
}

impl RecordingSwitch {
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<(String, bool)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeviceSwitch for RecordingSwitch {
    async fn switch_device(&self, device_id: &str, switch_on: bool) -> Result<(), SwitchError> {
        self.calls
            .lock()
            .unwrap()
            .push((device_id.to_string(), switch_on));
        if self.fail {
            return Err(SwitchError::ConnectionError("device unreachable".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingListener {
    states: Mutex<Vec<ConsumptionPlanState>>,
    fail: bool,
}

impl RecordingListener {
    /// Records every notification and then reports a delivery failure.
    pub fn failing() -> Self {
        Self {
            states: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn states(&self) -> Vec<ConsumptionPlanState> {
        self.states.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlanStateListener for RecordingListener {
    async fn notify(&self, _device_id: &str, plan: &ConsumptionPlan) -> Result<(), SwitchError> {
        self.states.lock().unwrap().push(plan.state);
        if self.fail {
            return Err(SwitchError::Rejected {
                status: 500,
                body: "notify service unavailable".to_string(),
            });
        }
        Ok(())
    }
}

pub fn power_consumer_configs() -> Vec<PowerConsumerConfig> {
    vec![
        PowerConsumerConfig {
            device_id: "switch.audi_charger_breaker_switch".to_string(),
            name: "Audi charger".to_string(),
            default_duration_minutes: 90,
            charging_status_url: None,
        },
        PowerConsumerConfig {
            device_id: "switch.smart_plug_socket_1".to_string(),
            name: "One phase switch".to_string(),
            default_duration_minutes: 90,
            charging_status_url: None,
        },
    ]
}

/// Service over the W12 tariff with recording collaborators.
pub fn create_service(
    device_switch: Arc<RecordingSwitch>,
    listener: Arc<RecordingListener>,
    now: DateTime<Utc>,
) -> PowerConsumersService {
    create_service_with_prices(device_switch, listener, Arc::new(W12PriceSource::new(warsaw())), now)
}

pub fn create_service_with_prices(
    device_switch: Arc<RecordingSwitch>,
    listener: Arc<RecordingListener>,
    price_source: Arc<dyn PriceSource>,
    now: DateTime<Utc>,
) -> PowerConsumersService {
    let scheduler = SwitchActionsScheduler::new(
        device_switch,
        listener,
        Arc::new(VirtualClock::starting_at(now)),
        DEFAULT_SWITCH_ACTION_THRESHOLD,
    );
    let price_window = Arc::new(PriceWindowService::new(price_source, warsaw()));
    PowerConsumersService::new(&power_consumer_configs(), 10, price_window, scheduler)
}
