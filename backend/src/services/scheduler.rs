use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::clock::Clock;
use super::power_consumer::PowerConsumer;
use crate::integrations::{DeviceSwitch, PlanStateListener};
use crate::models::{ConsumptionPlan, SwitchAction};

pub type SharedPowerConsumer = Arc<Mutex<PowerConsumer>>;

/// Actions due within this lookahead are executed immediately, with their
/// instant moved to the execution time, instead of getting a timer.
pub const DEFAULT_SWITCH_ACTION_THRESHOLD: TimeDelta = TimeDelta::seconds(15);

/// Executes plan switch actions at their instants. Each future action gets a
/// tokio timer; the timer handles live on the power consumer so cancelling a
/// plan can abort them. Fired timers re-check under the consumer lock that
/// their plan is still the current one before touching the device.
#[derive(Clone)]
pub struct SwitchActionsScheduler {
    device_switch: Arc<dyn DeviceSwitch>,
    listener: Arc<dyn PlanStateListener>,
    clock: Arc<dyn Clock>,
    threshold: TimeDelta,
}

impl SwitchActionsScheduler {
    pub fn new(
        device_switch: Arc<dyn DeviceSwitch>,
        listener: Arc<dyn PlanStateListener>,
        clock: Arc<dyn Clock>,
        threshold: TimeDelta,
    ) -> Self {
        Self {
            device_switch,
            listener,
            clock,
            threshold,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Hands every scheduled action of the consumer's current plan over for
    /// execution. `shared` must be the handle `power_consumer` was locked from.
    pub async fn schedule_switch_actions(&self, shared: &SharedPowerConsumer, power_consumer: &mut PowerConsumer) {
        let now = self.clock.now();
        let execute_before = now + self.threshold;
        let device_id = power_consumer.id().to_owned();
        let Some(plan) = power_consumer.consumption_plan_mut() else {
            return;
        };
        let plan_id = plan.id;

        let pending: Vec<(usize, DateTime<Utc>)> = plan
            .switch_actions()
            .enumerate()
            .filter(|(_, action)| action.is_scheduled())
            .map(|(index, action)| (index, action.at()))
            .collect();

        let mut timers = Vec::with_capacity(pending.len());
        for (index, at) in pending {
            if at < execute_before {
                if let Some(action) = plan.switch_action_mut(index) {
                    action.move_to(now);
                    self.execute_switch_action(&device_id, action, now).await;
                }
                continue;
            }

            let sleep_for = (at - now).to_std().unwrap_or_default();
            debug!(
                "Switch action {} of plan {} fires in {}s",
                index,
                plan_id,
                sleep_for.as_secs()
            );
            timers.push(tokio::spawn(self.clone().fire_switch_action(
                shared.clone(),
                plan_id,
                index,
                sleep_for,
            )));
        }

        let finished = plan.complete_if_finished().then(|| plan.clone());
        power_consumer.set_pending_timers(timers);
        if let Some(plan) = finished {
            info!("Consumption plan {} of {} executed", plan.id, device_id);
            self.notify_plan_state(device_id, plan);
        }
    }

    async fn fire_switch_action(
        self,
        power_consumer: SharedPowerConsumer,
        plan_id: Uuid,
        index: usize,
        sleep_for: Duration,
    ) {
        tokio::time::sleep(sleep_for).await;

        let mut power_consumer = power_consumer.lock().await;
        let device_id = power_consumer.id().to_owned();
        let Some(plan) = power_consumer
            .consumption_plan_mut()
            .filter(|plan| plan.id == plan_id && plan.is_processing())
        else {
            debug!("Plan {} is no longer active, dropping switch action {}", plan_id, index);
            return;
        };

        let now = self.clock.now();
        if let Some(action) = plan.switch_action_mut(index) {
            self.execute_switch_action(&device_id, action, now).await;
        }
        if plan.complete_if_finished() {
            info!("Consumption plan {} of {} executed", plan.id, device_id);
            self.notify_plan_state(device_id, plan.clone());
        }
    }

    /// Runs a single action. The action counts as executed even when the
    /// device call fails; the failure text is kept as its result.
    async fn execute_switch_action(&self, device_id: &str, action: &mut SwitchAction, now: DateTime<Utc>) {
        if !action.mark_executed(now) {
            return;
        }

        let switch_on = action.switch_on();
        match self.device_switch.switch_device(device_id, switch_on).await {
            Ok(()) => {
                info!("Switched {} {}", device_id, if switch_on { "on" } else { "off" });
                action.set_result("OK");
            }
            Err(e) => {
                error!(
                    "Failed to switch {} {}: {}",
                    device_id,
                    if switch_on { "on" } else { "off" },
                    e
                );
                action.set_result(e.to_string());
            }
        }
    }

    /// Cancels the consumer's processing plan, then forces the device off.
    /// Returns `false` when there was nothing to cancel.
    pub async fn cancel_consumption_plan(&self, power_consumer: &mut PowerConsumer, time_zone: &Tz) -> bool {
        let now = self.clock.now();
        let Some(plan) = power_consumer.cancel_consumption_plan(now, time_zone) else {
            return false;
        };

        let device_id = power_consumer.id().to_owned();
        info!("Consumption plan {} of {} canceled", plan.id, device_id);
        if let Err(e) = self.device_switch.switch_device(&device_id, false).await {
            error!("Failed to switch {} off after cancel: {}", device_id, e);
        }
        self.notify_plan_state(device_id, plan);
        true
    }

    /// Fire-and-forget delivery of a plan snapshot to the listener.
    pub fn notify_plan_state(&self, device_id: String, plan: ConsumptionPlan) {
        let listener = self.listener.clone();
        tokio::spawn(async move {
            if let Err(e) = listener.notify(&device_id, &plan).await {
                warn!("Plan state notification for {} failed: {}", device_id, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PowerConsumerConfig;
    use crate::models::{ConsumptionPlanState, PlanItem, PriceCategory, PriceInterval, SwitchActionState};
    use crate::test_support::{RecordingListener, RecordingSwitch, VirtualClock, local, warsaw};

    const DEVICE: &str = "switch.smart_plug_socket_1";

    struct Fixture {
        scheduler: SwitchActionsScheduler,
        device_switch: Arc<RecordingSwitch>,
        listener: Arc<RecordingListener>,
        power_consumer: SharedPowerConsumer,
    }

    fn fixture(device_switch: RecordingSwitch, now: DateTime<Utc>) -> Fixture {
        let device_switch = Arc::new(device_switch);
        let listener = Arc::new(RecordingListener::default());
        let scheduler = SwitchActionsScheduler::new(
            device_switch.clone(),
            listener.clone(),
            Arc::new(VirtualClock::starting_at(now)),
            DEFAULT_SWITCH_ACTION_THRESHOLD,
        );
        let config = PowerConsumerConfig {
            device_id: DEVICE.to_string(),
            name: "One phase switch".to_string(),
            default_duration_minutes: 90,
            charging_status_url: None,
        };
        Fixture {
            scheduler,
            device_switch,
            listener,
            power_consumer: Arc::new(Mutex::new(PowerConsumer::new(&config, 10))),
        }
    }

    /// One interval with an ON at `on` and an OFF at `off`.
    fn plan(now: DateTime<Utc>, on: DateTime<Utc>, off: DateTime<Utc>) -> ConsumptionPlan {
        let interval = PriceInterval::new(on, off - on, 80_000, PriceCategory::Min);
        let mut item = PlanItem::new(interval, off - on);
        item.switch_actions = vec![SwitchAction::new(on, true), SwitchAction::new(off, false)];
        ConsumptionPlan::new(now, off - on, off, vec![item])
    }

    async fn start(fixture: &Fixture, plan: ConsumptionPlan) {
        let mut power_consumer = fixture.power_consumer.lock().await;
        power_consumer.start_consumption_plan(plan);
        fixture
            .scheduler
            .schedule_switch_actions(&fixture.power_consumer, &mut power_consumer)
            .await;
    }

    async fn current_plan(fixture: &Fixture) -> ConsumptionPlan {
        let power_consumer = fixture.power_consumer.lock().await;
        power_consumer.consumption_plan().cloned().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_actions_fire_at_their_instants() {
        let now = local(2024, 9, 24, 19, 30);
        let fixture = fixture(RecordingSwitch::default(), now);
        start(&fixture, plan(now, local(2024, 9, 24, 22, 0), local(2024, 9, 24, 23, 0))).await;

        assert!(fixture.device_switch.calls().is_empty());

        tokio::time::sleep(Duration::from_secs(4 * 3600)).await;

        let plan = current_plan(&fixture).await;
        assert_eq!(
            fixture.device_switch.calls(),
            vec![(DEVICE.to_string(), true), (DEVICE.to_string(), false)]
        );
        assert_eq!(plan.state, ConsumptionPlanState::Executed);
        for action in plan.switch_actions() {
            assert_eq!(action.state(), SwitchActionState::Executed);
            assert_eq!(action.result(), Some("OK"));
            let executed_at = action.executed_at().unwrap();
            assert!(executed_at >= action.at());
            assert!(executed_at - action.at() < TimeDelta::seconds(1));
        }
        assert_eq!(fixture.listener.states(), vec![ConsumptionPlanState::Executed]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_action_executes_immediately() {
        let now = local(2024, 9, 24, 22, 0);
        let fixture = fixture(RecordingSwitch::default(), now);
        start(
            &fixture,
            plan(now, now + TimeDelta::seconds(5), now + TimeDelta::hours(1)),
        )
        .await;

        let plan = current_plan(&fixture).await;
        let first = plan.switch_actions().next().unwrap();
        assert_eq!(first.state(), SwitchActionState::Executed);
        assert_eq!(first.at(), now);
        assert_eq!(first.executed_at(), Some(now));
        assert_eq!(fixture.device_switch.calls(), vec![(DEVICE.to_string(), true)]);
        let second = plan.switch_actions().nth(1).unwrap();
        assert_eq!(second.at(), now + TimeDelta::hours(1));
        assert!(second.is_scheduled());
        assert!(plan.is_processing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_failure_is_recorded_as_result() {
        let now = local(2024, 9, 24, 22, 0);
        let fixture = fixture(RecordingSwitch::failing(), now);
        start(
            &fixture,
            plan(now, now + TimeDelta::minutes(1), now + TimeDelta::minutes(2)),
        )
        .await;

        tokio::time::sleep(Duration::from_secs(180)).await;

        let plan = current_plan(&fixture).await;
        assert_eq!(plan.state, ConsumptionPlanState::Executed);
        for action in plan.switch_actions() {
            assert_eq!(action.state(), SwitchActionState::Executed);
            assert_eq!(action.result(), Some("Connection error: device unreachable"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_start_switches_off_and_stops_timers() {
        let now = local(2024, 9, 24, 21, 50);
        let fixture = fixture(RecordingSwitch::default(), now);
        start(&fixture, plan(now, local(2024, 9, 24, 22, 0), local(2024, 9, 24, 23, 0))).await;

        tokio::time::sleep(Duration::from_secs(20 * 60)).await;
        let canceled = {
            let mut power_consumer = fixture.power_consumer.lock().await;
            fixture
                .scheduler
                .cancel_consumption_plan(&mut power_consumer, &warsaw())
                .await
        };
        tokio::time::sleep(Duration::from_secs(3 * 3600)).await;

        assert!(canceled);
        let plan = current_plan(&fixture).await;
        assert_eq!(plan.state, ConsumptionPlanState::Executed);
        let off = plan.switch_actions().nth(1).unwrap();
        assert_eq!(off.state(), SwitchActionState::Executed);
        assert_eq!(off.result(), Some("Canceled at 22:10:00"));
        assert_eq!(
            fixture.device_switch.calls(),
            vec![(DEVICE.to_string(), true), (DEVICE.to_string(), false)]
        );
        assert_eq!(fixture.listener.states(), vec![ConsumptionPlanState::Executed]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_start_never_switches_on() {
        let now = local(2024, 9, 24, 19, 30);
        let fixture = fixture(RecordingSwitch::default(), now);
        start(&fixture, plan(now, local(2024, 9, 24, 22, 0), local(2024, 9, 24, 23, 0))).await;

        {
            let mut power_consumer = fixture.power_consumer.lock().await;
            fixture
                .scheduler
                .cancel_consumption_plan(&mut power_consumer, &warsaw())
                .await;
        }
        tokio::time::sleep(Duration::from_secs(4 * 3600)).await;

        let plan = current_plan(&fixture).await;
        assert_eq!(plan.state, ConsumptionPlanState::Canceled);
        assert!(
            plan.switch_actions()
                .all(|action| action.state() == SwitchActionState::Canceled)
        );
        assert_eq!(fixture.device_switch.calls(), vec![(DEVICE.to_string(), false)]);
        assert_eq!(fixture.listener.states(), vec![ConsumptionPlanState::Canceled]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_without_plan_does_nothing() {
        let now = local(2024, 9, 24, 19, 30);
        let fixture = fixture(RecordingSwitch::default(), now);

        let mut power_consumer = fixture.power_consumer.lock().await;
        let canceled = fixture
            .scheduler
            .cancel_consumption_plan(&mut power_consumer, &warsaw())
            .await;

        assert!(!canceled);
        assert!(fixture.device_switch.calls().is_empty());
    }
}
