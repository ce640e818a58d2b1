use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Price in the smallest currency subunit, 100000 per currency unit.
pub type Currency = i64;

/// Serializes a `TimeDelta` as whole milliseconds.
pub mod duration_ms {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(value.num_milliseconds())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<TimeDelta, D::Error>
    where
        D: Deserializer<'de>,
    {
        i64::deserialize(deserializer).map(TimeDelta::milliseconds)
    }
}

pub mod duration_ms_option {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<TimeDelta>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(delta) => serializer.serialize_some(&delta.num_milliseconds()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<TimeDelta>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<i64>::deserialize(deserializer).map(|ms| ms.map(TimeDelta::milliseconds))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PriceCategory {
    Min,
    Medium,
    Max,
}

/// One priced slot of a day-ahead price list. Within a single day the
/// intervals are contiguous and ordered by `starts_at`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceInterval {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub starts_at: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    pub duration: TimeDelta,
    pub price: Currency,
    #[serde(with = "duration_ms_option", default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<TimeDelta>,
    pub category: PriceCategory,
}

impl PriceInterval {
    pub fn new(
        starts_at: DateTime<Utc>,
        duration: TimeDelta,
        price: Currency,
        category: PriceCategory,
    ) -> Self {
        Self {
            starts_at,
            duration,
            price,
            weight: None,
            category,
        }
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.starts_at + self.duration
    }

    /// Part of the interval that falls inside `[from, to]`, zero when disjoint.
    pub fn clipped_duration(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> TimeDelta {
        let start = self.starts_at.max(from);
        let end = self.ends_at().min(to);
        (end - start).max(TimeDelta::zero())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SwitchActionState {
    Scheduled,
    Executed,
    Canceled,
}

/// A single switch event of a consumption plan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SwitchAction {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    at: DateTime<Utc>,
    switch_on: bool,
    state: SwitchActionState,
    #[serde(with = "chrono::serde::ts_milliseconds_option", default)]
    executed_at: Option<DateTime<Utc>>,
    result: Option<String>,
}

impl SwitchAction {
    pub fn new(at: DateTime<Utc>, switch_on: bool) -> Self {
        Self {
            at,
            switch_on,
            state: SwitchActionState::Scheduled,
            executed_at: None,
            result: None,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }

    pub fn switch_on(&self) -> bool {
        self.switch_on
    }

    pub fn state(&self) -> SwitchActionState {
        self.state
    }

    pub fn executed_at(&self) -> Option<DateTime<Utc>> {
        self.executed_at
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    pub fn is_scheduled(&self) -> bool {
        self.state == SwitchActionState::Scheduled
    }

    /// Moves a scheduled action to `Executed`. Returns `false` when the action
    /// already left the scheduled state.
    pub(crate) fn mark_executed(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_scheduled() {
            return false;
        }
        self.state = SwitchActionState::Executed;
        self.executed_at = Some(now);
        true
    }

    /// Reschedules a pending action; used when it runs ahead of its planned time.
    pub(crate) fn move_to(&mut self, at: DateTime<Utc>) {
        if self.is_scheduled() {
            self.at = at;
        }
    }

    pub(crate) fn mark_canceled(&mut self) -> bool {
        if !self.is_scheduled() {
            return false;
        }
        self.state = SwitchActionState::Canceled;
        true
    }

    pub(crate) fn set_result(&mut self, result: impl Into<String>) {
        self.result = Some(result.into());
    }
}

/// The portion of one price interval chosen for consumption. Carries between
/// zero and two switch actions.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanItem {
    pub price_list_item: PriceInterval,
    #[serde(with = "duration_ms")]
    pub duration: TimeDelta,
    pub switch_actions: Vec<SwitchAction>,
}

impl PlanItem {
    pub fn new(price_list_item: PriceInterval, duration: TimeDelta) -> Self {
        Self {
            price_list_item,
            duration,
            switch_actions: Vec::new(),
        }
    }

    pub fn is_partial(&self) -> bool {
        self.duration < self.price_list_item.duration
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConsumptionPlanState {
    Processing,
    Executed,
    Canceled,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionPlan {
    pub id: Uuid,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    pub consumption_duration: TimeDelta,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub finish_at: DateTime<Utc>,
    pub consumption_plan_items: Vec<PlanItem>,
    pub state: ConsumptionPlanState,
}

impl ConsumptionPlan {
    pub fn new(
        created_at: DateTime<Utc>,
        consumption_duration: TimeDelta,
        finish_at: DateTime<Utc>,
        consumption_plan_items: Vec<PlanItem>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at,
            consumption_duration,
            finish_at,
            consumption_plan_items,
            state: ConsumptionPlanState::Processing,
        }
    }

    pub fn is_processing(&self) -> bool {
        self.state == ConsumptionPlanState::Processing
    }

    /// All switch actions in time order.
    pub fn switch_actions(&self) -> impl Iterator<Item = &SwitchAction> {
        self.consumption_plan_items
            .iter()
            .flat_map(|item| item.switch_actions.iter())
    }

    pub fn switch_actions_mut(&mut self) -> impl Iterator<Item = &mut SwitchAction> {
        self.consumption_plan_items
            .iter_mut()
            .flat_map(|item| item.switch_actions.iter_mut())
    }

    pub fn switch_action_mut(&mut self, index: usize) -> Option<&mut SwitchAction> {
        self.switch_actions_mut().nth(index)
    }

    pub fn allocated_duration(&self) -> TimeDelta {
        self.consumption_plan_items
            .iter()
            .fold(TimeDelta::zero(), |total, item| total + item.duration)
    }

    pub fn has_started(&self) -> bool {
        self.switch_actions()
            .next()
            .is_some_and(|action| action.state() == SwitchActionState::Executed)
    }

    /// Switches a processing plan to `Executed` once no action is left
    /// scheduled. Returns `true` when the state changed.
    pub fn complete_if_finished(&mut self) -> bool {
        if !self.is_processing() || self.switch_actions().any(SwitchAction::is_scheduled) {
            return false;
        }
        self.state = ConsumptionPlanState::Executed;
        true
    }

    /// Cancels every still scheduled action. An OFF action right after an
    /// executed one is recorded as executed so the device ends up switched off.
    /// Returns `false` when the plan is not processing.
    pub fn cancel(&mut self, now: DateTime<Utc>, time_zone: &Tz) -> bool {
        if !self.is_processing() {
            return false;
        }

        let started = self.has_started();
        let canceled_at = format!(
            "Canceled at {}",
            now.with_timezone(time_zone).format("%H:%M:%S")
        );
        let mut previous_executed = false;
        for action in self.switch_actions_mut() {
            if action.is_scheduled() {
                if previous_executed && !action.switch_on() {
                    action.mark_executed(now);
                    action.set_result(canceled_at.clone());
                } else {
                    action.mark_canceled();
                }
            }
            previous_executed = action.state() == SwitchActionState::Executed;
        }

        self.state = if started {
            ConsumptionPlanState::Executed
        } else {
            ConsumptionPlanState::Canceled
        };
        true
    }
}

/// API view of a power consumer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PowerConsumerModel {
    pub id: String,
    pub name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub default_finish_at: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    pub default_consumption_duration: TimeDelta,
    pub charging_status_url: Option<String>,
    pub consumption_plan: Option<ConsumptionPlan>,
}
