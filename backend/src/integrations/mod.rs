use async_trait::async_trait;
use log::info;

use crate::models::ConsumptionPlan;

pub mod home_assistant;

pub use home_assistant::HomeAssistantClient;

/// Error types for actuator and notification calls
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwitchError {
    #[error("Connection error: {0}")]
    ConnectionError(String),
    #[error("{status} : {body}")]
    Rejected { status: u16, body: String },
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Actuator able to turn a consumer's device on or off
#[async_trait]
pub trait DeviceSwitch: Send + Sync {
    async fn switch_device(&self, device_id: &str, switch_on: bool) -> Result<(), SwitchError>;
}

/// Receives a copy of a plan whenever its state changes. Delivery is best effort.
#[async_trait]
pub trait PlanStateListener: Send + Sync {
    async fn notify(&self, device_id: &str, plan: &ConsumptionPlan) -> Result<(), SwitchError>;
}

/// Used when no Home Assistant instance is configured: switches are only logged.
#[derive(Debug, Default, Clone)]
pub struct DryRunSwitch;

#[async_trait]
impl DeviceSwitch for DryRunSwitch {
    async fn switch_device(&self, device_id: &str, switch_on: bool) -> Result<(), SwitchError> {
        info!(
            "[dry-run] switch {} {}",
            device_id,
            if switch_on { "on" } else { "off" }
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct LogPlanStateListener;

#[async_trait]
impl PlanStateListener for LogPlanStateListener {
    async fn notify(&self, device_id: &str, plan: &ConsumptionPlan) -> Result<(), SwitchError> {
        info!(
            "Consumption plan {} of {} is {:?}",
            plan.id, device_id, plan.state
        );
        Ok(())
    }
}
