use async_trait::async_trait;
use log::{debug, info};
use serde_json::{Value, json};

use super::{DeviceSwitch, PlanStateListener, SwitchError};
use crate::models::{ConsumptionPlan, ConsumptionPlanState};

/// Home Assistant REST client: switches entities of the `switch` domain and
/// optionally sends plan state messages through a `notify` service.
#[derive(Clone)]
pub struct HomeAssistantClient {
    base_url: String,
    token: String,
    notify_service: Option<String>,
    client: reqwest::Client,
}

impl HomeAssistantClient {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            notify_service: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_notify_service(mut self, notify_service: Option<String>) -> Self {
        self.notify_service = notify_service;
        self
    }

    pub async fn turn_on(&self, entity_id: &str) -> Result<(), SwitchError> {
        self.call_service("switch", "turn_on", &json!({ "entity_id": entity_id }))
            .await
    }

    pub async fn turn_off(&self, entity_id: &str) -> Result<(), SwitchError> {
        self.call_service("switch", "turn_off", &json!({ "entity_id": entity_id }))
            .await
    }

    fn service_url(&self, domain: &str, service: &str) -> String {
        format!("{}/api/services/{}/{}", self.base_url, domain, service)
    }

    async fn call_service(&self, domain: &str, service: &str, body: &Value) -> Result<(), SwitchError> {
        let url = self.service_url(domain, service);
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| SwitchError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SwitchError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

fn plan_state_message(device_id: &str, plan: &ConsumptionPlan) -> String {
    let state = match plan.state {
        ConsumptionPlanState::Processing => "scheduled",
        ConsumptionPlanState::Executed => "executed",
        ConsumptionPlanState::Canceled => "canceled",
    };
    format!(
        "Consumption plan for {} {} ({} min)",
        device_id,
        state,
        plan.consumption_duration.num_minutes()
    )
}

#[async_trait]
impl DeviceSwitch for HomeAssistantClient {
    async fn switch_device(&self, device_id: &str, switch_on: bool) -> Result<(), SwitchError> {
        if switch_on {
            self.turn_on(device_id).await?;
        } else {
            self.turn_off(device_id).await?;
        }
        info!(
            "Home Assistant switched {} {}",
            device_id,
            if switch_on { "on" } else { "off" }
        );
        Ok(())
    }
}

#[async_trait]
impl PlanStateListener for HomeAssistantClient {
    async fn notify(&self, device_id: &str, plan: &ConsumptionPlan) -> Result<(), SwitchError> {
        let Some(service) = &self.notify_service else {
            return Ok(());
        };
        let body = json!({
            "title": "Consumption plan",
            "message": plan_state_message(device_id, plan),
        });
        self.call_service("notify", service, &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, Utc};
    use mockito::{Matcher, Server};

    #[test]
    fn test_service_url_format() {
        let client = HomeAssistantClient::new(
            "http://homeassistant.local:8123/".to_string(),
            "my_token".to_string(),
        );

        assert_eq!(
            client.service_url("switch", "turn_on"),
            "http://homeassistant.local:8123/api/services/switch/turn_on"
        );
    }

    #[tokio::test]
    async fn test_switch_on_posts_entity_id() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/services/switch/turn_on")
            .match_header("authorization", "Bearer test_token")
            .match_body(Matcher::Json(json!({ "entity_id": "switch.charger" })))
            .with_status(200)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token".to_string());
        let result = client.switch_device("switch.charger", true).await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_switch_off_failure_carries_status() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/services/switch/turn_off")
            .with_status(401)
            .with_body("Unauthorized")
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "bad_token".to_string());
        let result = client.switch_device("switch.charger", false).await;

        assert_eq!(
            result,
            Err(SwitchError::Rejected {
                status: 401,
                body: "Unauthorized".to_string()
            })
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_notify_without_service_is_skipped() {
        let client = HomeAssistantClient::new("http://localhost:1".to_string(), "token".to_string());
        let now = Utc::now();
        let plan = ConsumptionPlan::new(now, TimeDelta::minutes(90), now + TimeDelta::hours(3), Vec::new());

        assert!(client.notify("switch.charger", &plan).await.is_ok());
    }

    #[tokio::test]
    async fn test_notify_posts_message() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/services/notify/mobile_app_phone")
            .match_body(Matcher::PartialJson(json!({
                "message": "Consumption plan for switch.charger scheduled (90 min)"
            })))
            .with_status(200)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token".to_string())
            .with_notify_service(Some("mobile_app_phone".to_string()));
        let now = Utc::now();
        let plan = ConsumptionPlan::new(now, TimeDelta::minutes(90), now + TimeDelta::hours(3), Vec::new());

        assert!(client.notify("switch.charger", &plan).await.is_ok());
        mock.assert_async().await;
    }
}
