//! Runtime settings read from environment variables (a `.env` file is loaded
//! first when present).
//!
//! | Variable                       | Default                 |
//! |--------------------------------|-------------------------|
//! | `BIND_ADDRESS`                 | `0.0.0.0`               |
//! | `PORT`                         | `8080`                  |
//! | `TIME_ZONE`                    | `Europe/Warsaw`         |
//! | `TARIFF`                       | `w12` (or `g11`)        |
//! | `G11_PRICE`                    | `120000`                |
//! | `HA_BASE_URL`, `HA_TOKEN`      | unset: dry-run switching|
//! | `HA_NOTIFY_SERVICE`            | unset                   |
//! | `POWER_CONSUMERS`              | two built-in switches   |
//! | `SWITCH_ACTION_THRESHOLD_SECS` | `15`                    |
//! | `PLAN_HISTORY_SIZE`            | `10`                    |
//! | `PRICE_SYNC_CRON`              | `0 30 13 * * *` (UTC)   |

use chrono::TimeDelta;
use chrono_tz::Tz;
use serde::Deserialize;
use std::str::FromStr;

use crate::models::Currency;
use crate::services::price_sources::TariffType;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
    #[error("{0} must be set together with HA_BASE_URL")]
    Missing(&'static str),
}

fn default_duration_minutes() -> i64 {
    90
}

/// One switchable device as configured in `POWER_CONSUMERS`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PowerConsumerConfig {
    pub device_id: String,
    pub name: String,
    #[serde(default = "default_duration_minutes")]
    pub default_duration_minutes: i64,
    #[serde(default)]
    pub charging_status_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HomeAssistantConfig {
    pub base_url: String,
    pub token: String,
    pub notify_service: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_address: String,
    pub port: u16,
    pub time_zone: Tz,
    pub tariff: TariffType,
    pub flat_price: Currency,
    pub home_assistant: Option<HomeAssistantConfig>,
    pub power_consumers: Vec<PowerConsumerConfig>,
    pub switch_action_threshold: TimeDelta,
    pub plan_history_size: usize,
    pub price_sync_cron: String,
}

fn default_power_consumers() -> Vec<PowerConsumerConfig> {
    vec![
        PowerConsumerConfig {
            device_id: "switch.audi_charger_breaker_switch".to_string(),
            name: "Audi charger".to_string(),
            default_duration_minutes: default_duration_minutes(),
            charging_status_url: None,
        },
        PowerConsumerConfig {
            device_id: "switch.smart_plug_socket_1".to_string(),
            name: "One phase switch".to_string(),
            default_duration_minutes: default_duration_minutes(),
            charging_status_url: None,
        },
    ]
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok().filter(|value| !value.is_empty()))
    }

    /// Builds settings from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let time_zone = match lookup("TIME_ZONE") {
            Some(name) => name.parse::<Tz>().map_err(|e| ConfigError::Invalid {
                key: "TIME_ZONE",
                message: e.to_string(),
            })?,
            None => chrono_tz::Europe::Warsaw,
        };

        let home_assistant = match lookup("HA_BASE_URL") {
            Some(base_url) => Some(HomeAssistantConfig {
                base_url,
                token: lookup("HA_TOKEN").ok_or(ConfigError::Missing("HA_TOKEN"))?,
                notify_service: lookup("HA_NOTIFY_SERVICE"),
            }),
            None => None,
        };

        let power_consumers: Vec<PowerConsumerConfig> = match lookup("POWER_CONSUMERS") {
            Some(json) => serde_json::from_str(&json).map_err(|e| ConfigError::Invalid {
                key: "POWER_CONSUMERS",
                message: e.to_string(),
            })?,
            None => default_power_consumers(),
        };
        if let Some(config) = power_consumers.iter().find(|config| {
            TimeDelta::try_minutes(config.default_duration_minutes).is_none_or(|duration| duration <= TimeDelta::zero())
        }) {
            return Err(ConfigError::Invalid {
                key: "POWER_CONSUMERS",
                message: format!(
                    "default_duration_minutes of {} is out of range: {}",
                    config.device_id, config.default_duration_minutes
                ),
            });
        }

        let threshold_secs: i64 = parse_or(&lookup, "SWITCH_ACTION_THRESHOLD_SECS", 15)?;
        let switch_action_threshold = TimeDelta::try_seconds(threshold_secs)
            .filter(|threshold| *threshold >= TimeDelta::zero())
            .ok_or_else(|| ConfigError::Invalid {
                key: "SWITCH_ACTION_THRESHOLD_SECS",
                message: format!("{} is out of range", threshold_secs),
            })?;

        Ok(Self {
            bind_address: lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 8080)?,
            time_zone,
            tariff: parse_or(&lookup, "TARIFF", TariffType::W12)?,
            flat_price: parse_or(&lookup, "G11_PRICE", 120_000)?,
            home_assistant,
            power_consumers,
            switch_action_threshold,
            plan_history_size: parse_or(&lookup, "PLAN_HISTORY_SIZE", 10)?,
            price_sync_cron: lookup("PRICE_SYNC_CRON").unwrap_or_else(|| "0 30 13 * * *".to_string()),
        })
    }
}
