use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::control::supervisor::SupervisorSettings;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig {
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// The paired Volcano, as printed by `scan`.
    pub device_address: Option<String>,
    pub reconnect: ReconnectConfig,
    pub health_check_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_address: None,
            reconnect: ReconnectConfig::default(),
            health_check_interval_ms: 5000,
        }
    }
}

impl Config {
    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            reconnect_initial_delay: Duration::from_millis(self.reconnect.initial_delay_ms.max(1)),
            reconnect_max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
            health_check_interval: Duration::from_millis(self.health_check_interval_ms.max(100)),
        }
    }
}
