pub mod cli;
pub mod manager;

pub use cli::Cli;
pub use manager::ConfigManager;

use crate::constants::defaults;
use anyhow::{anyhow, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_enable_upscaling")]
    pub enable_upscaling: bool,
    #[serde(default = "default_policy_config_map")]
    pub policy_config_map: String,
    pub policy_namespace: Option<String>,
    #[serde(default = "default_state_store_name")]
    pub state_store_name: String,
    pub state_store_namespace: Option<String>,
    /// Namespace the controller runs in, detected when unset
    pub controller_namespace: Option<String>,
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_reconcile_pacing")]
    pub reconcile_pacing_seconds: u64,
    #[serde(default = "default_task_shutdown_grace")]
    pub task_shutdown_grace_seconds: u64,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_enable_upscaling() -> bool {
    true
}

fn default_policy_config_map() -> String {
    defaults::POLICY_CONFIG_MAP.to_string()
}

fn default_state_store_name() -> String {
    defaults::STATE_STORE_NAME.to_string()
}

fn default_timezone() -> String {
    defaults::TIMEZONE.to_string()
}

fn default_poll_interval() -> u64 {
    defaults::POLL_INTERVAL_SECONDS
}

fn default_reconcile_pacing() -> u64 {
    defaults::RECONCILE_PACING_SECONDS
}

fn default_task_shutdown_grace() -> u64 {
    defaults::TASK_SHUTDOWN_GRACE_SECONDS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_upscaling: default_enable_upscaling(),
            policy_config_map: default_policy_config_map(),
            policy_namespace: None,
            state_store_name: default_state_store_name(),
            state_store_namespace: None,
            controller_namespace: None,
            default_timezone: default_timezone(),
            poll_interval_seconds: default_poll_interval(),
            reconcile_pacing_seconds: default_reconcile_pacing(),
            task_shutdown_grace_seconds: default_task_shutdown_grace(),
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    pub fn controller_namespace(&self) -> &str {
        self.controller_namespace
            .as_deref()
            .unwrap_or(defaults::CONTROLLER_NAMESPACE)
    }

    pub fn policy_namespace(&self) -> &str {
        self.policy_namespace
            .as_deref()
            .unwrap_or_else(|| self.controller_namespace())
    }

    pub fn state_store_namespace(&self) -> &str {
        self.state_store_namespace
            .as_deref()
            .unwrap_or_else(|| self.controller_namespace())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn reconcile_pacing(&self) -> Duration {
        Duration::from_secs(self.reconcile_pacing_seconds)
    }

    pub fn task_shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.task_shutdown_grace_seconds)
    }

    /// The fallback timezone, which must be a loadable IANA zone
    pub fn default_timezone(&self) -> Result<Tz> {
        self.default_timezone
            .parse::<Tz>()
            .map_err(|_| anyhow!("Invalid default timezone '{}'", self.default_timezone))
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_seconds == 0 {
            return Err(anyhow!("poll_interval_seconds must be greater than zero"));
        }
        if self.policy_config_map.is_empty() || self.state_store_name.is_empty() {
            return Err(anyhow!("ConfigMap names must not be empty"));
        }
        self.default_timezone()?;
        Ok(())
    }
}
