use super::{Config, LogFormat};
use clap::Parser;
use std::path::PathBuf;

/// Scales deployments to zero outside their active window and restores them afterwards
#[derive(Debug, Parser)]
#[command(name = "downscaler", version, about)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, env = "DOWNSCALER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Local ConfigMap manifest carrying the initial policy
    #[arg(long, env = "DOWNSCALER_POLICY_FILE")]
    pub policy_file: Option<PathBuf>,

    /// Restore replicas at the end of off-hours (false: downscale only)
    #[arg(long, env = "DOWNSCALER_ENABLE_UPSCALING")]
    pub enable_upscaling: Option<bool>,

    #[arg(long, env = "DOWNSCALER_POLICY_CONFIG_MAP")]
    pub policy_config_map: Option<String>,

    #[arg(long, env = "DOWNSCALER_POLICY_NAMESPACE")]
    pub policy_namespace: Option<String>,

    #[arg(long, env = "DOWNSCALER_STATE_STORE_NAME")]
    pub state_store_name: Option<String>,

    #[arg(long, env = "DOWNSCALER_STATE_STORE_NAMESPACE")]
    pub state_store_namespace: Option<String>,

    #[arg(long, env = "DOWNSCALER_NAMESPACE")]
    pub controller_namespace: Option<String>,

    /// Timezone used until a policy provides one
    #[arg(long, env = "DOWNSCALER_DEFAULT_TIMEZONE")]
    pub default_timezone: Option<String>,

    #[arg(long, env = "DOWNSCALER_POLL_INTERVAL_SECONDS")]
    pub poll_interval_seconds: Option<u64>,

    #[arg(long, value_enum, env = "DOWNSCALER_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,
}

impl Cli {
    /// Overwrite file values with every flag that was given.
    pub fn apply(&self, config: &mut Config) {
        if let Some(enabled) = self.enable_upscaling {
            config.enable_upscaling = enabled;
        }
        if let Some(name) = &self.policy_config_map {
            config.policy_config_map = name.clone();
        }
        if let Some(namespace) = &self.policy_namespace {
            config.policy_namespace = Some(namespace.clone());
        }
        if let Some(name) = &self.state_store_name {
            config.state_store_name = name.clone();
        }
        if let Some(namespace) = &self.state_store_namespace {
            config.state_store_namespace = Some(namespace.clone());
        }
        if let Some(namespace) = &self.controller_namespace {
            config.controller_namespace = Some(namespace.clone());
        }
        if let Some(timezone) = &self.default_timezone {
            config.default_timezone = timezone.clone();
        }
        if let Some(seconds) = self.poll_interval_seconds {
            config.poll_interval_seconds = seconds;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
    }
}
