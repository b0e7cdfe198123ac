use super::{Cli, Config};
use crate::constants::cluster::SERVICE_ACCOUNT_NAMESPACE_FILE;
use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

pub struct ConfigManager {
    current_config: Arc<Config>,
}

impl ConfigManager {
    /// Load the optional config file, apply command line overrides and fill in
    /// the controller namespace.
    pub async fn new(cli: &Cli) -> Result<Self> {
        let mut config = Self::load_configuration(cli.config.as_deref()).await?;
        cli.apply(&mut config);

        if config.controller_namespace.is_none() {
            config.controller_namespace =
                Self::detect_namespace(Path::new(SERVICE_ACCOUNT_NAMESPACE_FILE)).await;
        }

        config.validate()?;
        Ok(Self {
            current_config: Arc::new(config),
        })
    }

    pub fn get_current_config(&self) -> Arc<Config> {
        self.current_config.clone()
    }

    pub async fn load_configuration(path: Option<&Path>) -> Result<Config> {
        let Some(path) = path else {
            debug!("No config file given, using defaults");
            return Ok(Config::default());
        };

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config {}: {}", path.display(), e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config {}: {}", path.display(), e))?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Namespace from a service-account style file, `None` outside a pod
    pub async fn detect_namespace(path: &Path) -> Option<String> {
        match fs::read_to_string(path).await {
            Ok(content) => {
                let namespace = content.trim();
                if namespace.is_empty() {
                    None
                } else {
                    debug!("Detected controller namespace {}", namespace);
                    Some(namespace.to_string())
                }
            }
            Err(_) => None,
        }
    }
}
