//! Policy ConfigMap watcher
//!
//! Watches the policy ConfigMap and forwards each new policy document, decoded
//! into a [`Policy`], to the reconciler channel. The watch stream reconnects with
//! backoff on its own; relists only forward a document that actually changed.

use crate::constants::policy::POLICY_KEY;
use crate::policy::Policy;
use anyhow::{anyhow, Result};
use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How a policy document reached the watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// A live modification
    Update,
    /// Part of an initial list or relist
    Relist,
}

/// Drops relisted documents identical to the last forwarded one
#[derive(Debug, Default)]
pub struct PolicyFilter {
    last_forwarded: Option<String>,
}

impl PolicyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `raw` should be forwarded, remembering it when it is
    pub fn accept(&mut self, delivery: Delivery, raw: &str) -> bool {
        if delivery == Delivery::Relist && self.last_forwarded.as_deref() == Some(raw) {
            return false;
        }
        self.last_forwarded = Some(raw.to_string());
        true
    }
}

pub struct PolicyWatcher {
    api: Api<ConfigMap>,
    name: String,
    namespace: String,
    sender: mpsc::Sender<Policy>,
    filter: PolicyFilter,
}

impl PolicyWatcher {
    pub fn new(client: Client, name: &str, namespace: &str, sender: mpsc::Sender<Policy>) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.to_string(),
            namespace: namespace.to_string(),
            sender,
            filter: PolicyFilter::new(),
        }
    }

    /// Read the policy once before watching, `None` when the ConfigMap does not exist yet.
    pub async fn load_initial(&mut self) -> Result<Option<Policy>> {
        let Some(config_map) = self
            .api
            .get_opt(&self.name)
            .await
            .map_err(|e| anyhow!("Failed to read policy {}/{}: {}", self.namespace, self.name, e))?
        else {
            warn!(
                "Policy ConfigMap {}/{} not found, waiting for it to be created",
                self.namespace, self.name
            );
            return Ok(None);
        };

        let data = config_map.data.unwrap_or_default();
        let policy = Policy::from_config_map_data(&data)
            .map_err(|e| anyhow!("Invalid policy in {}/{}: {}", self.namespace, self.name, e))?;

        if let Some(raw) = data.get(POLICY_KEY) {
            self.filter.accept(Delivery::Update, raw);
        }
        info!("Loaded initial policy from {}/{}", self.namespace, self.name);
        Ok(Some(policy))
    }

    /// Watch until `shutdown` fires or the reconciler goes away.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let config = watcher::Config::default().fields(&format!("metadata.name={}", self.name));
        let mut stream = watcher(self.api.clone(), config).default_backoff().boxed();

        info!("Watching policy ConfigMap {}/{}", self.namespace, self.name);

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = stream.next() => event,
            };

            let (delivery, config_map) = match event {
                Some(Ok(watcher::Event::Apply(cm))) => (Delivery::Update, cm),
                Some(Ok(watcher::Event::InitApply(cm))) => (Delivery::Relist, cm),
                Some(Ok(watcher::Event::Delete(_))) => {
                    warn!("Policy ConfigMap deleted, running tasks are kept");
                    continue;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!("Policy watch error: {}", e);
                    continue;
                }
                None => {
                    error!("Policy watch stream ended");
                    break;
                }
            };

            if !self.forward(delivery, config_map).await {
                break;
            }
        }

        info!("Policy watcher stopped");
    }

    /// Decode and send one event, `false` once the receiver is gone
    async fn forward(&mut self, delivery: Delivery, config_map: ConfigMap) -> bool {
        let data = config_map.data.unwrap_or_default();
        let Some(raw) = data.get(POLICY_KEY) else {
            warn!("Policy ConfigMap has no {} key", POLICY_KEY);
            return true;
        };

        if !self.filter.accept(delivery, raw) {
            debug!("Relisted policy unchanged, not forwarding");
            return true;
        }

        let policy = match Policy::from_yaml(raw) {
            Ok(policy) => policy,
            Err(e) => {
                error!("Ignoring policy update: {}", e);
                return true;
            }
        };

        self.sender.send(policy).await.is_ok()
    }
}
