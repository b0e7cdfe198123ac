use super::{Cluster, DeploymentReplicas};
use crate::errors::ClusterError;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Side effect recorded by [`InMemoryCluster`], in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    Scaled {
        namespace: String,
        name: String,
        replicas: i32,
    },
    StateKeyCreated {
        key: String,
    },
    StateWritten {
        key: String,
    },
}

#[derive(Debug, Default)]
struct Inner {
    namespaces: BTreeMap<String, BTreeMap<String, i32>>,
    state_store: Option<BTreeMap<String, String>>,
    failing_scales: HashSet<(String, String)>,
    events: Vec<ClusterEvent>,
}

/// In-process [`Cluster`] keeping namespaces, deployments and the state store in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCluster {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_namespace(&self, namespace: &str, deployments: &[(&str, i32)]) {
        let mut inner = self.inner.write().await;
        let entry = inner.namespaces.entry(namespace.to_string()).or_default();
        for (name, replicas) in deployments {
            entry.insert(name.to_string(), *replicas);
        }
    }

    pub async fn replicas(&self, namespace: &str, name: &str) -> Option<i32> {
        let inner = self.inner.read().await;
        inner
            .namespaces
            .get(namespace)
            .and_then(|deployments| deployments.get(name))
            .copied()
    }

    pub async fn state_store(&self) -> Option<BTreeMap<String, String>> {
        self.inner.read().await.state_store.clone()
    }

    pub async fn set_state_store(&self, data: BTreeMap<String, String>) {
        self.inner.write().await.state_store = Some(data);
    }

    /// Make every scale request for `namespace/name` fail
    pub async fn fail_scaling(&self, namespace: &str, name: &str) {
        self.inner
            .write()
            .await
            .failing_scales
            .insert((namespace.to_string(), name.to_string()));
    }

    /// Let scale requests for `namespace/name` succeed again
    pub async fn recover_scaling(&self, namespace: &str, name: &str) {
        self.inner
            .write()
            .await
            .failing_scales
            .remove(&(namespace.to_string(), name.to_string()));
    }

    pub async fn events(&self) -> Vec<ClusterEvent> {
        self.inner.read().await.events.clone()
    }

    pub async fn clear_events(&self) {
        self.inner.write().await.events.clear();
    }
}

#[async_trait]
impl Cluster for InMemoryCluster {
    async fn list_namespaces(&self) -> Result<Vec<String>> {
        Ok(self.inner.read().await.namespaces.keys().cloned().collect())
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentReplicas>> {
        let inner = self.inner.read().await;
        Ok(inner
            .namespaces
            .get(namespace)
            .map(|deployments| {
                deployments
                    .iter()
                    .map(|(name, replicas)| DeploymentReplicas::new(name, *replicas))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn scale_deployment(&self, namespace: &str, name: &str, replicas: i32) -> Result<()> {
        let mut inner = self.inner.write().await;
        let operation = format!("scale deployment {}/{}", namespace, name);

        if inner
            .failing_scales
            .contains(&(namespace.to_string(), name.to_string()))
        {
            return Err(ClusterError::RequestFailed {
                operation,
                reason: "injected failure".to_string(),
            }
            .into());
        }

        let current = inner
            .namespaces
            .get_mut(namespace)
            .and_then(|deployments| deployments.get_mut(name))
            .ok_or_else(|| ClusterError::RequestFailed {
                operation,
                reason: "deployment not found".to_string(),
            })?;
        *current = replicas;

        inner.events.push(ClusterEvent::Scaled {
            namespace: namespace.to_string(),
            name: name.to_string(),
            replicas,
        });
        Ok(())
    }

    async fn read_state_store(&self) -> Result<Option<BTreeMap<String, String>>> {
        Ok(self.inner.read().await.state_store.clone())
    }

    async fn create_state_store_key(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .state_store
            .get_or_insert_with(BTreeMap::new)
            .entry(key.to_string())
            .or_default();
        inner.events.push(ClusterEvent::StateKeyCreated {
            key: key.to_string(),
        });
        Ok(())
    }

    async fn write_state_store(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .state_store
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        inner.events.push(ClusterEvent::StateWritten {
            key: key.to_string(),
        });
        Ok(())
    }

    async fn ensure_state_store(&self) -> Result<()> {
        self.inner
            .write()
            .await
            .state_store
            .get_or_insert_with(BTreeMap::new);
        Ok(())
    }
}
