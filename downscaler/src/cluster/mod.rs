//! Cluster collaborator contract
//!
//! The scheduling engine only talks to the cluster through [`Cluster`]. The live
//! implementation is [`KubeCluster`]; [`InMemoryCluster`] backs tests and local
//! dry runs.

pub mod kubernetes;
pub mod memory;

pub use kubernetes::KubeCluster;
pub use memory::InMemoryCluster;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Name and current desired replica count of a deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentReplicas {
    pub name: String,
    pub replicas: i32,
}

impl DeploymentReplicas {
    pub fn new(name: &str, replicas: i32) -> Self {
        Self {
            name: name.to_string(),
            replicas,
        }
    }
}

#[async_trait]
pub trait Cluster: Send + Sync {
    async fn list_namespaces(&self) -> Result<Vec<String>>;

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentReplicas>>;

    async fn scale_deployment(&self, namespace: &str, name: &str, replicas: i32) -> Result<()>;

    /// Data of the state store, `None` when the store itself does not exist
    async fn read_state_store(&self) -> Result<Option<BTreeMap<String, String>>>;

    /// Add `key` with an empty value so later merge patches have a target
    async fn create_state_store_key(&self, key: &str) -> Result<()>;

    async fn write_state_store(&self, key: &str, value: &str) -> Result<()>;

    /// Create the state store when it does not exist yet
    async fn ensure_state_store(&self) -> Result<()>;
}
