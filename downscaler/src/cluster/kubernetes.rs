use super::{Cluster, DeploymentReplicas};
use crate::constants::cluster::{FIELD_MANAGER, REQUEST_TIMEOUT};
use crate::errors::ClusterError;
use anyhow::Result;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;
use std::collections::BTreeMap;
use std::future::Future;
use tracing::{debug, info};

// Deployments without an explicit count run one replica
const DEFAULT_REPLICAS: i32 = 1;

/// [`Cluster`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    state_store_name: String,
    state_store_namespace: String,
}

impl KubeCluster {
    pub fn new(client: Client, state_store_name: &str, state_store_namespace: &str) -> Self {
        Self {
            client,
            state_store_name: state_store_name.to_string(),
            state_store_namespace: state_store_namespace.to_string(),
        }
    }

    fn state_store(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &self.state_store_namespace)
    }

    fn patch_params() -> PatchParams {
        PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }

    async fn patch_state_store(&self, operation: &str, key: &str, value: &str) -> Result<()> {
        let patch = json!({ "data": { key: value } });
        timed(
            operation,
            self.state_store().patch(
                &self.state_store_name,
                &Self::patch_params(),
                &Patch::Merge(&patch),
            ),
        )
        .await?;
        Ok(())
    }
}

/// Bound a single API request by [`REQUEST_TIMEOUT`] and map its failure.
async fn timed<T, F>(operation: &str, request: F) -> Result<T, ClusterError>
where
    F: Future<Output = Result<T, kube::Error>>,
{
    match tokio::time::timeout(REQUEST_TIMEOUT, request).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ClusterError::RequestFailed {
            operation: operation.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(ClusterError::Timeout {
            operation: operation.to_string(),
        }),
    }
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = timed("list namespaces", api.list(&ListParams::default())).await?;

        Ok(list
            .items
            .into_iter()
            .filter_map(|ns| ns.metadata.name)
            .collect())
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentReplicas>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let operation = format!("list deployments in {}", namespace);
        let list = timed(&operation, api.list(&ListParams::default())).await?;

        Ok(list
            .items
            .into_iter()
            .filter_map(|deployment| {
                let replicas = deployment
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.replicas)
                    .unwrap_or(DEFAULT_REPLICAS);
                deployment
                    .metadata
                    .name
                    .map(|name| DeploymentReplicas { name, replicas })
            })
            .collect())
    }

    async fn scale_deployment(&self, namespace: &str, name: &str, replicas: i32) -> Result<()> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "spec": { "replicas": replicas } });
        let operation = format!("scale deployment {}/{}", namespace, name);

        timed(
            &operation,
            api.patch(name, &Self::patch_params(), &Patch::Merge(&patch)),
        )
        .await?;

        debug!("Scaled deployment {}/{} to {} replicas", namespace, name, replicas);
        Ok(())
    }

    async fn read_state_store(&self) -> Result<Option<BTreeMap<String, String>>> {
        let config_map = timed(
            "read state store",
            self.state_store().get_opt(&self.state_store_name),
        )
        .await?;

        Ok(config_map.map(|cm| cm.data.unwrap_or_default()))
    }

    async fn create_state_store_key(&self, key: &str) -> Result<()> {
        self.patch_state_store("create state store key", key, "").await
    }

    async fn write_state_store(&self, key: &str, value: &str) -> Result<()> {
        self.patch_state_store("write state store", key, value).await
    }

    async fn ensure_state_store(&self) -> Result<()> {
        let api = self.state_store();
        let existing = timed("read state store", api.get_opt(&self.state_store_name)).await?;
        if existing.is_some() {
            debug!(
                "State store {}/{} already exists",
                self.state_store_namespace, self.state_store_name
            );
            return Ok(());
        }

        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.state_store_name.clone()),
                namespace: Some(self.state_store_namespace.clone()),
                ..Default::default()
            },
            data: Some(BTreeMap::new()),
            ..Default::default()
        };

        match api.create(&PostParams::default(), &config_map).await {
            Ok(_) => {
                info!(
                    "Created state store {}/{}",
                    self.state_store_namespace, self.state_store_name
                );
                Ok(())
            }
            // Another replica won the race
            Err(kube::Error::Api(response)) if response.code == 409 => Ok(()),
            Err(e) => Err(ClusterError::RequestFailed {
                operation: "create state store".to_string(),
                reason: e.to_string(),
            }
            .into()),
        }
    }
}
