//! Downscale and upscale operations
//!
//! Downscaling captures every deployment of a namespace as a fingerprint, persists
//! the record and only then scales the deployments to zero. Upscaling reads the
//! record back, restores the captured counts and flips the state codes.

use crate::cluster::Cluster;
use crate::scheduler::namespaces::TargetNamespace;
use crate::state::{read_record, state_key, Apps, Fingerprint, TaskControl};
use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Outcome of one downscale or upscale pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScalingReport {
    pub namespaces: usize,
    pub deployments: usize,
    pub failures: usize,
}

pub struct Scaler {
    cluster: Arc<dyn Cluster>,
    controller_namespace: String,
    upscaling_enabled: bool,
}

impl Scaler {
    pub fn new(cluster: Arc<dyn Cluster>, controller_namespace: &str, upscaling_enabled: bool) -> Self {
        Self {
            cluster,
            controller_namespace: controller_namespace.to_string(),
            upscaling_enabled,
        }
    }

    pub fn upscaling_enabled(&self) -> bool {
        self.upscaling_enabled
    }

    /// Order targets for downscaling: ignored namespaces dropped, the controller's own namespace last.
    pub fn downscale_order(
        &self,
        targets: &[TargetNamespace],
        ignored: &HashSet<String>,
    ) -> Vec<TargetNamespace> {
        let (own, mut others): (Vec<_>, Vec<_>) = targets
            .iter()
            .filter(|t| !ignored.contains(&t.name))
            .cloned()
            .partition(|t| t.name == self.controller_namespace);

        if !own.is_empty() {
            info!(
                "Namespace {} hosts the downscaler and will be downscaled last",
                self.controller_namespace
            );
        }
        others.extend(own);
        others
    }

    /// Scale every deployment of `targets` to zero, recording what was running.
    #[instrument(skip(self, targets, ignored))]
    pub async fn downscale(
        &self,
        targets: &[TargetNamespace],
        ignored: &HashSet<String>,
    ) -> Result<ScalingReport> {
        let known = if self.upscaling_enabled {
            self.cluster.read_state_store().await?.unwrap_or_default()
        } else {
            BTreeMap::new()
        };

        let mut report = ScalingReport::default();
        for target in self.downscale_order(targets, ignored) {
            match self.downscale_namespace(&target, &known).await {
                Ok((scaled, failed)) => {
                    report.namespaces += 1;
                    report.deployments += scaled;
                    report.failures += failed;
                }
                Err(e) => {
                    error!("Failed to downscale namespace {}: {}", target.name, e);
                    report.failures += 1;
                }
            }
        }

        info!(
            "Downscaled {} deployments across {} namespaces ({} failures)",
            report.deployments, report.namespaces, report.failures
        );

        if report.failures > 0 {
            return Err(anyhow!("downscale finished with {} failures", report.failures));
        }
        Ok(report)
    }

    async fn downscale_namespace(
        &self,
        target: &TargetNamespace,
        known: &BTreeMap<String, String>,
    ) -> Result<(usize, usize)> {
        // A namespace already recorded as downscaled keeps its captured counts
        if let Some(record) = read_record(known, &target.name)? {
            let fingerprints = record.fingerprints()?;
            let already_down = !fingerprints.is_empty()
                && fingerprints
                    .iter()
                    .all(|f| f.state_code == TaskControl::DOWNSCALED_CODE);
            if already_down {
                debug!("Namespace {} already recorded as downscaled", target.name);
                let names: Vec<&str> = fingerprints.iter().map(|f| f.deployment.as_str()).collect();
                return Ok(self.scale_to_zero(&target.name, &names).await);
            }
        }

        let deployments = self.cluster.list_deployments(&target.name).await?;
        let fingerprints: Vec<Fingerprint> = deployments
            .iter()
            .map(|d| {
                Fingerprint::new(
                    target.group,
                    &d.name,
                    d.replicas,
                    TaskControl::DeploymentsWithDownscaledState,
                )
            })
            .collect();

        if self.upscaling_enabled {
            let record = Apps::from_fingerprints(target.group, &fingerprints);
            self.persist(&target.name, &record, known).await?;
        }

        let names: Vec<&str> = deployments.iter().map(|d| d.name.as_str()).collect();
        Ok(self.scale_to_zero(&target.name, &names).await)
    }

    async fn scale_to_zero(&self, namespace: &str, names: &[&str]) -> (usize, usize) {
        let mut scaled = 0;
        let mut failed = 0;
        for name in names {
            match self.cluster.scale_deployment(namespace, name, 0).await {
                Ok(()) => scaled += 1,
                Err(e) => {
                    error!("Failed to downscale {}/{}: {}", namespace, name, e);
                    failed += 1;
                }
            }
        }
        (scaled, failed)
    }

    /// Restore the captured replica counts of `namespaces`.
    #[instrument(skip(self, namespaces))]
    pub async fn upscale(&self, namespaces: &[String]) -> Result<ScalingReport> {
        let data = self
            .cluster
            .read_state_store()
            .await?
            .ok_or_else(|| anyhow!("state store does not exist"))?;

        let mut report = ScalingReport::default();
        for namespace in namespaces {
            let Some(record) = read_record(&data, namespace)? else {
                warn!("No state record for namespace {}, nothing to restore", namespace);
                continue;
            };

            let (restored, failed) = self.upscale_namespace(namespace, &record, &data).await?;
            report.namespaces += 1;
            report.deployments += restored;
            report.failures += failed;
        }

        info!(
            "Upscaled {} deployments across {} namespaces ({} failures)",
            report.deployments, report.namespaces, report.failures
        );
        Ok(report)
    }

    async fn upscale_namespace(
        &self,
        namespace: &str,
        record: &Apps,
        known: &BTreeMap<String, String>,
    ) -> Result<(usize, usize)> {
        let mut restored = 0;
        let mut failed = 0;
        let mut updated = Vec::new();

        for fingerprint in record.fingerprints()? {
            if fingerprint.state_code == TaskControl::UPSCALED_CODE {
                updated.push(fingerprint);
                continue;
            }

            match self
                .cluster
                .scale_deployment(namespace, &fingerprint.deployment, fingerprint.replicas)
                .await
            {
                Ok(()) => {
                    restored += 1;
                    updated.push(fingerprint.with_state(TaskControl::DeploymentsWithUpscaledState));
                }
                Err(e) => {
                    error!(
                        "Failed to restore {}/{} to {} replicas: {}",
                        namespace, fingerprint.deployment, fingerprint.replicas, e
                    );
                    failed += 1;
                    updated.push(fingerprint);
                }
            }
        }

        let mut next = Apps::from_fingerprints(record.group, &updated);
        next.status = record.status;
        self.persist(namespace, &next, known).await?;

        Ok((restored, failed))
    }

    async fn persist(
        &self,
        namespace: &str,
        record: &Apps,
        known: &BTreeMap<String, String>,
    ) -> Result<()> {
        let key = state_key(namespace);
        if !known.contains_key(&key) {
            self.cluster.create_state_store_key(&key).await?;
        }

        let value = record
            .to_yaml()
            .map_err(|e| anyhow!("Failed to encode state record {}: {}", key, e))?;
        self.cluster.write_state_store(&key, &value).await?;
        debug!("Persisted {} ({})", key, record.status.as_str());
        Ok(())
    }
}
