//! Namespace resolution for scheduling tasks
//!
//! A rule may carry the `unspecified` token, which stands for every live
//! namespace that is neither ignored nor claimed by any rule of the policy.

use crate::cluster::Cluster;
use crate::constants::policy::UNSPECIFIED_NAMESPACE;
use crate::state::Group;
use anyhow::Result;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

/// A concrete namespace a task operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetNamespace {
    pub name: String,
    pub group: Group,
}

impl TargetNamespace {
    pub fn new(name: &str, group: Group) -> Self {
        Self {
            name: name.to_string(),
            group,
        }
    }
}

/// Expand the wildcard token against the live namespace list.
///
/// Explicit names keep their position and the `default` group; names produced by
/// the wildcard follow in cluster order with the `unspecified` group.
pub fn resolve_namespaces(
    declared: &[String],
    cluster_namespaces: &[String],
    ignored: &HashSet<String>,
    scheduled: &BTreeSet<String>,
) -> Vec<TargetNamespace> {
    let mut targets: Vec<TargetNamespace> = declared
        .iter()
        .filter(|ns| ns.as_str() != UNSPECIFIED_NAMESPACE)
        .map(|ns| TargetNamespace::new(ns, Group::Default))
        .collect();

    if declared.iter().any(|ns| ns == UNSPECIFIED_NAMESPACE) {
        let mut seen: HashSet<&str> = targets.iter().map(|t| t.name.as_str()).collect();
        let mut expanded = Vec::new();
        for ns in cluster_namespaces {
            if ignored.contains(ns) || scheduled.contains(ns) || !seen.insert(ns.as_str()) {
                continue;
            }
            expanded.push(TargetNamespace::new(ns, Group::Unspecified));
        }
        targets.extend(expanded);
    }

    targets
}

/// Fetch the live namespaces and resolve `declared` against them.
pub async fn resolve_with_cluster(
    cluster: &dyn Cluster,
    declared: &[String],
    ignored: &HashSet<String>,
    scheduled: &BTreeSet<String>,
) -> Result<Vec<TargetNamespace>> {
    let cluster_namespaces = cluster.list_namespaces().await?;
    let targets = resolve_namespaces(declared, &cluster_namespaces, ignored, scheduled);
    debug!(
        "Resolved {:?} to {:?}",
        declared,
        targets.iter().map(|t| t.name.as_str()).collect::<Vec<_>>()
    );
    Ok(targets)
}

/// Declared, non-wildcard namespaces that do not exist in the cluster.
pub async fn missing_namespaces(cluster: &dyn Cluster, declared: &[String]) -> Result<Vec<String>> {
    let live: HashSet<String> = cluster.list_namespaces().await?.into_iter().collect();

    let missing: Vec<String> = declared
        .iter()
        .filter(|ns| ns.as_str() != UNSPECIFIED_NAMESPACE && !live.contains(ns.as_str()))
        .cloned()
        .collect();

    for ns in &missing {
        warn!("Namespace {} from the policy does not exist in the cluster", ns);
    }
    Ok(missing)
}
