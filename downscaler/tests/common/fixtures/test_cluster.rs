//! In-memory clusters pre-populated for the scenarios under test

use downscaler::cluster::InMemoryCluster;
use downscaler::state::{read_record, Apps};

/// `ns-a`, `ns-b`, `ns-c` and `kube-system`, each with a couple of deployments
pub async fn three_namespace_cluster() -> InMemoryCluster {
    let cluster = InMemoryCluster::new();
    cluster.add_namespace("ns-a", &[("api", 3), ("web", 2)]).await;
    cluster.add_namespace("ns-b", &[("worker", 4)]).await;
    cluster.add_namespace("ns-c", &[("cron", 1)]).await;
    cluster.add_namespace("kube-system", &[("coredns", 2)]).await;
    cluster
}

/// Decoded state record of `namespace`, if any
pub async fn record_of(cluster: &InMemoryCluster, namespace: &str) -> Option<Apps> {
    let data = cluster.state_store().await?;
    read_record(&data, namespace).ok().flatten()
}
