//! Policy reconciler behaviour across consecutive policies

mod common;

use common::fixtures::*;
use downscaler::cluster::InMemoryCluster;
use downscaler::errors::PolicyError;
use downscaler::policy::Policy;
use downscaler::scaling::Scaler;
use downscaler::schedule::FixedClock;
use downscaler::scheduler::{PolicyReconciler, ReconcilerSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn reconciler(cluster: &InMemoryCluster, clock: &FixedClock) -> PolicyReconciler {
    PolicyReconciler::new(
        Arc::new(cluster.clone()),
        Arc::new(Scaler::new(Arc::new(cluster.clone()), "downscaler", true)),
        Arc::new(clock.clone()),
        ReconcilerSettings {
            poll_interval: TEST_POLL_INTERVAL,
            pacing: Duration::from_millis(1),
            shutdown_grace: Duration::from_secs(1),
        },
        chrono_tz::UTC,
    )
}

#[tokio::test]
async fn test_second_policy_replaces_first() {
    let cluster = three_namespace_cluster().await;
    let clock = FixedClock::new(tuesday(12, 0));
    let mut reconciler = reconciler(&cluster, &clock);

    let first = PolicyBuilder::new()
        .rule(&["ns-a"], "06:00-22:00")
        .rule(&["ns-b"], "07:00-21:00")
        .build();
    let second = PolicyBuilder::new()
        .time_zone("Europe/Berlin")
        .rule(&["ns-c"], "08:00-20:00")
        .build();

    assert_eq!(reconciler.apply_policy(&first).await, Ok(2));
    assert_eq!(
        reconciler.running_task_keys(),
        vec!["06:00-22:00ns-a".to_string(), "07:00-21:00ns-b".to_string()]
    );

    assert_eq!(reconciler.apply_policy(&second).await, Ok(1));
    assert_eq!(reconciler.running_task_keys(), vec!["08:00-20:00ns-c".to_string()]);
    assert_eq!(reconciler.timezone(), chrono_tz::Europe::Berlin);

    reconciler.shutdown().await;
    assert!(reconciler.running_task_keys().is_empty());
}

#[tokio::test]
async fn test_invalid_policy_keeps_running_tasks() {
    let cluster = three_namespace_cluster().await;
    let clock = FixedClock::new(tuesday(12, 0));
    let mut reconciler = reconciler(&cluster, &clock);

    let valid = PolicyBuilder::new().rule(&["ns-a"], "06:00-22:00").build();
    reconciler.apply_policy(&valid).await.unwrap();

    let invalid = PolicyBuilder::new()
        .time_zone("Not/AZone")
        .operator("include")
        .rule(&["ns-b"], "06:00-22:00")
        .build();
    let errors = reconciler.apply_policy(&invalid).await.unwrap_err();

    assert_eq!(errors.len(), 2);
    assert!(errors.contains(&PolicyError::InvalidTimeZone {
        timezone: "Not/AZone".to_string()
    }));
    assert_eq!(reconciler.running_task_keys(), vec!["06:00-22:00ns-a".to_string()]);
    assert_eq!(reconciler.timezone(), chrono_tz::UTC);

    reconciler.shutdown().await;
}

#[tokio::test]
async fn test_ignored_set_replaced_only_by_exclude() {
    let cluster = three_namespace_cluster().await;
    let clock = FixedClock::new(tuesday(12, 0));
    let mut reconciler = reconciler(&cluster, &clock);

    let exclude = PolicyBuilder::new()
        .exclude(&["kube-system", "ns-b"])
        .rule(&["ns-a"], "06:00-22:00")
        .build();
    reconciler.apply_policy(&exclude).await.unwrap();
    assert!(reconciler.ignored_namespaces().contains("ns-b"));

    let not_exclude = PolicyBuilder::new()
        .operator("notExclude")
        .exclude(&["ns-c"])
        .rule(&["ns-a"], "06:00-22:00")
        .build();
    reconciler.apply_policy(&not_exclude).await.unwrap();
    assert!(reconciler.ignored_namespaces().contains("ns-b"));
    assert!(!reconciler.ignored_namespaces().contains("ns-c"));

    let replace = PolicyBuilder::new()
        .exclude(&["ns-c"])
        .rule(&["ns-a"], "06:00-22:00")
        .build();
    reconciler.apply_policy(&replace).await.unwrap();
    assert_eq!(reconciler.ignored_namespaces().len(), 1);
    assert!(reconciler.ignored_namespaces().contains("ns-c"));

    reconciler.shutdown().await;
}

#[tokio::test]
async fn test_run_loop_applies_policies_until_shutdown() {
    let cluster = three_namespace_cluster().await;
    let clock = FixedClock::new(tuesday(23, 0));
    let reconciler = reconciler(&cluster, &clock);

    let (tx, rx) = mpsc::channel::<Policy>(4);
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(reconciler.run(rx, shutdown.clone()));

    tx.send(PolicyBuilder::new().rule(&["ns-b"], "06:00-22:00").build())
        .await
        .unwrap();
    assert!(eventually(|| async { cluster.replicas("ns-b", "worker").await == Some(0) }).await);
    assert_eq!(cluster.replicas("ns-a", "api").await, Some(3));

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_unknown_recurrence_keeps_running_tasks() {
    let cluster = three_namespace_cluster().await;
    let clock = FixedClock::new(tuesday(12, 0));
    let mut reconciler = reconciler(&cluster, &clock);

    let valid = PolicyBuilder::new().rule(&["ns-a"], "06:00-22:00").build();
    reconciler.apply_policy(&valid).await.unwrap();

    let unknown = PolicyBuilder::new()
        .recurrence("FOO-BAR")
        .rule(&["ns-b"], "06:00-22:00")
        .build();
    assert_eq!(
        reconciler.apply_policy(&unknown).await,
        Err(vec![PolicyError::InvalidRecurrence {
            recurrence: "FOO-BAR".to_string()
        }])
    );
    assert_eq!(reconciler.running_task_keys(), vec!["06:00-22:00ns-a".to_string()]);
    assert_eq!(reconciler.recurrence(), "MON-FRI");

    reconciler.shutdown().await;
}
