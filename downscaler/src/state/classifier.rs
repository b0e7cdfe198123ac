//! Replica-state classification
//!
//! Derives the logical state of a namespace group from the persisted records by
//! averaging the state codes of every tracked deployment: an average of 0 means
//! the group is downscaled, 1 means it is upscaled.

use super::{read_record, NamespaceStatus, TaskControl};
use crate::cluster::Cluster;
use crate::errors::{DownscalerError, StateError};
use std::collections::BTreeMap;
use tracing::debug;

/// Map an integer average of state codes onto a data state.
///
/// `count == 0` and averages other than the two known codes are errors.
pub fn classify_average(sum: i64, count: i64) -> Result<TaskControl, StateError> {
    if count == 0 {
        return Err(StateError::NoTrackedDeployments);
    }

    match sum / count {
        TaskControl::DOWNSCALED_CODE => Ok(TaskControl::DeploymentsWithDownscaledState),
        TaskControl::UPSCALED_CODE => Ok(TaskControl::DeploymentsWithUpscaledState),
        average => Err(StateError::UnclassifiedAverage { average }),
    }
}

/// Classify the records of `namespaces` within an already loaded state map.
pub fn classify_state_map(
    data: Option<&BTreeMap<String, String>>,
    namespaces: &[String],
) -> Result<TaskControl, StateError> {
    let Some(data) = data else {
        return Ok(TaskControl::AppStartupWithNoDataWrite);
    };

    let mut records = Vec::with_capacity(namespaces.len());
    for namespace in namespaces {
        match read_record(data, namespace)? {
            Some(record) => records.push(record),
            None => {
                debug!("No state record for namespace {}", namespace);
                return Ok(TaskControl::AppStartupWithNoDataWrite);
            }
        }
    }

    let mut sum = 0i64;
    let mut count = 0i64;
    for record in records {
        if record.status == NamespaceStatus::Empty && record.state.is_empty() {
            continue;
        }
        for fingerprint in record.fingerprints()? {
            sum += fingerprint.state_code;
            count += 1;
        }
    }

    classify_average(sum, count)
}

/// Read the state store and classify the group formed by `namespaces`.
///
/// Returns `UpscalingDeactivated` without touching the store when state tracking is off.
pub async fn inspect_replicas_state(
    cluster: &dyn Cluster,
    namespaces: &[String],
    upscaling_enabled: bool,
) -> Result<TaskControl, DownscalerError> {
    if !upscaling_enabled {
        return Ok(TaskControl::UpscalingDeactivated);
    }

    let data = cluster.read_state_store().await?;
    Ok(classify_state_map(data.as_ref(), namespaces)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{state_key, Apps, Fingerprint, Group};
    use test_case::test_case;

    fn record(fingerprints: &[&str]) -> String {
        let fingerprints: Vec<Fingerprint> =
            fingerprints.iter().map(|f| f.parse().unwrap()).collect();
        Apps::from_fingerprints(Group::Default, &fingerprints)
            .to_yaml()
            .unwrap()
    }

    fn namespaces(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test_case(0, 3, Ok(TaskControl::DeploymentsWithDownscaledState); "all downscaled")]
    #[test_case(3, 3, Ok(TaskControl::DeploymentsWithUpscaledState); "all upscaled")]
    #[test_case(1, 3, Ok(TaskControl::DeploymentsWithDownscaledState); "mixed rounds down")]
    #[test_case(0, 0, Err(StateError::NoTrackedDeployments); "nothing tracked")]
    #[test_case(6, 3, Err(StateError::UnclassifiedAverage { average: 2 }); "unknown code")]
    fn test_classify_average(sum: i64, count: i64, expected: Result<TaskControl, StateError>) {
        assert_eq!(classify_average(sum, count), expected);
    }

    #[test]
    fn test_missing_store_means_first_run() {
        assert_eq!(
            classify_state_map(None, &namespaces(&["ns-a"])),
            Ok(TaskControl::AppStartupWithNoDataWrite)
        );
    }

    #[test]
    fn test_missing_namespace_key_means_first_run() {
        let mut data = BTreeMap::new();
        data.insert(state_key("ns-a"), record(&["default,api,3,0"]));

        assert_eq!(
            classify_state_map(Some(&data), &namespaces(&["ns-a", "ns-b"])),
            Ok(TaskControl::AppStartupWithNoDataWrite)
        );
    }

    #[test]
    fn test_downscaled_and_upscaled_groups() {
        let mut data = BTreeMap::new();
        data.insert(
            state_key("ns-a"),
            record(&["default,api,0,0", "default,web,0,0"]),
        );
        data.insert(state_key("ns-b"), record(&["default,worker,0,0"]));
        data.insert(
            state_key("ns-c"),
            record(&["default,api,1,1", "default,web,1,1"]),
        );

        assert_eq!(
            classify_state_map(Some(&data), &namespaces(&["ns-a", "ns-b"])),
            Ok(TaskControl::DeploymentsWithDownscaledState)
        );
        assert_eq!(
            classify_state_map(Some(&data), &namespaces(&["ns-c"])),
            Ok(TaskControl::DeploymentsWithUpscaledState)
        );
    }

    #[test]
    fn test_records_of_other_namespaces_are_ignored() {
        let mut data = BTreeMap::new();
        data.insert(state_key("ns-a"), record(&["default,api,4,0"]));
        data.insert(state_key("ns-x"), "state: [broken".to_string());

        assert_eq!(
            classify_state_map(Some(&data), &namespaces(&["ns-a"])),
            Ok(TaskControl::DeploymentsWithDownscaledState)
        );
    }

    #[test]
    fn test_empty_namespaces_only_is_an_error() {
        let mut data = BTreeMap::new();
        data.insert(state_key("ns-a"), record(&[]));

        assert_eq!(
            classify_state_map(Some(&data), &namespaces(&["ns-a"])),
            Err(StateError::NoTrackedDeployments)
        );
    }

    #[test]
    fn test_corrupt_fingerprint_is_an_error() {
        let mut data = BTreeMap::new();
        data.insert(
            state_key("ns-a"),
            "status: not_empty\ngroup: default\nstate:\n- default,api,x,0\n".to_string(),
        );

        assert!(matches!(
            classify_state_map(Some(&data), &namespaces(&["ns-a"])),
            Err(StateError::InvalidNumber { .. })
        ));
    }
}
