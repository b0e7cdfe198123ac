//! Persisted replica state
//!
//! Every namespace handled by a task owns one record in the state store under the
//! key `<namespace>.yaml`:
//!
//! ```yaml
//! status: not_empty
//! group: default
//! state:
//!   - default,api,3,0
//! ```
//!
//! Each `state` entry is a fingerprint `group,deployment,replicas,stateCode` where
//! `stateCode` is the [`TaskControl`] code captured with it.

pub mod classifier;

pub use classifier::{classify_average, classify_state_map, inspect_replicas_state};

use crate::constants::state::{
    FINGERPRINT_FIELDS, GROUP_DEFAULT, GROUP_UNSPECIFIED, KEY_SUFFIX, STATUS_EMPTY,
    STATUS_NOT_EMPTY,
};
use crate::errors::StateError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Task control signals and replica state classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskControl {
    InspectError,
    KillCurrentRoutine,
    RestartRoutine,
    DeploymentsWithDownscaledState,
    DeploymentsWithUpscaledState,
    AppStartupWithNoDataWrite,
    UpscalingDeactivated,
}

impl TaskControl {
    pub const DOWNSCALED_CODE: i64 = 0;
    pub const UPSCALED_CODE: i64 = 1;

    /// Integer written into fingerprints, only defined for the two data states
    pub fn code(self) -> Option<i64> {
        match self {
            TaskControl::DeploymentsWithDownscaledState => Some(Self::DOWNSCALED_CODE),
            TaskControl::DeploymentsWithUpscaledState => Some(Self::UPSCALED_CODE),
            _ => None,
        }
    }
}

impl fmt::Display for TaskControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskControl::InspectError => "inspect error",
            TaskControl::KillCurrentRoutine => "kill current routine",
            TaskControl::RestartRoutine => "restart routine",
            TaskControl::DeploymentsWithDownscaledState => "downscaled",
            TaskControl::DeploymentsWithUpscaledState => "upscaled",
            TaskControl::AppStartupWithNoDataWrite => "no data written",
            TaskControl::UpscalingDeactivated => "upscaling deactivated",
        };
        f.write_str(name)
    }
}

/// Whether a namespace had deployments when it was captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamespaceStatus {
    #[serde(rename = "empty")]
    Empty,
    #[serde(rename = "not_empty")]
    NotEmpty,
}

impl NamespaceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NamespaceStatus::Empty => STATUS_EMPTY,
            NamespaceStatus::NotEmpty => STATUS_NOT_EMPTY,
        }
    }
}

/// Which kind of rule claimed the namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Group {
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "unspecified")]
    Unspecified,
}

impl Group {
    pub fn as_str(self) -> &'static str {
        match self {
            Group::Default => GROUP_DEFAULT,
            Group::Unspecified => GROUP_UNSPECIFIED,
        }
    }
}

impl FromStr for Group {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            GROUP_DEFAULT => Ok(Group::Default),
            GROUP_UNSPECIFIED => Ok(Group::Unspecified),
            other => Err(StateError::MalformedFingerprint {
                fingerprint: other.to_string(),
            }),
        }
    }
}

/// One deployment captured at a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub group: Group,
    pub deployment: String,
    pub replicas: i32,
    pub state_code: i64,
}

impl Fingerprint {
    pub fn new(group: Group, deployment: &str, replicas: i32, state: TaskControl) -> Self {
        Self {
            group,
            deployment: deployment.to_string(),
            replicas,
            state_code: state.code().unwrap_or(TaskControl::DOWNSCALED_CODE),
        }
    }

    /// Same deployment and replica count, new state code
    pub fn with_state(&self, state: TaskControl) -> Self {
        Self::new(self.group, &self.deployment, self.replicas, state)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.group.as_str(),
            self.deployment,
            self.replicas,
            self.state_code
        )
    }
}

impl FromStr for Fingerprint {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != FINGERPRINT_FIELDS || parts[1].is_empty() {
            return Err(StateError::MalformedFingerprint {
                fingerprint: s.to_string(),
            });
        }

        let group = parts[0]
            .parse::<Group>()
            .map_err(|_| StateError::MalformedFingerprint {
                fingerprint: s.to_string(),
            })?;
        let replicas = parts[2]
            .parse::<i32>()
            .map_err(|_| StateError::InvalidNumber {
                fingerprint: s.to_string(),
                field: "replicas".to_string(),
            })?;
        let state_code = parts[3]
            .parse::<i64>()
            .map_err(|_| StateError::InvalidNumber {
                fingerprint: s.to_string(),
                field: "state code".to_string(),
            })?;

        Ok(Self {
            group,
            deployment: parts[1].to_string(),
            replicas,
            state_code,
        })
    }
}

/// Persisted record for one namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Apps {
    pub status: NamespaceStatus,
    pub group: Group,
    #[serde(default)]
    pub state: Vec<String>,
}

impl Apps {
    pub fn from_fingerprints(group: Group, fingerprints: &[Fingerprint]) -> Self {
        let status = if fingerprints.is_empty() {
            NamespaceStatus::Empty
        } else {
            NamespaceStatus::NotEmpty
        };

        Self {
            status,
            group,
            state: fingerprints.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn fingerprints(&self) -> Result<Vec<Fingerprint>, StateError> {
        self.state.iter().map(|raw| raw.parse()).collect()
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// State store key for a namespace
pub fn state_key(namespace: &str) -> String {
    format!("{}{}", namespace, KEY_SUFFIX)
}

/// Decode the record of `namespace`, `None` when the key is missing or still a placeholder
pub fn read_record(
    data: &BTreeMap<String, String>,
    namespace: &str,
) -> Result<Option<Apps>, StateError> {
    let key = state_key(namespace);
    match data.get(&key) {
        Some(raw) if !raw.trim().is_empty() => serde_yaml::from_str(raw)
            .map(Some)
            .map_err(|e| StateError::DecodeFailed {
                key,
                reason: e.to_string(),
            }),
        _ => Ok(None),
    }
}
