//! Downscaler policy document
//!
//! The policy lives as YAML under the `policy.yaml` key of a ConfigMap. Whatever
//! the delivery path (initial read, watch event or local manifest file), it is
//! decoded into one canonical [`Policy`] value before reaching the reconciler.

use crate::constants::policy::{
    EXPRESSION_KEY, OPERATOR_EXCLUDE, OPERATOR_NOT_EXCLUDE, POLICY_KEY, UNSPECIFIED_NAMESPACE,
};
use crate::errors::PolicyError;
use crate::schedule::parse_recurrence;
use anyhow::{anyhow, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub kind: String,
    pub metadata: PolicyMetadata,
    pub spec: PolicySpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyMetadata {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PolicySpec {
    pub execution_opts: ExecutionOpts,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOpts {
    pub time: TimeOpts,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeOpts {
    pub time_zone: String,
    pub recurrence: String,
    pub downscaler: DownscalerOpts,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DownscalerOpts {
    pub downscaler_selector_terms: SelectorTerms,
    pub with_namespace_opts: NamespaceOpts,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SelectorTerms {
    pub match_expressions: MatchExpression,
}

/// Namespace selector, `operator: exclude` turns `values` into the ignored set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchExpression {
    pub key: String,
    pub operator: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NamespaceOpts {
    pub downscale_namespaces_with_time_rules: TimeRules,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeRules {
    pub rules: Vec<Rule>,
}

/// One group of namespaces sharing a daily window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Rule {
    pub namespaces: Vec<String>,
    pub with_cron: String,
}

impl Rule {
    pub fn has_wildcard(&self) -> bool {
        self.namespaces.iter().any(|ns| ns == UNSPECIFIED_NAMESPACE)
    }
}

/// On-disk ConfigMap manifest carrying the policy document
#[derive(Debug, Deserialize)]
struct ConfigMapManifest {
    #[serde(default)]
    data: BTreeMap<String, String>,
}

impl Policy {
    pub fn from_yaml(raw: &str) -> Result<Self, PolicyError> {
        serde_yaml::from_str(raw).map_err(|e| PolicyError::ParseError {
            reason: e.to_string(),
        })
    }

    /// Decode the policy from the data section of its ConfigMap.
    pub fn from_config_map_data(data: &BTreeMap<String, String>) -> Result<Self, PolicyError> {
        let raw = data.get(POLICY_KEY).ok_or_else(|| PolicyError::MissingDocument {
            key: POLICY_KEY.to_string(),
        })?;
        Self::from_yaml(raw)
    }

    /// Read a ConfigMap manifest from disk and decode the policy it carries.
    pub async fn from_manifest_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read policy manifest {}: {}", path.display(), e))?;

        let manifest: ConfigMapManifest = serde_yaml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse policy manifest {}: {}", path.display(), e))?;

        Self::from_config_map_data(&manifest.data)
            .map_err(|e| anyhow!("Invalid policy manifest {}: {}", path.display(), e))
    }

    pub fn time_zone(&self) -> &str {
        &self.spec.execution_opts.time.time_zone
    }

    pub fn recurrence(&self) -> &str {
        &self.spec.execution_opts.time.recurrence
    }

    pub fn expression(&self) -> &MatchExpression {
        &self
            .spec
            .execution_opts
            .time
            .downscaler
            .downscaler_selector_terms
            .match_expressions
    }

    pub fn rules(&self) -> &[Rule] {
        &self
            .spec
            .execution_opts
            .time
            .downscaler
            .with_namespace_opts
            .downscale_namespaces_with_time_rules
            .rules
    }

    /// Load the policy timezone as an IANA zone.
    pub fn load_time_zone(&self) -> Result<Tz, PolicyError> {
        let name = self.time_zone().trim();
        if name.is_empty() {
            return Err(PolicyError::TimeZoneNotFound);
        }
        name.parse::<Tz>()
            .map_err(|_| PolicyError::InvalidTimeZone {
                timezone: name.to_string(),
            })
    }

    /// Check the whole document and return every problem found.
    pub fn validate(&self) -> Vec<PolicyError> {
        let mut errors = Vec::new();

        if let Err(e) = self.load_time_zone() {
            errors.push(e);
        }

        let recurrence = self.recurrence().trim();
        if recurrence.is_empty() {
            errors.push(PolicyError::RecurrenceNotFound);
        } else if parse_recurrence(recurrence).is_empty() {
            errors.push(PolicyError::InvalidRecurrence {
                recurrence: recurrence.to_string(),
            });
        }

        let expression = self.expression();
        if expression.key != EXPRESSION_KEY {
            errors.push(PolicyError::InvalidExpressionKey {
                key: expression.key.clone(),
            });
        }
        if expression.operator != OPERATOR_EXCLUDE && expression.operator != OPERATOR_NOT_EXCLUDE {
            errors.push(PolicyError::InvalidExpressionOperator {
                operator: expression.operator.clone(),
            });
        }

        errors
    }

    /// The ignored-namespace set this policy asks for.
    ///
    /// `None` means the previous set stays in place (`notExclude`).
    pub fn ignored_namespaces(&self) -> Option<HashSet<String>> {
        let expression = self.expression();
        if expression.operator != OPERATOR_EXCLUDE {
            return None;
        }
        Some(expression.values.iter().cloned().collect())
    }

    /// Every namespace named by any rule, wildcard token excluded.
    pub fn scheduled_namespaces(&self) -> BTreeSet<String> {
        self.rules()
            .iter()
            .flat_map(|rule| rule.namespaces.iter())
            .filter(|ns| ns.as_str() != UNSPECIFIED_NAMESPACE)
            .cloned()
            .collect()
    }
}
