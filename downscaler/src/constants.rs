//! Application-wide constants for intervals, keys, and default values
//!
//! Organized by category so that the scheduler, the cluster adapter and the
//! configuration layer share a single source of truth.

use std::time::Duration;

/// Scheduling loop constants
pub mod scheduling {
    /// Capacity of the policy channel between the watcher and the reconciler
    pub const POLICY_CHANNEL_CAPACITY: usize = 4;
}

/// Policy document constants
pub mod policy {
    /// ConfigMap key holding the serialized policy
    pub const POLICY_KEY: &str = "policy.yaml";

    /// Namespace token meaning "every namespace not claimed elsewhere"
    pub const UNSPECIFIED_NAMESPACE: &str = "unspecified";

    /// The only accepted match expression key
    pub const EXPRESSION_KEY: &str = "namespace";

    pub const OPERATOR_EXCLUDE: &str = "exclude";
    pub const OPERATOR_NOT_EXCLUDE: &str = "notExclude";
}

/// Persisted state constants
pub mod state {
    /// Suffix appended to a namespace to build its state store key
    pub const KEY_SUFFIX: &str = ".yaml";

    pub const STATUS_EMPTY: &str = "empty";
    pub const STATUS_NOT_EMPTY: &str = "not_empty";

    pub const GROUP_DEFAULT: &str = "default";
    pub const GROUP_UNSPECIFIED: &str = "unspecified";

    /// Number of comma separated fields in a fingerprint
    pub const FINGERPRINT_FIELDS: usize = 4;
}

/// Kubernetes adapter constants
pub mod cluster {
    use super::Duration;

    /// Upper bound on a single API request
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// File mounted into every pod with its own namespace
    pub const SERVICE_ACCOUNT_NAMESPACE_FILE: &str =
        "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

    /// Field manager name used on patches
    pub const FIELD_MANAGER: &str = "downscaler";
}

/// Default configuration values (intervals in seconds)
pub mod defaults {
    pub const POLICY_CONFIG_MAP: &str = "downscaler-policy";
    pub const STATE_STORE_NAME: &str = "downscaler-state";
    pub const CONTROLLER_NAMESPACE: &str = "downscaler";
    pub const TIMEZONE: &str = "UTC";
    pub const POLL_INTERVAL_SECONDS: u64 = 60;
    pub const RECONCILE_PACING_SECONDS: u64 = 5;
    pub const TASK_SHUTDOWN_GRACE_SECONDS: u64 = 30;
}
