//! Policy-driven scheduling engine
//!
//! A validated [`Policy`] turns into one [`Task`] per rule. Each task runs as its
//! own tokio task (see [`task::TaskRunner`]) and loops through the phases
//!
//! ```text
//! ScanningForWindow -> Downscaling -> AwaitingUpscaleWindow -> Upscaling -> ScanningForWindow
//! ```
//!
//! until the [`reconciler::PolicyReconciler`] cancels it because a newer policy arrived.

pub mod namespaces;
pub mod reconciler;
pub mod task;

pub use reconciler::{PolicyReconciler, ReconcilerSettings};
pub use task::{Phase, TaskContext, TaskRunner};

use crate::policy::Policy;
use chrono_tz::Tz;
use std::collections::BTreeSet;
use std::sync::Arc;

/// One rule of the policy, ready to be scheduled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub namespaces: Vec<String>,
    pub window: String,
    pub recurrence: String,
    pub timezone: Tz,
    /// Namespaces claimed by any rule of the same policy
    pub scheduled_namespaces: Arc<BTreeSet<String>>,
}

impl Task {
    /// Registry key: the window string followed by the comma joined namespaces
    pub fn key(&self) -> String {
        format!("{}{}", self.window, self.namespaces.join(","))
    }
}

/// Build the task list of a policy.
pub fn build_tasks(policy: &Policy, recurrence: &str, timezone: Tz) -> Vec<Task> {
    let scheduled = Arc::new(policy.scheduled_namespaces());

    policy
        .rules()
        .iter()
        .map(|rule| Task {
            namespaces: rule.namespaces.clone(),
            window: rule.with_cron.clone(),
            recurrence: recurrence.to_string(),
            timezone,
            scheduled_namespaces: scheduled.clone(),
        })
        .collect()
}
