use super::task::{TaskContext, TaskRunner};
use super::{build_tasks, Task};
use crate::cluster::Cluster;
use crate::errors::PolicyError;
use crate::policy::Policy;
use crate::scaling::Scaler;
use crate::schedule::Clock;
use crate::state::TaskControl;
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub poll_interval: Duration,
    /// Pause after each policy batch
    pub pacing: Duration,
    /// How long stopping tasks get before they are aborted
    pub shutdown_grace: Duration,
}

struct RunningTask {
    token: CancellationToken,
    handle: JoinHandle<TaskControl>,
}

/// Owns the task registry and turns each valid policy into a fresh set of tasks
pub struct PolicyReconciler {
    cluster: Arc<dyn Cluster>,
    scaler: Arc<Scaler>,
    clock: Arc<dyn Clock>,
    settings: ReconcilerSettings,
    timezone: Tz,
    recurrence: String,
    ignored: Arc<HashSet<String>>,
    tasks: HashMap<String, RunningTask>,
}

impl PolicyReconciler {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        scaler: Arc<Scaler>,
        clock: Arc<dyn Clock>,
        settings: ReconcilerSettings,
        default_timezone: Tz,
    ) -> Self {
        Self {
            cluster,
            scaler,
            clock,
            settings,
            timezone: default_timezone,
            recurrence: String::new(),
            ignored: Arc::new(HashSet::new()),
            tasks: HashMap::new(),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn recurrence(&self) -> &str {
        &self.recurrence
    }

    pub fn ignored_namespaces(&self) -> &HashSet<String> {
        &self.ignored
    }

    /// Keys of the tasks currently registered, sorted
    pub fn running_task_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.tasks.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Validate `policy` and replace every running task with the policy's tasks.
    ///
    /// On validation failure nothing changes and every problem is returned.
    #[instrument(skip(self, policy), fields(policy = %policy.metadata.name))]
    pub async fn apply_policy(&mut self, policy: &Policy) -> Result<usize, Vec<PolicyError>> {
        let errors = policy.validate();
        if !errors.is_empty() {
            for e in &errors {
                error!("Rejected policy update: {}", e);
            }
            return Err(errors);
        }

        let timezone = policy.load_time_zone().map_err(|e| vec![e])?;
        if timezone != self.timezone {
            info!("Timezone changed from {} to {}", self.timezone, timezone);
            self.timezone = timezone;
        } else {
            debug!("Timezone unchanged ({})", timezone);
        }

        if !self.recurrence.eq_ignore_ascii_case(policy.recurrence()) {
            info!(
                "Recurrence changed from '{}' to '{}'",
                self.recurrence,
                policy.recurrence()
            );
        }
        self.recurrence = policy.recurrence().to_string();

        if let Some(ignored) = policy.ignored_namespaces() {
            if ignored.is_empty() {
                info!("No namespace is ignored during scheduling");
            }
            for ns in &ignored {
                info!("Namespace {} is ignored during scheduling", ns);
            }
            self.ignored = Arc::new(ignored);
        }

        let tasks = build_tasks(policy, &self.recurrence, self.timezone);
        self.stop_all().await;

        let ctx = Arc::new(TaskContext {
            cluster: self.cluster.clone(),
            scaler: self.scaler.clone(),
            clock: self.clock.clone(),
            poll_interval: self.settings.poll_interval,
            ignored: self.ignored.clone(),
        });

        for task in tasks {
            self.spawn(task, ctx.clone());
        }

        info!("Policy applied, {} tasks running", self.tasks.len());
        Ok(self.tasks.len())
    }

    fn spawn(&mut self, task: Task, ctx: Arc<TaskContext>) {
        let key = task.key();
        if self.tasks.contains_key(&key) {
            warn!("Duplicate task {} in policy, keeping the first one", key);
            return;
        }

        let token = CancellationToken::new();
        let runner = TaskRunner::new(task, ctx, token.clone());
        let handle = tokio::spawn(runner.run());
        self.tasks.insert(key, RunningTask { token, handle });
    }

    /// Cancel every task and wait for it, aborting the ones that outlive the grace period.
    async fn stop_all(&mut self) {
        if self.tasks.is_empty() {
            return;
        }

        let running: Vec<(String, RunningTask)> = self.tasks.drain().collect();
        for (_, task) in &running {
            task.token.cancel();
        }

        for (key, task) in running {
            let abort = task.handle.abort_handle();
            match tokio::time::timeout(self.settings.shutdown_grace, task.handle).await {
                Ok(Ok(control)) => debug!("Task {} stopped ({})", key, control),
                Ok(Err(e)) => warn!("Task {} ended abnormally: {}", key, e),
                Err(_) => {
                    warn!("Task {} did not stop in time, aborting", key);
                    abort.abort();
                }
            }
        }
    }

    /// Consume policies until the channel closes or `shutdown` fires.
    pub async fn run(mut self, mut policies: mpsc::Receiver<Policy>, shutdown: CancellationToken) {
        info!("Policy reconciler started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = policies.recv() => match received {
                    Some(policy) => {
                        // Rejections are already logged
                        let _ = self.apply_policy(&policy).await;
                    }
                    None => {
                        info!("Policy channel closed");
                        break;
                    }
                },
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.pacing) => {}
            }
        }

        self.shutdown().await;
    }

    pub async fn shutdown(&mut self) {
        info!("Stopping {} tasks", self.tasks.len());
        self.stop_all().await;
    }
}
