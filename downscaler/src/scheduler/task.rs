use super::namespaces::{missing_namespaces, resolve_with_cluster, TargetNamespace};
use super::Task;
use crate::cluster::Cluster;
use crate::errors::{DownscalerError, StateError};
use crate::scaling::Scaler;
use crate::schedule::{is_recurrence_date, parse_recurrence, parse_window, Clock, Window};
use crate::state::{inspect_replicas_state, TaskControl};
use chrono::{DateTime, Weekday};
use chrono_tz::Tz;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Phases of a scheduling task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ScanningForWindow,
    Downscaling,
    AwaitingUpscaleWindow,
    Upscaling,
    Cancelled,
}

/// Collaborators shared by every task spawned from the same policy
pub struct TaskContext {
    pub cluster: Arc<dyn Cluster>,
    pub scaler: Arc<Scaler>,
    pub clock: Arc<dyn Clock>,
    pub poll_interval: Duration,
    /// Snapshot of the ignored set when the task was spawned
    pub ignored: Arc<HashSet<String>>,
}

/// True while a task scanning for its window should keep waiting.
///
/// A group already recorded as downscaled never waits here, it moves on to the
/// upscale phase.
pub fn should_wait_before_downscale(now: DateTime<Tz>, state: TaskControl, window: &Window) -> bool {
    state != TaskControl::DeploymentsWithDownscaledState && !window.is_off_hours(now)
}

/// True while a downscaled group should stay down.
pub fn should_wait_before_upscale(now: DateTime<Tz>, window: &Window) -> bool {
    window.is_off_hours(now)
}

pub struct TaskRunner {
    task: Task,
    ctx: Arc<TaskContext>,
    token: CancellationToken,
    days: Vec<Weekday>,
    // Set once a group without tracked deployments has been reported
    untracked_reported: AtomicBool,
}

impl TaskRunner {
    pub fn new(task: Task, ctx: Arc<TaskContext>, token: CancellationToken) -> Self {
        let days = parse_recurrence(&task.recurrence);
        Self {
            task,
            ctx,
            token,
            days,
            untracked_reported: AtomicBool::new(false),
        }
    }

    /// Drive the task until it is cancelled.
    pub async fn run(self) -> TaskControl {
        info!(
            "Task {:?} initializing (window {}, recurrence {})",
            self.task.namespaces, self.task.window, self.task.recurrence
        );

        let control = match self.resolve_targets().await {
            Some(targets) => self.run_phases(targets).await,
            None => TaskControl::KillCurrentRoutine,
        };

        info!("Task {:?} terminated", self.task.namespaces);
        control
    }

    async fn run_phases(&self, targets: Vec<TargetNamespace>) -> TaskControl {
        let names: Vec<String> = targets.iter().map(|t| t.name.clone()).collect();
        let mut phase = Phase::ScanningForWindow;

        loop {
            if self.token.is_cancelled() {
                phase = Phase::Cancelled;
            }

            phase = match phase {
                Phase::ScanningForWindow => self.scan_for_window(&names).await,
                Phase::Downscaling => self.downscale(&targets).await,
                Phase::AwaitingUpscaleWindow => self.await_upscale_window(&names).await,
                Phase::Upscaling => self.upscale(&names).await,
                Phase::Cancelled => return TaskControl::KillCurrentRoutine,
            };
        }
    }

    /// Resolve the wildcard once, retrying until the namespace list can be read.
    async fn resolve_targets(&self) -> Option<Vec<TargetNamespace>> {
        loop {
            if self.token.is_cancelled() {
                return None;
            }

            match resolve_with_cluster(
                self.ctx.cluster.as_ref(),
                &self.task.namespaces,
                &self.ctx.ignored,
                &self.task.scheduled_namespaces,
            )
            .await
            {
                Ok(targets) => return Some(targets),
                Err(e) => {
                    error!("Failed to resolve namespaces {:?}: {}", self.task.namespaces, e);
                    if !self.pause().await {
                        return None;
                    }
                }
            }
        }
    }

    async fn scan_for_window(&self, names: &[String]) -> Phase {
        let now = self.now();

        if !is_recurrence_date(now, &self.days) {
            info!(
                "Today is {}, outside recurrence {}, waiting",
                now.format("%A"),
                self.task.recurrence
            );
            return self.wait_then(Phase::ScanningForWindow).await;
        }

        match missing_namespaces(self.ctx.cluster.as_ref(), &self.task.namespaces).await {
            Ok(missing) if missing.is_empty() => {}
            Ok(_) => return self.wait_then(Phase::ScanningForWindow).await,
            Err(e) => {
                error!("Failed to validate namespaces {:?}: {}", self.task.namespaces, e);
                return self.wait_then(Phase::ScanningForWindow).await;
            }
        }

        let Some(state) = self.inspect(names).await else {
            return self.wait_then(Phase::ScanningForWindow).await;
        };

        if state == TaskControl::DeploymentsWithDownscaledState {
            info!("Namespaces {:?} are already downscaled", names);
            return Phase::AwaitingUpscaleWindow;
        }

        let Some(window) = self.window(now) else {
            return self.wait_then(Phase::ScanningForWindow).await;
        };

        if should_wait_before_downscale(now, state, &window) {
            info!(
                "Current time {}, downscaling {:?} at {}",
                now.format("%H:%M"),
                names,
                window.downscale_at().format("%H:%M")
            );
            return self.wait_then(Phase::ScanningForWindow).await;
        }

        Phase::Downscaling
    }

    /// Downscale the group, retrying every poll while off-hours last.
    ///
    /// The record is already saved as downscaled when a scale request fails, so
    /// the retry stays in this phase instead of going back to scanning.
    async fn downscale(&self, targets: &[TargetNamespace]) -> Phase {
        let now = self.now();
        if let Some(window) = self.window(now) {
            if !window.is_off_hours(now) {
                info!(
                    "Off-hours ended before {:?} were fully downscaled",
                    self.task.namespaces
                );
                return Phase::AwaitingUpscaleWindow;
            }
        }

        match self.ctx.scaler.downscale(targets, &self.ctx.ignored).await {
            Ok(_) => Phase::AwaitingUpscaleWindow,
            Err(e) => {
                error!("Downscaling {:?} failed, retrying: {}", self.task.namespaces, e);
                self.wait_then(Phase::Downscaling).await
            }
        }
    }

    async fn await_upscale_window(&self, names: &[String]) -> Phase {
        let now = self.now();
        let Some(window) = self.window(now) else {
            return self.wait_then(Phase::AwaitingUpscaleWindow).await;
        };

        if should_wait_before_upscale(now, &window) {
            info!(
                "Current time {}, upscaling {:?} at {}",
                now.format("%H:%M"),
                names,
                window.upscale_at().format("%H:%M")
            );
            return self.wait_then(Phase::AwaitingUpscaleWindow).await;
        }

        match self.inspect(names).await {
            Some(TaskControl::DeploymentsWithDownscaledState) => Phase::Upscaling,
            Some(state) => {
                debug!("Namespaces {:?} are {}, skipping upscale", names, state);
                info!("{} for {:?}", TaskControl::RestartRoutine, names);
                Phase::ScanningForWindow
            }
            None => self.wait_then(Phase::AwaitingUpscaleWindow).await,
        }
    }

    async fn upscale(&self, names: &[String]) -> Phase {
        if let Err(e) = self.ctx.scaler.upscale(names).await {
            error!("Upscaling {:?} failed: {}", names, e);
            return self.wait_then(Phase::AwaitingUpscaleWindow).await;
        }
        info!("{} for {:?}", TaskControl::RestartRoutine, names);
        Phase::ScanningForWindow
    }

    /// Classify the group, `None` standing for `InspectError`
    async fn inspect(&self, names: &[String]) -> Option<TaskControl> {
        match inspect_replicas_state(
            self.ctx.cluster.as_ref(),
            names,
            self.ctx.scaler.upscaling_enabled(),
        )
        .await
        {
            Ok(state) => {
                self.untracked_reported.store(false, Ordering::Relaxed);
                Some(state)
            }
            Err(DownscalerError::State(StateError::NoTrackedDeployments)) => {
                if !self.untracked_reported.swap(true, Ordering::Relaxed) {
                    warn!(
                        "Namespaces {:?} have no tracked deployments, remove their state records to capture them again",
                        names
                    );
                } else {
                    debug!("Namespaces {:?} still have no tracked deployments", names);
                }
                None
            }
            Err(e) => {
                error!("{} for {:?}: {}", TaskControl::InspectError, names, e);
                None
            }
        }
    }

    fn window(&self, now: DateTime<Tz>) -> Option<Window> {
        match parse_window(&self.task.window, self.task.timezone, now) {
            Ok(window) => Some(window),
            Err(e) => {
                warn!("Task {:?} has an unusable window: {}", self.task.namespaces, e);
                None
            }
        }
    }

    fn now(&self) -> DateTime<Tz> {
        self.ctx.clock.now().with_timezone(&self.task.timezone)
    }

    /// Sleep one poll interval, `false` when cancelled meanwhile
    async fn pause(&self) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(self.ctx.poll_interval) => true,
        }
    }

    async fn wait_then(&self, next: Phase) -> Phase {
        if self.pause().await {
            next
        } else {
            Phase::Cancelled
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    fn window() -> (Tz, Window) {
        let tz = chrono_tz::UTC;
        let now = tz.with_ymd_and_hms(2024, 6, 4, 12, 0, 0).unwrap();
        (tz, parse_window("06:00-22:00", tz, now).unwrap())
    }

    #[test_case(TaskControl::AppStartupWithNoDataWrite, 18, 20, true; "first start before downscale time")]
    #[test_case(TaskControl::AppStartupWithNoDataWrite, 23, 50, false; "first start after downscale time")]
    #[test_case(TaskControl::DeploymentsWithDownscaledState, 23, 50, false; "restart while down before midnight")]
    #[test_case(TaskControl::DeploymentsWithDownscaledState, 5, 50, false; "restart while down after midnight")]
    #[test_case(TaskControl::DeploymentsWithUpscaledState, 7, 50, true; "upscaled in the morning")]
    #[test_case(TaskControl::DeploymentsWithUpscaledState, 21, 50, true; "upscaled ten minutes before")]
    #[test_case(TaskControl::DeploymentsWithUpscaledState, 22, 1, false; "upscaled right after downscale time")]
    #[test_case(TaskControl::UpscalingDeactivated, 22, 0, false; "downscale only at the boundary")]
    fn test_wait_before_downscale(state: TaskControl, hour: u32, minute: u32, expected: bool) {
        let (tz, window) = window();
        let now = tz.with_ymd_and_hms(2024, 6, 4, hour, minute, 0).unwrap();
        assert_eq!(should_wait_before_downscale(now, state, &window), expected);
    }

    fn runner_for(cluster: &crate::cluster::InMemoryCluster, namespaces: &[&str]) -> TaskRunner {
        let task = Task {
            namespaces: namespaces.iter().map(|n| n.to_string()).collect(),
            window: "06:00-22:00".to_string(),
            recurrence: "MON-FRI".to_string(),
            timezone: chrono_tz::UTC,
            scheduled_namespaces: Arc::new(Default::default()),
        };
        let ctx = Arc::new(TaskContext {
            cluster: Arc::new(cluster.clone()),
            scaler: Arc::new(Scaler::new(Arc::new(cluster.clone()), "downscaler", true)),
            clock: Arc::new(crate::schedule::FixedClock::new(chrono::Utc::now())),
            poll_interval: Duration::from_millis(10),
            ignored: Arc::new(HashSet::new()),
        });
        TaskRunner::new(task, ctx, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_untracked_group_reported_once() {
        let cluster = crate::cluster::InMemoryCluster::new();
        cluster.add_namespace("ns-a", &[]).await;
        let mut data = std::collections::BTreeMap::new();
        data.insert(
            crate::state::state_key("ns-a"),
            "status: empty\ngroup: default\nstate: []\n".to_string(),
        );
        cluster.set_state_store(data).await;

        let runner = runner_for(&cluster, &["ns-a"]);
        let names = vec!["ns-a".to_string()];

        assert_eq!(runner.inspect(&names).await, None);
        assert!(runner.untracked_reported.load(Ordering::Relaxed));
        assert_eq!(runner.inspect(&names).await, None);
        assert!(runner.untracked_reported.load(Ordering::Relaxed));

        cluster
            .write_state_store(
                &crate::state::state_key("ns-a"),
                "status: not_empty\ngroup: default\nstate:\n- default,api,2,0\n",
            )
            .await
            .unwrap();
        assert_eq!(
            runner.inspect(&names).await,
            Some(TaskControl::DeploymentsWithDownscaledState)
        );
        assert!(!runner.untracked_reported.load(Ordering::Relaxed));
    }

    #[test_case(23, 20, true; "before midnight")]
    #[test_case(5, 20, true; "after midnight")]
    #[test_case(6, 0, false; "at upscale time")]
    #[test_case(6, 5, false; "after upscale time")]
    fn test_wait_before_upscale(hour: u32, minute: u32, expected: bool) {
        let (tz, window) = window();
        let now = tz.with_ymd_and_hms(2024, 6, 4, hour, minute, 0).unwrap();
        assert_eq!(should_wait_before_upscale(now, &window), expected);
    }
}
