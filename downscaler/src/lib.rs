// File: downscaler/src/lib.rs
pub mod cluster;
pub mod config;
pub mod constants;
pub mod errors;
pub mod policy;
pub mod scaling;
pub mod schedule;
pub mod scheduler;
pub mod state;
pub mod watcher;

pub use cluster::{Cluster, InMemoryCluster, KubeCluster};
pub use config::{Config, ConfigManager};
pub use errors::DownscalerError;
pub use policy::Policy;
pub use scheduler::PolicyReconciler;
