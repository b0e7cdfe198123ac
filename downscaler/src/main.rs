// File: downscaler/src/main.rs
use anyhow::{anyhow, Result};
use clap::Parser;
use downscaler::cluster::{Cluster, KubeCluster};
use downscaler::config::{Cli, ConfigManager, LogFormat};
use downscaler::constants::scheduling::POLICY_CHANNEL_CAPACITY;
use downscaler::policy::Policy;
use downscaler::scaling::Scaler;
use downscaler::schedule::SystemClock;
use downscaler::scheduler::{PolicyReconciler, ReconcilerSettings};
use downscaler::watcher::PolicyWatcher;
use kube::Client;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_manager = ConfigManager::new(&cli).await?;
    let config = config_manager.get_current_config();

    // Initialize logging with reduced verbosity
    let env_filter = EnvFilter::from_default_env()
        .add_directive("downscaler=info".parse()?)
        .add_directive("kube=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("tower=warn".parse()?);

    match config.log_format {
        LogFormat::Text => fmt().with_env_filter(env_filter).init(),
        LogFormat::Json => fmt().json().with_env_filter(env_filter).init(),
    }

    info!("Starting downscaler in namespace {}", config.controller_namespace());

    let default_timezone = config.default_timezone()?;
    info!("Default timezone {}", default_timezone);

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow!("Failed to create Kubernetes client: {}", e))?;

    // Initialize the state store
    let cluster: Arc<dyn Cluster> = Arc::new(KubeCluster::new(
        client.clone(),
        &config.state_store_name,
        config.state_store_namespace(),
    ));
    if config.enable_upscaling {
        cluster.ensure_state_store().await?;
        info!(
            "State store {}/{} ready",
            config.state_store_namespace(),
            config.state_store_name
        );
    } else {
        warn!("Upscaling disabled, deployments will only be downscaled");
    }

    let scaler = Arc::new(Scaler::new(
        cluster.clone(),
        config.controller_namespace(),
        config.enable_upscaling,
    ));

    let reconciler = PolicyReconciler::new(
        cluster.clone(),
        scaler,
        Arc::new(SystemClock),
        ReconcilerSettings {
            poll_interval: config.poll_interval(),
            pacing: config.reconcile_pacing(),
            shutdown_grace: config.task_shutdown_grace(),
        },
        default_timezone,
    );

    let (policy_tx, policy_rx) = mpsc::channel(POLICY_CHANNEL_CAPACITY);
    let shutdown = CancellationToken::new();

    // Initial policy, from a local manifest or from the cluster
    let mut watcher = PolicyWatcher::new(
        client,
        &config.policy_config_map,
        config.policy_namespace(),
        policy_tx.clone(),
    );
    let initial = match &cli.policy_file {
        Some(path) => Some(Policy::from_manifest_file(path).await?),
        None => watcher.load_initial().await?,
    };
    if let Some(policy) = initial {
        policy_tx
            .send(policy)
            .await
            .map_err(|_| anyhow!("Policy channel closed before startup"))?;
    }
    drop(policy_tx);

    let reconciler_handle = tokio::spawn(reconciler.run(policy_rx, shutdown.clone()));
    let watcher_handle = tokio::spawn(watcher.run(shutdown.clone()));
    info!("Downscaler started");

    wait_for_signal().await?;
    info!("Shutdown signal received, stopping tasks");
    shutdown.cancel();

    if let Err(e) = watcher_handle.await {
        error!("Policy watcher ended abnormally: {}", e);
    }
    if let Err(e) = reconciler_handle.await {
        error!("Reconciler ended abnormally: {}", e);
    }

    info!("Downscaler stopped");
    Ok(())
}

async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}
