//! Main controller implementation.
//!
//! Wires the executor to the cluster and runs its background tasks:
//! 1. HTTP API (served from the start so liveness probes pass)
//! 2. Function, Secret and ConfigMap watchers per watched namespace
//! 3. Adoption of existing functions, or cleanup of objects left by previous
//!    instances, once every watcher has synced
//! 4. The idle reaper

use crate::api::{self, AppState};
use crate::config::ExecutorConfig;
use crate::error::ControllerError;
use crate::executor::{ContainerExecutor, Executor, ReferenceKind};
use crate::metrics::ExecutorMetrics;
use crate::reaper::run_idle_reaper;
use crate::watcher::{FunctionEventHandler, FunctionWatcher, ReferenceWatcher};
use cluster_client::KubeClusterClient;
use futures::future::join_all;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::Client;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Main controller of the container executor.
pub struct Controller {
    executor: Arc<ContainerExecutor>,
    kube_client: Client,
    ready: Arc<AtomicBool>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: ExecutorConfig) -> Result<Self, ControllerError> {
        info!("Initializing container executor {}", config.instance_id);

        let kube_client = Client::try_default().await?;
        let cluster_client = Arc::new(KubeClusterClient::new(kube_client.clone()));
        let metrics = ExecutorMetrics::new()?;
        let executor = Arc::new(ContainerExecutor::new(cluster_client, config, metrics));

        Ok(Self {
            executor,
            kube_client,
            ready: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Runs the controller until one of its long-running tasks exits.
    pub async fn run(self) -> Result<(), ControllerError> {
        let config = self.executor.config().clone();

        let state = AppState {
            executor: Arc::clone(&self.executor) as Arc<dyn Executor>,
            metrics: self.executor.metrics().clone(),
            ready: Arc::clone(&self.ready),
        };
        let mut api_server = tokio::spawn(api::serve(config.http_addr, state));

        let mut watchers: Vec<JoinHandle<Result<(), ControllerError>>> = Vec::new();
        let mut synced = Vec::new();
        for namespace in config.namespaces() {
            let (tx, rx) = oneshot::channel();
            let handler = FunctionEventHandler::new(Arc::clone(&self.executor), tx);
            let watcher = FunctionWatcher::new(self.kube_client.clone(), namespace, handler);
            watchers.push(tokio::spawn(watcher.run()));
            synced.push(rx);

            let secrets: ReferenceWatcher<Secret> = ReferenceWatcher::new(
                self.kube_client.clone(),
                namespace,
                ReferenceKind::Secret,
                Arc::clone(&self.executor),
            );
            watchers.push(tokio::spawn(secrets.run()));
            let config_maps: ReferenceWatcher<ConfigMap> = ReferenceWatcher::new(
                self.kube_client.clone(),
                namespace,
                ReferenceKind::ConfigMap,
                Arc::clone(&self.executor),
            );
            watchers.push(tokio::spawn(config_maps.run()));
        }

        info!("Waiting for {} function watcher(s) to sync", synced.len());
        for result in join_all(synced).await {
            if result.is_err() {
                warn!("A function watcher stopped before syncing");
            }
        }

        if config.adopt_existing_resources {
            self.executor.adopt_existing_resources().await;
        } else {
            self.executor.cleanup_old_executor_objects().await;
        }
        self.ready.store(true, Ordering::Release);
        info!("Container executor ready");

        let mut reaper = tokio::spawn(run_idle_reaper(Arc::clone(&self.executor)));
        let mut watchers = Box::pin(futures::future::select_all(watchers));

        tokio::select! {
            result = &mut api_server => {
                result.map_err(|e| ControllerError::Watch(format!("HTTP API panicked: {}", e)))??;
            }
            (result, _, _) = &mut watchers => {
                result.map_err(|e| ControllerError::Watch(format!("Watcher panicked: {}", e)))??;
            }
            result = &mut reaper => {
                result.map_err(|e| ControllerError::Watch(format!("Idle reaper panicked: {}", e)))?;
            }
        }

        Ok(())
    }
}
