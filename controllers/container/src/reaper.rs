//! Idle object reaper
//!
//! Scales the deployment of a container function down to its minimum once
//! the function has seen no traffic for its idle timeout. The cache entry is
//! kept: the function stays resolvable and scales back up through its HPA.

use crate::executor::ContainerExecutor;
use crate::resources::KIND_DEPLOYMENT;
use crds::{ExecutorType, Function};
use fscache::FuncSvc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Run the reaper every `reaper_interval` until the task is aborted
pub async fn run_idle_reaper(executor: Arc<ContainerExecutor>) {
    let mut ticker = tokio::time::interval(executor.config.reaper_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Idle reaper running every {:?}", executor.config.reaper_interval);

    loop {
        ticker.tick().await;
        let mut scale_downs = executor.reap_idle_functions().await;
        // Scale-downs outlive the pass that started them
        tokio::spawn(async move { while scale_downs.join_next().await.is_some() {} });
    }
}

/// Idle timeout of `function`, falling back to `default` when unset
pub fn idle_timeout(function: &Function, default: Duration) -> Duration {
    function
        .spec
        .idle_timeout
        .and_then(|secs| u64::try_from(secs).ok())
        .map_or(default, Duration::from_secs)
}

impl ContainerExecutor {
    /// One reaper pass. Every scale-down runs as its own task in the
    /// returned set so one slow API call does not hold up the others.
    pub async fn reap_idle_functions(self: &Arc<Self>) -> JoinSet<()> {
        let mut tasks = JoinSet::new();

        let candidates = match self.fs_cache.list_old(self.config.idle_prefilter).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!("Error listing idle functions: {}", e);
                return tasks;
            }
        };

        for fsvc in candidates {
            if fsvc.executor != ExecutorType::Container {
                continue;
            }
            let function = match self
                .client
                .get_function(&fsvc.function.namespace, &fsvc.function.name)
                .await
            {
                Ok(function) => function,
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    warn!("Error getting function {}: {}", fsvc.function.key(), e);
                    continue;
                }
            };

            if fsvc.idle_for() < idle_timeout(&function, self.config.default_idle_timeout) {
                continue;
            }

            let min_scale = function.execution_strategy().min_scale;
            let executor = Arc::clone(self);
            tasks.spawn(async move { executor.scale_down_idle(&fsvc, min_scale).await });
        }

        tasks
    }

    async fn scale_down_idle(&self, fsvc: &FuncSvc, min_scale: i32) {
        let Some(name) = fsvc.object(KIND_DEPLOYMENT).and_then(|o| o.name.as_deref()) else {
            warn!("{} has no deployment reference", fsvc.function.key());
            return;
        };
        let namespace = fsvc.function.namespace.as_str();

        let deployment = match self.client.get_deployment(namespace, name).await {
            Ok(deployment) => deployment,
            Err(e) if e.is_not_found() => {
                debug!("Deployment {}/{} is gone", namespace, name);
                return;
            }
            Err(e) => {
                error!("Error getting deployment {}/{}: {}", namespace, name, e);
                return;
            }
        };

        let replicas = deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        if replicas <= min_scale {
            return;
        }

        info!(
            "Scaling idle function {} from {} to {} replicas",
            fsvc.function.key(),
            replicas,
            min_scale
        );
        if let Err(e) = self.client.scale_deployment(namespace, name, min_scale).await {
            error!("Error scaling down deployment {}/{}: {}", namespace, name, e);
        }
    }
}
