//! Container executor
//!
//! Backs every container function with a Service, a Deployment and a
//! HorizontalPodAutoscaler, created in that order so the service address has
//! time to propagate while the deployment becomes ready. Creation for one
//! function UID is single-flight; the resulting [`FuncSvc`] is published in
//! the function service cache, which other callers read instead of creating.

use crate::config::ExecutorConfig;
use crate::diff::{ExecutorTransition, FunctionDiff};
use crate::error::{ControllerError, MultiError};
use crate::metrics::ExecutorMetrics;
use crate::naming::{executor_selector, object_name, selector_labels};
use crate::resources::{
    FunctionObjects, KIND_DEPLOYMENT, KIND_HPA, KIND_SERVICE, cpu_limit, hpa_patch, min_replicas, object_reference,
    rv_count_patch,
};
use crate::validation::validate_function;
use async_trait::async_trait;
use chrono::Utc;
use cluster_client::{ClusterClientTrait, ClusterError, label_selector};
use crds::{EXECUTOR_INSTANCE_ID, ExecutorType, Function};
use fscache::{FuncSvc, FunctionMeta, FunctionServiceCache};
use futures::future::join_all;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use throttler::Throttler;
use tracing::{debug, error, info, warn};

/// Readiness wait when the function sets no specialization timeout
const DEFAULT_SPECIALIZATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Interval between deployment availability checks
const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Operations every executor type offers to the rest of the system
#[async_trait]
pub trait Executor: Send + Sync {
    /// Executor type whose functions this executor owns
    fn executor_type(&self) -> ExecutorType;

    /// Create (or join the in-flight creation of) the backend of `function`
    async fn get_func_svc(&self, function: &Function) -> Result<FuncSvc, ControllerError>;

    /// Cached backend of `function`, without touching the cluster
    fn get_func_svc_from_cache(&self, function: &Function) -> Result<FuncSvc, ControllerError>;

    /// Drop a cached backend so the next lookup creates it again
    fn delete_func_svc_from_cache(&self, fsvc: &FuncSvc);

    /// Record traffic to the backend at `address`
    async fn tap_service(&self, address: &str) -> Result<(), ControllerError>;

    /// Whether the objects behind a cached backend still exist and serve
    async fn is_valid(&self, fsvc: &FuncSvc) -> bool;

    /// Roll the pods of `function` so they pick up changed Secrets and ConfigMaps
    async fn refresh_func_pods(&self, function: &Function) -> Result<(), ControllerError>;

    /// Rebuild cache state for existing functions after a restart
    async fn adopt_existing_resources(&self);

    /// Delete objects created by other instances of this executor
    async fn cleanup_old_executor_objects(&self);

    /// Write the cache contents to a file and return its path
    async fn dump_debug_info(&self) -> Result<PathBuf, ControllerError>;
}

/// Kind of object a function mounts into its pods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Secret,
    ConfigMap,
}

impl ReferenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceKind::Secret => "Secret",
            ReferenceKind::ConfigMap => "ConfigMap",
        }
    }

    /// Whether `function` mounts the object `namespace/name` of this kind
    pub fn is_referenced_by(self, function: &Function, namespace: &str, name: &str) -> bool {
        let function_ns = function.metadata.namespace.as_deref().unwrap_or("default");
        match self {
            ReferenceKind::Secret => function
                .spec
                .secrets
                .iter()
                .any(|r| r.name == name && r.namespace_or(function_ns) == namespace),
            ReferenceKind::ConfigMap => function
                .spec
                .config_maps
                .iter()
                .any(|r| r.name == name && r.namespace_or(function_ns) == namespace),
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Executor for functions of type `container`
pub struct ContainerExecutor {
    pub(crate) client: Arc<dyn ClusterClientTrait>,
    pub(crate) fs_cache: FunctionServiceCache,
    pub(crate) throttler: Throttler<FuncSvc, ControllerError>,
    pub(crate) config: ExecutorConfig,
    pub(crate) metrics: ExecutorMetrics,
}

impl fmt::Debug for ContainerExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerExecutor")
            .field("instance_id", &self.config.instance_id)
            .field("cached", &self.fs_cache.len())
            .field("in_flight", &self.throttler.len())
            .finish_non_exhaustive()
    }
}

impl ContainerExecutor {
    /// Create the executor. Must be called from within a Tokio runtime.
    pub fn new(client: Arc<dyn ClusterClientTrait>, config: ExecutorConfig, metrics: ExecutorMetrics) -> Self {
        Self {
            client,
            fs_cache: FunctionServiceCache::with_metrics(metrics.cache.clone()),
            throttler: Throttler::new(config.throttler_expiry),
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn fs_cache(&self) -> &FunctionServiceCache {
        &self.fs_cache
    }

    pub fn metrics(&self) -> &ExecutorMetrics {
        &self.metrics
    }

    /// Create the backend of `function` once per UID.
    ///
    /// Concurrent callers share the leader's result; later callers read the
    /// cache instead of creating again.
    pub async fn create_function(&self, function: &Function) -> Result<FuncSvc, ControllerError> {
        if function.executor_type() != ExecutorType::Container {
            return Err(ControllerError::InvalidFunction(format!(
                "{} has executor type {}",
                function.display_name(),
                function.executor_type()
            )));
        }
        validate_function(function)?;
        let meta = FunctionMeta::from_object_meta(&function.metadata)?;
        let uid = meta.uid.as_str();

        self.throttler
            .run_once(uid, |able_to_create| async move {
                if able_to_create {
                    self.fn_create(function).await
                } else {
                    Ok(self.fs_cache.get_by_function_uid(uid)?)
                }
            })
            .await
            .map_err(|source| {
                if source.is_not_found() {
                    debug!("No backend published for {}: {}", function.display_name(), source);
                } else {
                    error!("Error creating function {}: {}", function.display_name(), source);
                }
                ControllerError::FunctionCreation {
                    function: function.display_name(),
                    source,
                }
            })
    }

    async fn fn_create(&self, function: &Function) -> Result<FuncSvc, ControllerError> {
        let meta = FunctionMeta::from_object_meta(&function.metadata)?;
        let name = object_name(&meta);
        let objects = FunctionObjects {
            function,
            meta: &meta,
            name: &name,
            instance_id: &self.config.instance_id,
        };
        let labels = [meta.name.as_str(), meta.namespace.as_str()];

        let (service, deployment, hpa) = match self.provision(&objects).await {
            Ok(created) => created,
            Err(e) => {
                self.metrics.cold_start_errors.with_label_values(&labels).inc();
                self.spawn_cleanup(&meta.namespace, &name);
                return Err(e);
            }
        };

        let address = format!(
            "{}.{}",
            service.metadata.name.as_deref().unwrap_or(&name),
            service.metadata.namespace.as_deref().unwrap_or(&meta.namespace)
        );
        let now = Utc::now();
        let fsvc = FuncSvc {
            name: name.clone(),
            function: meta.clone(),
            environment: function.spec.environment.clone(),
            address,
            kubernetes_objects: vec![
                object_reference(KIND_DEPLOYMENT, "apps/v1", &deployment.metadata),
                object_reference(KIND_SERVICE, "v1", &service.metadata),
                object_reference(KIND_HPA, "autoscaling/v2", &hpa.metadata),
            ],
            executor: ExecutorType::Container,
            cpu_limit: cpu_limit(function, &meta.name),
            ctime: now,
            atime: now,
        };

        match self.fs_cache.add(fsvc.clone()) {
            Ok(None) => {
                self.metrics.cold_starts.with_label_values(&labels).inc();
                info!("Created backend for {} at {}", function.display_name(), fsvc.address);
                Ok(fsvc)
            }
            Ok(Some(existing)) => {
                self.metrics.cold_start_races.with_label_values(&labels).inc();
                debug!("Backend for {} was already cached", function.display_name());
                Ok(existing)
            }
            Err(e) => {
                self.metrics.cold_start_errors.with_label_values(&labels).inc();
                error!("Error caching backend for {}: {}", function.display_name(), e);
                Err(e.into())
            }
        }
    }

    /// Service, then deployment (waiting for one available replica), then HPA
    async fn provision(
        &self,
        objects: &FunctionObjects<'_>,
    ) -> Result<(Service, Deployment, HorizontalPodAutoscaler), ControllerError> {
        let namespace = objects.meta.namespace.as_str();
        let name = objects.name;
        let client = self.client.as_ref();

        let desired_service = objects.service()?;
        let service = create_or_get(
            KIND_SERVICE,
            name,
            || client.get_service(namespace, name),
            || client.create_service(namespace, &desired_service),
        )
        .await?;

        let strategy = objects.function.execution_strategy();
        let rv_count = self.referenced_rv_sum(objects.function, namespace).await?;
        let desired_deployment = objects.deployment(min_replicas(strategy), rv_count)?;
        create_or_get(
            KIND_DEPLOYMENT,
            name,
            || client.get_deployment(namespace, name),
            || client.create_deployment(namespace, &desired_deployment),
        )
        .await?;
        let timeout = strategy
            .specialization_timeout
            .and_then(|secs| u64::try_from(secs).ok())
            .filter(|secs| *secs > 0)
            .map_or(DEFAULT_SPECIALIZATION_TIMEOUT, Duration::from_secs);
        let deployment = self.wait_for_available(namespace, name, timeout).await?;

        let desired_hpa = objects.hpa();
        let hpa = create_or_get(
            KIND_HPA,
            name,
            || client.get_hpa(namespace, name),
            || client.create_hpa(namespace, &desired_hpa),
        )
        .await?;

        Ok((service, deployment, hpa))
    }

    async fn wait_for_available(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<Deployment, ControllerError> {
        let poll = async {
            loop {
                match self.client.get_deployment(namespace, name).await {
                    Ok(deployment) if available_replicas(&deployment) >= 1 => return Ok(deployment),
                    Ok(_) => tokio::time::sleep(READY_POLL_INTERVAL).await,
                    Err(source) => {
                        return Err(ControllerError::Create {
                            kind: KIND_DEPLOYMENT,
                            name: name.to_string(),
                            source,
                        });
                    }
                }
            }
        };
        tokio::time::timeout(timeout, poll).await.map_err(|elapsed| {
            ControllerError::Timeout(format!(
                "deployment {}/{} has no available replica after {:?}: {}",
                namespace, name, timeout, elapsed
            ))
        })?
    }

    /// Sum of the resource versions of the Secrets and ConfigMaps `function`
    /// references. Changes whenever one of them changes.
    async fn referenced_rv_sum(&self, function: &Function, namespace: &str) -> Result<u64, ControllerError> {
        let mut sum = 0u64;
        for reference in &function.spec.secrets {
            let secret_ns = reference.namespace_or(namespace);
            let secret = self
                .client
                .get_secret(secret_ns, &reference.name)
                .await
                .map_err(|source| ControllerError::Read {
                    kind: ReferenceKind::Secret.as_str(),
                    name: format!("{}/{}", secret_ns, reference.name),
                    source,
                })?;
            sum = sum.wrapping_add(resource_version_number(&secret.metadata));
        }
        for reference in &function.spec.config_maps {
            let config_map_ns = reference.namespace_or(namespace);
            let config_map = self
                .client
                .get_config_map(config_map_ns, &reference.name)
                .await
                .map_err(|source| ControllerError::Read {
                    kind: ReferenceKind::ConfigMap.as_str(),
                    name: format!("{}/{}", config_map_ns, reference.name),
                    source,
                })?;
            sum = sum.wrapping_add(resource_version_number(&config_map.metadata));
        }
        Ok(sum)
    }

    /// Apply a function revision change.
    ///
    /// Autoscaler settings are patched onto the HPA; changes to the pod spec
    /// or referenced Secrets and ConfigMaps rebuild the deployment at its
    /// current replica count. Moving in or out of this executor creates or
    /// deletes the backend, deleting with the old revision.
    pub async fn update_function(&self, old: &Function, new: &Function) -> Result<(), ControllerError> {
        if old.metadata.resource_version == new.metadata.resource_version {
            return Ok(());
        }

        let diff = FunctionDiff::between(old, new, ExecutorType::Container);
        match diff.transition {
            ExecutorTransition::NotOurs => return Ok(()),
            ExecutorTransition::OutOf => return self.delete_function(old).await,
            ExecutorTransition::Into => return self.create_function(new).await.map(|_| ()),
            ExecutorTransition::Unchanged => {}
        }

        if diff.hpa_changed() {
            let meta = FunctionMeta::from_object_meta(&new.metadata)?;
            let fsvc = self.fs_cache.get_by_function_uid(&meta.uid)?;
            let patch = hpa_patch(&diff, new)?;
            self.client
                .patch_hpa(&meta.namespace, &fsvc.name, &patch)
                .await
                .inspect_err(|e| error!("Error patching HPA of {}: {}", new.display_name(), e))?;
            info!("Updated HPA of {}", new.display_name());
        }

        if diff.deployment_changed() {
            self.update_func_deployment(new)
                .await
                .inspect_err(|e| error!("Error updating deployment of {}: {}", new.display_name(), e))?;
            info!("Updated deployment of {}", new.display_name());
        }

        Ok(())
    }

    async fn update_func_deployment(&self, function: &Function) -> Result<(), ControllerError> {
        let meta = FunctionMeta::from_object_meta(&function.metadata)?;
        let fsvc = self.fs_cache.get_by_function_uid(&meta.uid)?;
        let existing = self.client.get_deployment(&meta.namespace, &fsvc.name).await?;

        let replicas = existing
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or_else(|| min_replicas(function.execution_strategy()));
        let rv_count = self.referenced_rv_sum(function, &meta.namespace).await?;
        let objects = FunctionObjects {
            function,
            meta: &meta,
            name: &fsvc.name,
            instance_id: &self.config.instance_id,
        };
        let mut desired = objects.deployment(replicas, rv_count)?;
        desired.metadata.resource_version = existing.metadata.resource_version;

        self.client.replace_deployment(&meta.namespace, &desired).await?;
        Ok(())
    }

    /// Remove the cache entry of `function` and delete its three objects
    pub async fn delete_function(&self, function: &Function) -> Result<(), ControllerError> {
        if function.executor_type() != ExecutorType::Container {
            return Ok(());
        }
        let meta = FunctionMeta::from_object_meta(&function.metadata)?;

        let name = match self.fs_cache.get_by_function_uid(&meta.uid) {
            Ok(fsvc) => {
                self.fs_cache.delete_old(&fsvc, Duration::ZERO);
                fsvc.name
            }
            Err(e) if e.is_not_found() => {
                debug!("{} was not cached, deleting its objects by name", function.display_name());
                object_name(&meta)
            }
            Err(e) => return Err(e.into()),
        };
        self.throttler.forget(&meta.uid);

        cleanup_objects(self.client.as_ref(), &meta.namespace, &name).await?;
        info!("Deleted backend of {}", function.display_name());
        Ok(())
    }

    /// Roll the pods of every container function mounting `namespace/name`.
    /// Returns how many functions were refreshed.
    pub async fn refresh_functions_referencing(
        &self,
        kind: ReferenceKind,
        namespace: &str,
        name: &str,
    ) -> Result<usize, ControllerError> {
        let mut errors = MultiError::new();
        let mut refreshed = 0;

        for scope in self.config.namespaces() {
            let functions = match self.client.list_functions(scope).await {
                Ok(functions) => functions,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            for function in functions.iter().filter(|f| {
                f.executor_type() == ExecutorType::Container && kind.is_referenced_by(f, namespace, name)
            }) {
                info!("{} {}/{} changed, refreshing pods of {}", kind, namespace, name, function.display_name());
                match self.refresh_func_pods(function).await {
                    Ok(()) => refreshed += 1,
                    Err(e) => errors.push(e),
                }
            }
        }

        errors.into_result().map(|()| refreshed)
    }

    fn spawn_cleanup(&self, namespace: &str, name: &str) {
        let client = Arc::clone(&self.client);
        let namespace = namespace.to_string();
        let name = name.to_string();
        tokio::spawn(async move {
            match cleanup_objects(client.as_ref(), &namespace, &name).await {
                Ok(()) => debug!("Cleaned up objects of {}/{}", namespace, name),
                Err(e) => error!("Error cleaning up objects of {}/{}: {}", namespace, name, e),
            }
        });
    }

    /// `(namespace, name)` of an object stamped by another executor instance
    fn foreign<'a>(&self, meta: &'a ObjectMeta) -> Option<(&'a str, &'a str)> {
        let instance = meta.annotations.as_ref()?.get(EXECUTOR_INSTANCE_ID)?;
        if *instance == self.config.instance_id {
            return None;
        }
        Some((meta.namespace.as_deref()?, meta.name.as_deref()?))
    }
}

#[async_trait]
impl Executor for ContainerExecutor {
    fn executor_type(&self) -> ExecutorType {
        ExecutorType::Container
    }

    async fn get_func_svc(&self, function: &Function) -> Result<FuncSvc, ControllerError> {
        self.create_function(function).await
    }

    fn get_func_svc_from_cache(&self, function: &Function) -> Result<FuncSvc, ControllerError> {
        let meta = FunctionMeta::from_object_meta(&function.metadata)?;
        Ok(self.fs_cache.get_by_function_uid(&meta.uid)?)
    }

    fn delete_func_svc_from_cache(&self, fsvc: &FuncSvc) {
        self.fs_cache.delete_entry(fsvc);
        self.throttler.forget(&fsvc.function.uid);
    }

    async fn tap_service(&self, address: &str) -> Result<(), ControllerError> {
        Ok(self.fs_cache.touch_by_address(address).await?)
    }

    async fn is_valid(&self, fsvc: &FuncSvc) -> bool {
        if fsvc.address.is_empty() || fsvc.kubernetes_objects.is_empty() {
            return false;
        }

        for object in &fsvc.kubernetes_objects {
            let Some(name) = object.name.as_deref() else {
                return false;
            };
            let namespace = object.namespace.as_deref().unwrap_or(&fsvc.function.namespace);
            let result = match object.kind.as_deref() {
                Some(KIND_SERVICE) => self.client.get_service(namespace, name).await.map(|_| true),
                Some(KIND_DEPLOYMENT) => self
                    .client
                    .get_deployment(namespace, name)
                    .await
                    .map(|d| available_replicas(&d) >= 1),
                _ => Ok(true),
            };
            match result {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Deployment {}/{} has no available replica", namespace, name);
                    return false;
                }
                Err(e) if e.is_not_found() => return false,
                Err(e) => {
                    error!("Error validating {}/{}: {}", namespace, name, e);
                    return false;
                }
            }
        }
        true
    }

    async fn refresh_func_pods(&self, function: &Function) -> Result<(), ControllerError> {
        let meta = FunctionMeta::from_object_meta(&function.metadata)?;
        let selector = label_selector(&selector_labels(&meta));
        let deployments = self.client.list_deployments(Some(&meta.namespace), &selector).await?;

        let rv_count = self.referenced_rv_sum(function, &meta.namespace).await?;
        let patch = rv_count_patch(&meta.name, rv_count);

        let mut errors = MultiError::new();
        for deployment in &deployments {
            let Some(name) = deployment.metadata.name.as_deref() else {
                continue;
            };
            debug!("Refreshing pods of {}/{}", meta.namespace, name);
            errors.collect(self.client.patch_deployment(&meta.namespace, name, &patch).await);
        }
        errors.into_result()
    }

    async fn adopt_existing_resources(&self) {
        let mut functions = Vec::new();
        for namespace in self.config.namespaces() {
            match self.client.list_functions(namespace).await {
                Ok(list) => functions.extend(list),
                Err(e) => warn!(
                    "Error listing functions in {}: {}",
                    namespace.unwrap_or("all namespaces"),
                    e
                ),
            }
        }
        functions.retain(|f| f.executor_type() == ExecutorType::Container);
        info!("Adopting {} container functions", functions.len());

        let results = join_all(functions.iter().map(|f| async move { (f, self.create_function(f).await) })).await;
        for (function, result) in results {
            match result {
                Ok(fsvc) => debug!("Adopted {} at {}", function.display_name(), fsvc.address),
                Err(e) => warn!("Error adopting {}: {}", function.display_name(), e),
            }
        }
    }

    async fn cleanup_old_executor_objects(&self) {
        let selector = executor_selector();
        let client = self.client.as_ref();
        let mut errors = MultiError::new();

        match client.list_hpas(None, &selector).await {
            Ok(hpas) => {
                for hpa in &hpas {
                    if let Some((namespace, name)) = self.foreign(&hpa.metadata) {
                        errors.collect(ignore_not_found(client.delete_hpa(namespace, name).await));
                    }
                }
            }
            Err(e) => errors.push(e),
        }
        match client.list_deployments(None, &selector).await {
            Ok(deployments) => {
                for deployment in &deployments {
                    if let Some((namespace, name)) = self.foreign(&deployment.metadata) {
                        errors.collect(ignore_not_found(client.delete_deployment(namespace, name).await));
                    }
                }
            }
            Err(e) => errors.push(e),
        }
        match client.list_services(None, &selector).await {
            Ok(services) => {
                for service in &services {
                    if let Some((namespace, name)) = self.foreign(&service.metadata) {
                        errors.collect(ignore_not_found(client.delete_service(namespace, name).await));
                    }
                }
            }
            Err(e) => errors.push(e),
        }

        match errors.into_result() {
            Ok(()) => info!("Cleaned up objects of previous executor instances"),
            Err(e) => error!("Error cleaning up objects of previous executor instances: {}", e),
        }
    }

    async fn dump_debug_info(&self) -> Result<PathBuf, ControllerError> {
        Ok(self.fs_cache.dump_debug_info(&self.config.dump_dir).await?)
    }
}

/// Return the existing object, creating it when absent. A create that loses
/// a race to another writer reads the winner's object.
async fn create_or_get<T, G, GFut, C, CFut>(kind: &'static str, name: &str, get: G, create: C) -> Result<T, ControllerError>
where
    G: Fn() -> GFut,
    GFut: Future<Output = Result<T, ClusterError>>,
    C: FnOnce() -> CFut,
    CFut: Future<Output = Result<T, ClusterError>>,
{
    let wrap = |source: ClusterError| ControllerError::Create {
        kind,
        name: name.to_string(),
        source,
    };

    match get().await {
        Ok(existing) => {
            debug!("Reusing existing {} {}", kind, name);
            return Ok(existing);
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(wrap(e)),
    }

    match create().await {
        Ok(created) => {
            debug!("Created {} {}", kind, name);
            Ok(created)
        }
        Err(e) if e.is_already_exists() => get().await.map_err(wrap),
        Err(e) => Err(wrap(e)),
    }
}

/// Delete the HPA, deployment and service named `name`. Missing objects are
/// not an error; every other failure is reported.
pub async fn cleanup_objects(client: &dyn ClusterClientTrait, namespace: &str, name: &str) -> Result<(), ControllerError> {
    let mut errors = MultiError::new();
    errors.collect(ignore_not_found(client.delete_hpa(namespace, name).await));
    errors.collect(ignore_not_found(client.delete_deployment(namespace, name).await));
    errors.collect(ignore_not_found(client.delete_service(namespace, name).await));
    errors.into_result()
}

fn ignore_not_found(result: Result<(), ClusterError>) -> Result<(), ClusterError> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

fn available_replicas(deployment: &Deployment) -> i32 {
    deployment
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0)
}

fn resource_version_number(meta: &ObjectMeta) -> u64 {
    meta.resource_version
        .as_deref()
        .and_then(|rv| rv.parse().ok())
        .unwrap_or(0)
}
