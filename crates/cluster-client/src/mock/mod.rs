//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of [`ClusterClientTrait`]
//! that can be used in unit tests without a running API server.
//!
//! The mock is organized into API-group modules:
//! - `apps.rs` - Deployments
//! - `core_v1.rs` - Services, Secrets and ConfigMaps
//! - `autoscaling.rs` - HorizontalPodAutoscalers
//! - `functions.rs` - Function custom resources
//! - `helpers.rs` - store locking, selector matching and patch helpers
//!
//! Every trait call is recorded, can be made to fail with [`MockClusterClient::fail_on`],
//! and creates can be slowed down with [`MockClusterClient::set_create_delay`]
//! to exercise concurrent callers.

mod apps;
mod autoscaling;
mod core_v1;
mod functions;
mod helpers;

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crds::Function;
use helpers::{key, lock};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) type Store<T> = Arc<Mutex<HashMap<(String, String), T>>>;

/// A recorded trait call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    /// Trait method name, e.g. `create_deployment`
    pub operation: String,
    /// Namespace argument (empty for cluster-wide lists)
    pub namespace: String,
    /// Object name or label selector
    pub target: String,
}

/// Mock ClusterClient for testing
///
/// Objects live in per-kind maps keyed by `(namespace, name)`. Creates stamp
/// a UID and a monotonically increasing resource version the way the API
/// server would, and new Deployments report all replicas available.
#[derive(Clone)]
pub struct MockClusterClient {
    pub(crate) services: Store<Service>,
    pub(crate) deployments: Store<Deployment>,
    pub(crate) hpas: Store<HorizontalPodAutoscaler>,
    pub(crate) secrets: Store<Secret>,
    pub(crate) config_maps: Store<ConfigMap>,
    pub(crate) functions: Store<Function>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    failures: Arc<Mutex<HashSet<String>>>,
    create_delay: Arc<Mutex<Option<Duration>>>,
    next_resource_version: Arc<Mutex<u64>>,
}

impl Default for MockClusterClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClusterClient {
    /// Create an empty mock cluster
    pub fn new() -> Self {
        Self {
            services: Arc::new(Mutex::new(HashMap::new())),
            deployments: Arc::new(Mutex::new(HashMap::new())),
            hpas: Arc::new(Mutex::new(HashMap::new())),
            secrets: Arc::new(Mutex::new(HashMap::new())),
            config_maps: Arc::new(Mutex::new(HashMap::new())),
            functions: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(HashSet::new())),
            create_delay: Arc::new(Mutex::new(None)),
            next_resource_version: Arc::new(Mutex::new(1)),
        }
    }

    /// Add a Function to the mock store (for test setup)
    pub fn add_function(&self, function: Function) {
        let ns = function.metadata.namespace.clone().unwrap_or_default();
        let name = function.metadata.name.clone().unwrap_or_default();
        lock(&self.functions).insert(key(&ns, &name), function);
    }

    /// Add a Secret to the mock store (for test setup)
    pub fn add_secret(&self, secret: Secret) {
        let ns = secret.metadata.namespace.clone().unwrap_or_default();
        let name = secret.metadata.name.clone().unwrap_or_default();
        lock(&self.secrets).insert(key(&ns, &name), secret);
    }

    /// Add a ConfigMap to the mock store (for test setup)
    pub fn add_config_map(&self, config_map: ConfigMap) {
        let ns = config_map.metadata.namespace.clone().unwrap_or_default();
        let name = config_map.metadata.name.clone().unwrap_or_default();
        lock(&self.config_maps).insert(key(&ns, &name), config_map);
    }

    /// Add a Deployment as-is, without stamping metadata (for test setup)
    pub fn add_deployment(&self, deployment: Deployment) {
        let ns = deployment.metadata.namespace.clone().unwrap_or_default();
        let name = deployment.metadata.name.clone().unwrap_or_default();
        lock(&self.deployments).insert(key(&ns, &name), deployment);
    }

    /// Add a Service as-is (for test setup)
    pub fn add_service(&self, service: Service) {
        let ns = service.metadata.namespace.clone().unwrap_or_default();
        let name = service.metadata.name.clone().unwrap_or_default();
        lock(&self.services).insert(key(&ns, &name), service);
    }

    /// Add an HPA as-is (for test setup)
    pub fn add_hpa(&self, hpa: HorizontalPodAutoscaler) {
        let ns = hpa.metadata.namespace.clone().unwrap_or_default();
        let name = hpa.metadata.name.clone().unwrap_or_default();
        lock(&self.hpas).insert(key(&ns, &name), hpa);
    }

    /// Override the available replica count reported for a Deployment
    pub fn set_available_replicas(&self, namespace: &str, name: &str, available: i32) {
        if let Some(deployment) = lock(&self.deployments).get_mut(&key(namespace, name)) {
            deployment
                .status
                .get_or_insert_with(DeploymentStatus::default)
                .available_replicas = Some(available);
        }
    }

    /// Remove a Deployment behind the controller's back
    pub fn remove_deployment(&self, namespace: &str, name: &str) {
        lock(&self.deployments).remove(&key(namespace, name));
    }

    /// Current Deployment, if any (for assertions)
    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        lock(&self.deployments).get(&key(namespace, name)).cloned()
    }

    /// Current Service, if any (for assertions)
    pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        lock(&self.services).get(&key(namespace, name)).cloned()
    }

    /// Current HPA, if any (for assertions)
    pub fn hpa(&self, namespace: &str, name: &str) -> Option<HorizontalPodAutoscaler> {
        lock(&self.hpas).get(&key(namespace, name)).cloned()
    }

    /// Number of stored Deployments across all namespaces
    pub fn deployment_count(&self) -> usize {
        lock(&self.deployments).len()
    }

    /// Number of stored Services across all namespaces
    pub fn service_count(&self) -> usize {
        lock(&self.services).len()
    }

    /// Number of stored HPAs across all namespaces
    pub fn hpa_count(&self) -> usize {
        lock(&self.hpas).len()
    }

    /// All recorded calls, in order
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    /// Number of recorded calls to `operation`
    pub fn call_count(&self, operation: &str) -> usize {
        lock(&self.calls).iter().filter(|c| c.operation == operation).count()
    }

    /// Forget all recorded calls
    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Make every subsequent call to `operation` fail with an API error
    pub fn fail_on(&self, operation: &str) {
        lock(&self.failures).insert(operation.to_string());
    }

    /// Undo [`fail_on`](Self::fail_on)
    pub fn clear_failure(&self, operation: &str) {
        lock(&self.failures).remove(operation);
    }

    /// Delay applied to every create call before it touches the store
    pub fn set_create_delay(&self, delay: Duration) {
        *lock(&self.create_delay) = Some(delay);
    }

    /// Record a call and apply injected failures
    pub(crate) fn record(&self, operation: &str, namespace: &str, target: &str) -> Result<(), ClusterError> {
        lock(&self.calls).push(MockCall {
            operation: operation.to_string(),
            namespace: namespace.to_string(),
            target: target.to_string(),
        });
        if lock(&self.failures).contains(operation) {
            return Err(ClusterError::Api(format!("injected failure for {}", operation)));
        }
        Ok(())
    }

    /// Sleep for the configured create delay, if any
    pub(crate) async fn create_pause(&self) {
        let delay = *lock(&self.create_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Generate next resource version
    pub(crate) fn next_resource_version(&self) -> String {
        let mut rv = lock(&self.next_resource_version);
        let current = *rv;
        *rv += 1;
        current.to_string()
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, ClusterError> {
        core_v1::get_service(self, namespace, name).await
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<Service, ClusterError> {
        core_v1::create_service(self, namespace, service).await
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        core_v1::delete_service(self, namespace, name).await
    }

    async fn list_services(&self, namespace: Option<&str>, label_selector: &str) -> Result<Vec<Service>, ClusterError> {
        core_v1::list_services(self, namespace, label_selector).await
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, ClusterError> {
        apps::get_deployment(self, namespace, name).await
    }

    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        apps::create_deployment(self, namespace, deployment).await
    }

    async fn replace_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        apps::replace_deployment(self, namespace, deployment).await
    }

    async fn patch_deployment(&self, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<Deployment, ClusterError> {
        apps::patch_deployment(self, namespace, name, patch).await
    }

    async fn scale_deployment(&self, namespace: &str, name: &str, replicas: i32) -> Result<Deployment, ClusterError> {
        apps::scale_deployment(self, namespace, name, replicas).await
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        apps::delete_deployment(self, namespace, name).await
    }

    async fn list_deployments(&self, namespace: Option<&str>, label_selector: &str) -> Result<Vec<Deployment>, ClusterError> {
        apps::list_deployments(self, namespace, label_selector).await
    }

    async fn get_hpa(&self, namespace: &str, name: &str) -> Result<HorizontalPodAutoscaler, ClusterError> {
        autoscaling::get_hpa(self, namespace, name).await
    }

    async fn create_hpa(&self, namespace: &str, hpa: &HorizontalPodAutoscaler) -> Result<HorizontalPodAutoscaler, ClusterError> {
        autoscaling::create_hpa(self, namespace, hpa).await
    }

    async fn patch_hpa(&self, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<HorizontalPodAutoscaler, ClusterError> {
        autoscaling::patch_hpa(self, namespace, name, patch).await
    }

    async fn delete_hpa(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        autoscaling::delete_hpa(self, namespace, name).await
    }

    async fn list_hpas(&self, namespace: Option<&str>, label_selector: &str) -> Result<Vec<HorizontalPodAutoscaler>, ClusterError> {
        autoscaling::list_hpas(self, namespace, label_selector).await
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, ClusterError> {
        core_v1::get_secret(self, namespace, name).await
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, ClusterError> {
        core_v1::get_config_map(self, namespace, name).await
    }

    async fn get_function(&self, namespace: &str, name: &str) -> Result<Function, ClusterError> {
        functions::get_function(self, namespace, name).await
    }

    async fn list_functions(&self, namespace: Option<&str>) -> Result<Vec<Function>, ClusterError> {
        functions::list_functions(self, namespace).await
    }
}
