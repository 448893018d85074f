//! ClusterClient trait for mocking
//!
//! This trait abstracts the Kubernetes API calls made by executors so
//! reconciliation logic can run against an in-memory implementation in
//! unit tests.

use crate::error::ClusterError;
use crds::Function;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};

/// Trait for cluster API operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// `namespace: None` on list operations means all namespaces; an empty
/// `label_selector` selects everything.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    // Services
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, ClusterError>;
    async fn create_service(&self, namespace: &str, service: &Service) -> Result<Service, ClusterError>;
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
    async fn list_services(&self, namespace: Option<&str>, label_selector: &str) -> Result<Vec<Service>, ClusterError>;

    // Deployments
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, ClusterError>;
    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError>;
    async fn replace_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError>;
    /// Apply a strategic-merge patch
    async fn patch_deployment(&self, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<Deployment, ClusterError>;
    async fn scale_deployment(&self, namespace: &str, name: &str, replicas: i32) -> Result<Deployment, ClusterError>;
    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
    async fn list_deployments(&self, namespace: Option<&str>, label_selector: &str) -> Result<Vec<Deployment>, ClusterError>;

    // HorizontalPodAutoscalers (autoscaling/v2)
    async fn get_hpa(&self, namespace: &str, name: &str) -> Result<HorizontalPodAutoscaler, ClusterError>;
    async fn create_hpa(&self, namespace: &str, hpa: &HorizontalPodAutoscaler) -> Result<HorizontalPodAutoscaler, ClusterError>;
    /// Apply a JSON merge patch
    async fn patch_hpa(&self, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<HorizontalPodAutoscaler, ClusterError>;
    async fn delete_hpa(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
    async fn list_hpas(&self, namespace: Option<&str>, label_selector: &str) -> Result<Vec<HorizontalPodAutoscaler>, ClusterError>;

    // Referenced configuration
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, ClusterError>;
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, ClusterError>;

    // Functions
    async fn get_function(&self, namespace: &str, name: &str) -> Result<Function, ClusterError>;
    async fn list_functions(&self, namespace: Option<&str>) -> Result<Vec<Function>, ClusterError>;
}
