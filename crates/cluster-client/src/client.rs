//! Kubernetes API client
//!
//! Implements [`ClusterClientTrait`] on top of `kube::Api`.

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crds::Function;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// Kubernetes-backed cluster client
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Wrap an existing `kube::Client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the in-cluster or kubeconfig environment
    pub async fn try_default() -> Result<Self, ClusterError> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    /// Access the underlying `kube::Client`
    pub fn kube_client(&self) -> &Client {
        &self.client
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn scoped<K>(&self, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

async fn list_with_selector<K>(api: Api<K>, label_selector: &str) -> Result<Vec<K>, ClusterError>
where
    K: Clone + DeserializeOwned + Debug,
{
    let mut params = ListParams::default();
    if !label_selector.is_empty() {
        params = params.labels(label_selector);
    }
    let list = api.list(&params).await?;
    Ok(list.items)
}

async fn delete_background<K>(api: Api<K>, name: &str) -> Result<(), ClusterError>
where
    K: Clone + DeserializeOwned + Debug,
{
    api.delete(name, &DeleteParams::background()).await?;
    Ok(())
}

#[async_trait::async_trait]
impl ClusterClientTrait for KubeClusterClient {
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, ClusterError> {
        Ok(self.namespaced::<Service>(namespace).get(name).await?)
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<Service, ClusterError> {
        debug!("Creating service {}/{:?}", namespace, service.metadata.name);
        Ok(self
            .namespaced::<Service>(namespace)
            .create(&PostParams::default(), service)
            .await?)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        delete_background(self.namespaced::<Service>(namespace), name).await
    }

    async fn list_services(&self, namespace: Option<&str>, label_selector: &str) -> Result<Vec<Service>, ClusterError> {
        list_with_selector(self.scoped::<Service>(namespace), label_selector).await
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, ClusterError> {
        Ok(self.namespaced::<Deployment>(namespace).get(name).await?)
    }

    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        debug!("Creating deployment {}/{:?}", namespace, deployment.metadata.name);
        Ok(self
            .namespaced::<Deployment>(namespace)
            .create(&PostParams::default(), deployment)
            .await?)
    }

    async fn replace_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        let name = deployment
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ClusterError::InvalidObject("deployment missing name".to_string()))?;
        Ok(self
            .namespaced::<Deployment>(namespace)
            .replace(name, &PostParams::default(), deployment)
            .await?)
    }

    async fn patch_deployment(&self, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<Deployment, ClusterError> {
        Ok(self
            .namespaced::<Deployment>(namespace)
            .patch(name, &PatchParams::default(), &Patch::Strategic(patch))
            .await?)
    }

    async fn scale_deployment(&self, namespace: &str, name: &str, replicas: i32) -> Result<Deployment, ClusterError> {
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });
        Ok(self
            .namespaced::<Deployment>(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        delete_background(self.namespaced::<Deployment>(namespace), name).await
    }

    async fn list_deployments(&self, namespace: Option<&str>, label_selector: &str) -> Result<Vec<Deployment>, ClusterError> {
        list_with_selector(self.scoped::<Deployment>(namespace), label_selector).await
    }

    async fn get_hpa(&self, namespace: &str, name: &str) -> Result<HorizontalPodAutoscaler, ClusterError> {
        Ok(self.namespaced::<HorizontalPodAutoscaler>(namespace).get(name).await?)
    }

    async fn create_hpa(&self, namespace: &str, hpa: &HorizontalPodAutoscaler) -> Result<HorizontalPodAutoscaler, ClusterError> {
        debug!("Creating HPA {}/{:?}", namespace, hpa.metadata.name);
        Ok(self
            .namespaced::<HorizontalPodAutoscaler>(namespace)
            .create(&PostParams::default(), hpa)
            .await?)
    }

    async fn patch_hpa(&self, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<HorizontalPodAutoscaler, ClusterError> {
        Ok(self
            .namespaced::<HorizontalPodAutoscaler>(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }

    async fn delete_hpa(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        delete_background(self.namespaced::<HorizontalPodAutoscaler>(namespace), name).await
    }

    async fn list_hpas(&self, namespace: Option<&str>, label_selector: &str) -> Result<Vec<HorizontalPodAutoscaler>, ClusterError> {
        list_with_selector(self.scoped::<HorizontalPodAutoscaler>(namespace), label_selector).await
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, ClusterError> {
        Ok(self.namespaced::<Secret>(namespace).get(name).await?)
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, ClusterError> {
        Ok(self.namespaced::<ConfigMap>(namespace).get(name).await?)
    }

    async fn get_function(&self, namespace: &str, name: &str) -> Result<Function, ClusterError> {
        Ok(self.namespaced::<Function>(namespace).get(name).await?)
    }

    async fn list_functions(&self, namespace: Option<&str>) -> Result<Vec<Function>, ClusterError> {
        list_with_selector(self.scoped::<Function>(namespace), "").await
    }
}
