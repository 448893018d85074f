//! apps/v1 operations for MockClusterClient
//!
//! Handles Deployments. New and scaled Deployments report every requested
//! replica as available so readiness waits complete immediately.

use super::MockClusterClient;
use super::helpers::{in_namespace, key, lock, matches_selector, stamp_created, stamp_updated, strategic_merge};
use crate::error::ClusterError;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};

fn mark_all_available(deployment: &mut Deployment) {
    let replicas = deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let status = deployment.status.get_or_insert_with(DeploymentStatus::default);
    status.replicas = Some(replicas);
    status.available_replicas = Some(replicas);
}

pub async fn get_deployment(client: &MockClusterClient, namespace: &str, name: &str) -> Result<Deployment, ClusterError> {
    client.record("get_deployment", namespace, name)?;
    lock(&client.deployments)
        .get(&key(namespace, name))
        .cloned()
        .ok_or_else(|| ClusterError::NotFound(format!("deployment {}/{}", namespace, name)))
}

pub async fn create_deployment(client: &MockClusterClient, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError> {
    let name = deployment.metadata.name.clone().unwrap_or_default();
    client.record("create_deployment", namespace, &name)?;
    client.create_pause().await;

    let mut store = lock(&client.deployments);
    if store.contains_key(&key(namespace, &name)) {
        return Err(ClusterError::AlreadyExists(format!("deployment {}/{}", namespace, name)));
    }
    let mut created = deployment.clone();
    stamp_created(client, &mut created.metadata, namespace);
    mark_all_available(&mut created);
    store.insert(key(namespace, &name), created.clone());
    Ok(created)
}

pub async fn replace_deployment(client: &MockClusterClient, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError> {
    let name = deployment
        .metadata
        .name
        .clone()
        .ok_or_else(|| ClusterError::InvalidObject("deployment missing name".to_string()))?;
    client.record("replace_deployment", namespace, &name)?;

    let mut store = lock(&client.deployments);
    let existing = store
        .get(&key(namespace, &name))
        .ok_or_else(|| ClusterError::NotFound(format!("deployment {}/{}", namespace, name)))?;
    let mut replaced = deployment.clone();
    replaced.metadata.uid = existing.metadata.uid.clone();
    replaced.metadata.namespace = Some(namespace.to_string());
    stamp_updated(client, &mut replaced.metadata);
    mark_all_available(&mut replaced);
    store.insert(key(namespace, &name), replaced.clone());
    Ok(replaced)
}

pub async fn patch_deployment(
    client: &MockClusterClient,
    namespace: &str,
    name: &str,
    patch: &serde_json::Value,
) -> Result<Deployment, ClusterError> {
    client.record("patch_deployment", namespace, name)?;

    let mut store = lock(&client.deployments);
    let existing = store
        .get(&key(namespace, name))
        .ok_or_else(|| ClusterError::NotFound(format!("deployment {}/{}", namespace, name)))?;
    let mut value = serde_json::to_value(existing)?;
    strategic_merge(&mut value, patch);
    let mut patched: Deployment = serde_json::from_value(value)?;
    stamp_updated(client, &mut patched.metadata);
    store.insert(key(namespace, name), patched.clone());
    Ok(patched)
}

pub async fn scale_deployment(client: &MockClusterClient, namespace: &str, name: &str, replicas: i32) -> Result<Deployment, ClusterError> {
    client.record("scale_deployment", namespace, name)?;

    let mut store = lock(&client.deployments);
    let deployment = store
        .get_mut(&key(namespace, name))
        .ok_or_else(|| ClusterError::NotFound(format!("deployment {}/{}", namespace, name)))?;
    deployment.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
    mark_all_available(deployment);
    stamp_updated(client, &mut deployment.metadata);
    Ok(deployment.clone())
}

pub async fn delete_deployment(client: &MockClusterClient, namespace: &str, name: &str) -> Result<(), ClusterError> {
    client.record("delete_deployment", namespace, name)?;
    lock(&client.deployments)
        .remove(&key(namespace, name))
        .map(|_| ())
        .ok_or_else(|| ClusterError::NotFound(format!("deployment {}/{}", namespace, name)))
}

pub async fn list_deployments(
    client: &MockClusterClient,
    namespace: Option<&str>,
    label_selector: &str,
) -> Result<Vec<Deployment>, ClusterError> {
    client.record("list_deployments", namespace.unwrap_or_default(), label_selector)?;
    Ok(lock(&client.deployments)
        .iter()
        .filter(|((ns, _), d)| in_namespace(ns, namespace) && matches_selector(d.metadata.labels.as_ref(), label_selector))
        .map(|(_, d)| d.clone())
        .collect())
}
