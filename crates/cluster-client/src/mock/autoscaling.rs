//! autoscaling/v2 operations for MockClusterClient

use super::MockClusterClient;
use super::helpers::{in_namespace, key, lock, matches_selector, merge_patch, stamp_created, stamp_updated};
use crate::error::ClusterError;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;

pub async fn get_hpa(client: &MockClusterClient, namespace: &str, name: &str) -> Result<HorizontalPodAutoscaler, ClusterError> {
    client.record("get_hpa", namespace, name)?;
    lock(&client.hpas)
        .get(&key(namespace, name))
        .cloned()
        .ok_or_else(|| ClusterError::NotFound(format!("hpa {}/{}", namespace, name)))
}

pub async fn create_hpa(
    client: &MockClusterClient,
    namespace: &str,
    hpa: &HorizontalPodAutoscaler,
) -> Result<HorizontalPodAutoscaler, ClusterError> {
    let name = hpa.metadata.name.clone().unwrap_or_default();
    client.record("create_hpa", namespace, &name)?;
    client.create_pause().await;

    let mut store = lock(&client.hpas);
    if store.contains_key(&key(namespace, &name)) {
        return Err(ClusterError::AlreadyExists(format!("hpa {}/{}", namespace, name)));
    }
    let mut created = hpa.clone();
    stamp_created(client, &mut created.metadata, namespace);
    store.insert(key(namespace, &name), created.clone());
    Ok(created)
}

pub async fn patch_hpa(
    client: &MockClusterClient,
    namespace: &str,
    name: &str,
    patch: &serde_json::Value,
) -> Result<HorizontalPodAutoscaler, ClusterError> {
    client.record("patch_hpa", namespace, name)?;

    let mut store = lock(&client.hpas);
    let existing = store
        .get(&key(namespace, name))
        .ok_or_else(|| ClusterError::NotFound(format!("hpa {}/{}", namespace, name)))?;
    let mut value = serde_json::to_value(existing)?;
    merge_patch(&mut value, patch);
    let mut patched: HorizontalPodAutoscaler = serde_json::from_value(value)?;
    stamp_updated(client, &mut patched.metadata);
    store.insert(key(namespace, name), patched.clone());
    Ok(patched)
}

pub async fn delete_hpa(client: &MockClusterClient, namespace: &str, name: &str) -> Result<(), ClusterError> {
    client.record("delete_hpa", namespace, name)?;
    lock(&client.hpas)
        .remove(&key(namespace, name))
        .map(|_| ())
        .ok_or_else(|| ClusterError::NotFound(format!("hpa {}/{}", namespace, name)))
}

pub async fn list_hpas(
    client: &MockClusterClient,
    namespace: Option<&str>,
    label_selector: &str,
) -> Result<Vec<HorizontalPodAutoscaler>, ClusterError> {
    client.record("list_hpas", namespace.unwrap_or_default(), label_selector)?;
    Ok(lock(&client.hpas)
        .iter()
        .filter(|((ns, _), h)| in_namespace(ns, namespace) && matches_selector(h.metadata.labels.as_ref(), label_selector))
        .map(|(_, h)| h.clone())
        .collect())
}
