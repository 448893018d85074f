//! core/v1 operations for MockClusterClient
//!
//! Handles Services, Secrets and ConfigMaps. Secrets and ConfigMaps are
//! read-only through the trait; tests seed them with `add_secret` and
//! `add_config_map`.

use super::MockClusterClient;
use super::helpers::{in_namespace, key, lock, matches_selector, stamp_created};
use crate::error::ClusterError;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};

pub async fn get_service(client: &MockClusterClient, namespace: &str, name: &str) -> Result<Service, ClusterError> {
    client.record("get_service", namespace, name)?;
    lock(&client.services)
        .get(&key(namespace, name))
        .cloned()
        .ok_or_else(|| ClusterError::NotFound(format!("service {}/{}", namespace, name)))
}

pub async fn create_service(client: &MockClusterClient, namespace: &str, service: &Service) -> Result<Service, ClusterError> {
    let name = service.metadata.name.clone().unwrap_or_default();
    client.record("create_service", namespace, &name)?;
    client.create_pause().await;

    let mut store = lock(&client.services);
    if store.contains_key(&key(namespace, &name)) {
        return Err(ClusterError::AlreadyExists(format!("service {}/{}", namespace, name)));
    }
    let mut created = service.clone();
    stamp_created(client, &mut created.metadata, namespace);
    store.insert(key(namespace, &name), created.clone());
    Ok(created)
}

pub async fn delete_service(client: &MockClusterClient, namespace: &str, name: &str) -> Result<(), ClusterError> {
    client.record("delete_service", namespace, name)?;
    lock(&client.services)
        .remove(&key(namespace, name))
        .map(|_| ())
        .ok_or_else(|| ClusterError::NotFound(format!("service {}/{}", namespace, name)))
}

pub async fn list_services(client: &MockClusterClient, namespace: Option<&str>, label_selector: &str) -> Result<Vec<Service>, ClusterError> {
    client.record("list_services", namespace.unwrap_or_default(), label_selector)?;
    Ok(lock(&client.services)
        .iter()
        .filter(|((ns, _), s)| in_namespace(ns, namespace) && matches_selector(s.metadata.labels.as_ref(), label_selector))
        .map(|(_, s)| s.clone())
        .collect())
}

pub async fn get_secret(client: &MockClusterClient, namespace: &str, name: &str) -> Result<Secret, ClusterError> {
    client.record("get_secret", namespace, name)?;
    lock(&client.secrets)
        .get(&key(namespace, name))
        .cloned()
        .ok_or_else(|| ClusterError::NotFound(format!("secret {}/{}", namespace, name)))
}

pub async fn get_config_map(client: &MockClusterClient, namespace: &str, name: &str) -> Result<ConfigMap, ClusterError> {
    client.record("get_config_map", namespace, name)?;
    lock(&client.config_maps)
        .get(&key(namespace, name))
        .cloned()
        .ok_or_else(|| ClusterError::NotFound(format!("configmap {}/{}", namespace, name)))
}
