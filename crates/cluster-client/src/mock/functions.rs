//! Function custom resource reads for MockClusterClient

use super::MockClusterClient;
use super::helpers::{in_namespace, key, lock};
use crate::error::ClusterError;
use crds::Function;

pub async fn get_function(client: &MockClusterClient, namespace: &str, name: &str) -> Result<Function, ClusterError> {
    client.record("get_function", namespace, name)?;
    lock(&client.functions)
        .get(&key(namespace, name))
        .cloned()
        .ok_or_else(|| ClusterError::NotFound(format!("function {}/{}", namespace, name)))
}

pub async fn list_functions(client: &MockClusterClient, namespace: Option<&str>) -> Result<Vec<Function>, ClusterError> {
    client.record("list_functions", namespace.unwrap_or_default(), "")?;
    Ok(lock(&client.functions)
        .iter()
        .filter(|((ns, _), _)| in_namespace(ns, namespace))
        .map(|(_, f)| f.clone())
        .collect())
}
