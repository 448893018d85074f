//! Test utilities for unit testing the container executor
//!
//! Fixture builders for functions and referenced objects, and an executor
//! wired to a `MockClusterClient`.

use crate::config::ExecutorConfig;
use crate::executor::ContainerExecutor;
use crate::metrics::ExecutorMetrics;
use cluster_client::MockClusterClient;
use crds::{ExecutionStrategy, ExecutorType, Function, FunctionSpec, InvokeStrategy};
use k8s_openapi::api::core::v1::{ConfigMap, Container, ContainerPort, PodSpec, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::sync::Arc;
use std::time::Duration;

/// Container function with MinScale 1, MaxScale 5 and a CPU target of 80%
pub fn container_function(name: &str, namespace: &str, uid: &str) -> Function {
    let mut function = Function::new(
        name,
        FunctionSpec {
            invoke_strategy: InvokeStrategy {
                execution_strategy: ExecutionStrategy {
                    executor_type: ExecutorType::Container,
                    min_scale: 1,
                    max_scale: 5,
                    target_cpu_percent: Some(80),
                    ..Default::default()
                },
            },
            pod_spec: Some(PodSpec {
                containers: vec![Container {
                    name: name.to_string(),
                    image: Some("ghcr.io/funcd/hello:1.0".to_string()),
                    ports: Some(vec![ContainerPort {
                        container_port: 8080,
                        ..Default::default()
                    }]),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            requests_per_pod: 1,
            concurrency: 500,
            ..Default::default()
        },
    );
    function.metadata = ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        uid: Some(uid.to_string()),
        resource_version: Some("1".to_string()),
        generation: Some(1),
        ..Default::default()
    };
    function
}

/// `function` at a new resource version
pub fn next_revision(function: &Function, resource_version: &str) -> Function {
    let mut next = function.clone();
    next.metadata.resource_version = Some(resource_version.to_string());
    next
}

pub fn secret(namespace: &str, name: &str, resource_version: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            resource_version: Some(resource_version.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn config_map(namespace: &str, name: &str, resource_version: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            resource_version: Some(resource_version.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Configuration with no reaper pre-filter so freshly cached entries are
/// eligible immediately
pub fn test_config() -> ExecutorConfig {
    ExecutorConfig {
        instance_id: "test-instance".to_string(),
        idle_prefilter: Duration::ZERO,
        dump_dir: std::env::temp_dir(),
        ..Default::default()
    }
}

pub fn test_executor(mock: &MockClusterClient) -> Arc<ContainerExecutor> {
    test_executor_with_config(mock, test_config())
}

pub fn test_executor_with_config(mock: &MockClusterClient, config: ExecutorConfig) -> Arc<ContainerExecutor> {
    let metrics = ExecutorMetrics::new().unwrap();
    Arc::new(ContainerExecutor::new(Arc::new(mock.clone()), config, metrics))
}

/// Poll `condition` until it holds, for up to a second
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
