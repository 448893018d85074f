//! Function CRD
//!
//! A user-defined function together with the strategy used to back it with
//! cluster workloads.

use crate::references::{ConfigMapReference, EnvironmentReference, SecretReference};
use k8s_openapi::api::autoscaling::v2::{HorizontalPodAutoscalerBehavior, MetricSpec};
use k8s_openapi::api::core::v1::PodSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[kube(
    group = "funcd.io",
    version = "v1",
    kind = "Function",
    namespaced,
    shortname = "fn"
)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSpec {
    /// Environment the function runs in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentReference>,

    /// Secrets mounted into the function workload, in declaration order
    #[serde(default)]
    pub secrets: Vec<SecretReference>,

    /// ConfigMaps mounted into the function workload, in declaration order
    #[serde(default)]
    pub config_maps: Vec<ConfigMapReference>,

    /// How the function is invoked and scaled
    #[serde(default)]
    pub invoke_strategy: InvokeStrategy,

    /// Pod template for container-backed functions.
    ///
    /// The container whose name matches the function name is the function
    /// container; the first container is used when none matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::schema::preserve_unknown_object")]
    pub pod_spec: Option<PodSpec>,

    /// Seconds of inactivity after which the backend is scaled to `minScale`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<i64>,

    /// Requests a single pod may serve concurrently (pool executors)
    #[serde(default = "default_requests_per_pod")]
    pub requests_per_pod: u32,

    /// Maximum number of pods specialized concurrently (pool executors)
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

fn default_requests_per_pod() -> u32 {
    1
}

fn default_concurrency() -> u32 {
    500
}

/// Invocation strategy of a function.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct InvokeStrategy {
    /// Execution strategy
    #[serde(default)]
    pub execution_strategy: ExecutionStrategy,
}

/// Execution strategy: which executor owns the function and how it scales.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStrategy {
    /// Executor responsible for the function's backend
    #[serde(default)]
    pub executor_type: ExecutorType,

    /// Minimum replica count
    #[serde(default)]
    pub min_scale: i32,

    /// Maximum replica count
    #[serde(default)]
    pub max_scale: i32,

    /// CPU utilization target used when no explicit metrics are given
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "targetCPUPercent")]
    pub target_cpu_percent: Option<i32>,

    /// Seconds to wait for the backend to become ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization_timeout: Option<i64>,

    /// Autoscaler metrics (autoscaling/v2)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(schema_with = "crate::schema::preserve_unknown_array")]
    pub metrics: Vec<MetricSpec>,

    /// Autoscaler behavior (autoscaling/v2)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::schema::preserve_unknown_object")]
    pub behavior: Option<HorizontalPodAutoscalerBehavior>,
}

/// Executor type owning a function.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorType {
    /// Warm pool of generic pods specialized on demand
    #[default]
    Poolmgr,

    /// One deployment per function built from an environment image
    Newdeploy,

    /// One deployment per function built from the function's own pod spec
    Container,
}

impl ExecutorType {
    /// Wire value used in labels and the CRD
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutorType::Poolmgr => "poolmgr",
            ExecutorType::Newdeploy => "newdeploy",
            ExecutorType::Container => "container",
        }
    }
}

impl fmt::Display for ExecutorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Function {
    /// Executor type declared in the function's execution strategy
    pub fn executor_type(&self) -> ExecutorType {
        self.spec.invoke_strategy.execution_strategy.executor_type
    }

    /// Shorthand for the execution strategy
    pub fn execution_strategy(&self) -> &ExecutionStrategy {
        &self.spec.invoke_strategy.execution_strategy
    }

    /// `namespace/name`, for log lines and error context
    pub fn display_name(&self) -> String {
        format!(
            "{}/{}",
            self.metadata.namespace.as_deref().unwrap_or("default"),
            self.metadata.name.as_deref().unwrap_or("<unknown>")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_type_wire_format() {
        let json = serde_json::to_string(&ExecutorType::Container).unwrap();
        assert_eq!(json, "\"container\"");
        let parsed: ExecutorType = serde_json::from_str("\"newdeploy\"").unwrap();
        assert_eq!(parsed, ExecutorType::Newdeploy);
        assert_eq!(ExecutorType::Poolmgr.to_string(), "poolmgr");
    }

    #[test]
    fn test_function_spec_defaults() {
        let spec: FunctionSpec = serde_json::from_value(serde_json::json!({
            "invokeStrategy": {
                "executionStrategy": {
                    "executorType": "container",
                    "minScale": 1,
                    "maxScale": 5,
                    "targetCPUPercent": 80
                }
            }
        }))
        .unwrap();

        let strategy = &spec.invoke_strategy.execution_strategy;
        assert_eq!(strategy.executor_type, ExecutorType::Container);
        assert_eq!(strategy.min_scale, 1);
        assert_eq!(strategy.max_scale, 5);
        assert_eq!(strategy.target_cpu_percent, Some(80));
        assert!(strategy.metrics.is_empty());
        assert_eq!(spec.requests_per_pod, 1);
        assert_eq!(spec.concurrency, 500);
        assert!(spec.secrets.is_empty());
    }

    #[test]
    fn test_crd_generation() {
        use kube::CustomResourceExt;
        let crd = Function::crd();
        assert_eq!(crd.spec.group, "funcd.io");
        assert_eq!(crd.spec.names.kind, "Function");
    }
}
