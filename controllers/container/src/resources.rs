//! Builders for the Service, Deployment and HorizontalPodAutoscaler backing
//! a container function, and the patches applied to them afterwards.

use crate::diff::FunctionDiff;
use crate::error::ControllerError;
use crate::naming::{function_annotations, function_labels, selector_labels};
use crds::{ExecutionStrategy, Function, RESOURCE_VERSION_COUNT};
use fscache::FunctionMeta;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec, MetricSpec, MetricTarget,
    ResourceMetricSource,
};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, ObjectReference, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde_json::{Map, Value, json};

/// Port the function container listens on when its pod spec declares none
pub const DEFAULT_TARGET_PORT: i32 = 8888;

/// Kinds recorded in a function service's object references
pub const KIND_SERVICE: &str = "Service";
pub const KIND_DEPLOYMENT: &str = "Deployment";
pub const KIND_HPA: &str = "HorizontalPodAutoscaler";

/// Everything needed to render the objects of one function revision
#[derive(Debug, Clone)]
pub struct FunctionObjects<'a> {
    pub function: &'a Function,
    pub meta: &'a FunctionMeta,
    pub name: &'a str,
    pub instance_id: &'a str,
}

impl FunctionObjects<'_> {
    fn object_meta(&self) -> ObjectMeta {
        ObjectMeta {
            name: Some(self.name.to_string()),
            namespace: Some(self.meta.namespace.clone()),
            labels: Some(function_labels(self.meta, self.function.metadata.labels.as_ref())),
            annotations: Some(function_annotations(self.meta, self.instance_id)),
            ..Default::default()
        }
    }

    /// ClusterIP service on port 80 in front of the function container
    pub fn service(&self) -> Result<Service, ControllerError> {
        let target_port = function_container(pod_spec(self.function)?, &self.meta.name)
            .and_then(|c| c.ports.as_ref())
            .and_then(|ports| ports.first())
            .map_or(DEFAULT_TARGET_PORT, |p| p.container_port);

        Ok(Service {
            metadata: self.object_meta(),
            spec: Some(ServiceSpec {
                type_: Some("ClusterIP".to_string()),
                selector: Some(selector_labels(self.meta)),
                ports: Some(vec![ServicePort {
                    name: Some("http".to_string()),
                    protocol: Some("TCP".to_string()),
                    port: 80,
                    target_port: Some(IntOrString::Int(target_port)),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: None,
        })
    }

    /// Deployment running the function's pod spec with `replicas` pods.
    ///
    /// The function container is renamed after the function, if needed, so
    /// later env patches can address it by name.
    pub fn deployment(&self, replicas: i32, rv_count: u64) -> Result<Deployment, ControllerError> {
        let mut pod = pod_spec(self.function)?.clone();
        let index = function_container_index(&pod, &self.meta.name).ok_or_else(|| {
            ControllerError::InvalidFunction(format!("{} has no containers", self.function.display_name()))
        })?;
        let container = &mut pod.containers[index];
        container.name = self.meta.name.clone();
        set_env(container, RESOURCE_VERSION_COUNT, &rv_count.to_string());

        let metadata = self.object_meta();
        Ok(Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                selector: LabelSelector {
                    match_labels: Some(selector_labels(self.meta)),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: metadata.labels.clone(),
                        annotations: metadata.annotations.clone(),
                        ..Default::default()
                    }),
                    spec: Some(pod),
                },
                ..Default::default()
            }),
            metadata,
            status: None,
        })
    }

    /// Autoscaler targeting the function's deployment
    pub fn hpa(&self) -> HorizontalPodAutoscaler {
        let strategy = self.function.execution_strategy();
        let metrics = hpa_metrics(strategy);

        HorizontalPodAutoscaler {
            metadata: self.object_meta(),
            spec: Some(HorizontalPodAutoscalerSpec {
                scale_target_ref: CrossVersionObjectReference {
                    api_version: Some("apps/v1".to_string()),
                    kind: KIND_DEPLOYMENT.to_string(),
                    name: self.name.to_string(),
                },
                min_replicas: Some(min_replicas(strategy)),
                max_replicas: max_replicas(strategy),
                metrics: (!metrics.is_empty()).then_some(metrics),
                behavior: strategy.behavior.clone(),
            }),
            status: None,
        }
    }
}

/// Initial replica count of a function's deployment
pub fn min_replicas(strategy: &ExecutionStrategy) -> i32 {
    strategy.min_scale.max(1)
}

fn max_replicas(strategy: &ExecutionStrategy) -> i32 {
    strategy.max_scale.max(min_replicas(strategy))
}

/// Explicit metrics, else CPU utilization when a target is set
fn hpa_metrics(strategy: &ExecutionStrategy) -> Vec<MetricSpec> {
    if !strategy.metrics.is_empty() {
        return strategy.metrics.clone();
    }
    strategy
        .target_cpu_percent
        .map(|percent| MetricSpec {
            type_: "Resource".to_string(),
            resource: Some(ResourceMetricSource {
                name: "cpu".to_string(),
                target: MetricTarget {
                    type_: "Utilization".to_string(),
                    average_utilization: Some(percent),
                    ..Default::default()
                },
            }),
            ..Default::default()
        })
        .into_iter()
        .collect()
}

/// Merge patch carrying only the autoscaler fields flagged in `diff`
pub fn hpa_patch(diff: &FunctionDiff, function: &Function) -> Result<Value, ControllerError> {
    let strategy = function.execution_strategy();
    let mut spec = Map::new();

    if diff.min_scale {
        spec.insert("minReplicas".to_string(), json!(min_replicas(strategy)));
    }
    if diff.min_scale || diff.max_scale {
        spec.insert("maxReplicas".to_string(), json!(max_replicas(strategy)));
    }
    if diff.metrics || diff.target_cpu {
        let metrics = hpa_metrics(strategy);
        let value = if metrics.is_empty() {
            Value::Null
        } else {
            serde_json::to_value(metrics).map_err(|e| ControllerError::InvalidFunction(e.to_string()))?
        };
        spec.insert("metrics".to_string(), value);
    }
    if diff.behavior {
        let value =
            serde_json::to_value(&strategy.behavior).map_err(|e| ControllerError::InvalidFunction(e.to_string()))?;
        spec.insert("behavior".to_string(), value);
    }

    Ok(json!({ "spec": spec }))
}

/// Strategic merge patch setting `RESOURCE_VERSION_COUNT` on the function
/// container, which rolls the pods without touching the rest of the template
pub fn rv_count_patch(container_name: &str, rv_count: u64) -> Value {
    json!({
        "spec": {
            "template": {
                "spec": {
                    "containers": [{
                        "name": container_name,
                        "env": [{ "name": RESOURCE_VERSION_COUNT, "value": rv_count.to_string() }]
                    }]
                }
            }
        }
    })
}

/// Reference to a created object, as kept in the function service cache
pub fn object_reference(kind: &str, api_version: &str, meta: &ObjectMeta) -> ObjectReference {
    ObjectReference {
        kind: Some(kind.to_string()),
        api_version: Some(api_version.to_string()),
        name: meta.name.clone(),
        namespace: meta.namespace.clone(),
        uid: meta.uid.clone(),
        resource_version: meta.resource_version.clone(),
        ..Default::default()
    }
}

/// CPU limit of the function container, if it declares one
pub fn cpu_limit(function: &Function, function_name: &str) -> Option<Quantity> {
    let pod = function.spec.pod_spec.as_ref()?;
    function_container(pod, function_name)?
        .resources
        .as_ref()?
        .limits
        .as_ref()?
        .get("cpu")
        .cloned()
}

fn pod_spec(function: &Function) -> Result<&PodSpec, ControllerError> {
    function
        .spec
        .pod_spec
        .as_ref()
        .ok_or_else(|| ControllerError::InvalidFunction(format!("{} has no pod spec", function.display_name())))
}

/// The container named after the function, else the first one
fn function_container_index(pod: &PodSpec, function_name: &str) -> Option<usize> {
    if pod.containers.is_empty() {
        return None;
    }
    Some(pod.containers.iter().position(|c| c.name == function_name).unwrap_or(0))
}

fn function_container<'a>(pod: &'a PodSpec, function_name: &str) -> Option<&'a Container> {
    function_container_index(pod, function_name).map(|i| &pod.containers[i])
}

fn set_env(container: &mut Container, name: &str, value: &str) {
    let env = container.env.get_or_insert_with(Vec::new);
    match env.iter_mut().find(|e| e.name == name) {
        Some(existing) => {
            existing.value = Some(value.to_string());
            existing.value_from = None;
        }
        None => env.push(EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            value_from: None,
        }),
    }
}
