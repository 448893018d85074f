//! Names, labels and annotations of the objects backing a function

use crds::{
    EXECUTOR_INSTANCE_ID, EXECUTOR_TYPE, ExecutorType, FUNCTION_NAME, FUNCTION_NAMESPACE,
    FUNCTION_RESOURCE_VERSION, FUNCTION_UID,
};
use fscache::FunctionMeta;
use std::collections::BTreeMap;

const NAME_PREFIX: &str = "container";
const UID_SUFFIX_LEN: usize = 17;
const META_PART_LEN: usize = 17;
const MAX_META_LEN: usize = 35;

/// Deterministic object name for a function.
///
/// `container-{name}-{namespace}-{uid suffix}`, lower-cased, with name and
/// namespace shortened when together they would push the name past 63
/// characters.
pub fn object_name(function: &FunctionMeta) -> String {
    let uid = tail(&function.uid, UID_SUFFIX_LEN);
    let meta = if function.name.len() + function.namespace.len() < MAX_META_LEN {
        format!("{}-{}", function.name, function.namespace)
    } else {
        format!(
            "{}-{}",
            head(&function.name, META_PART_LEN),
            head(&function.namespace, META_PART_LEN)
        )
    };
    format!("{}-{}-{}", NAME_PREFIX, meta, uid).to_lowercase()
}

/// Labels stamped on every object, and on the pod template, of a function.
///
/// User labels on the function are carried over; the executor labels win on
/// conflict.
pub fn function_labels(function: &FunctionMeta, user_labels: Option<&BTreeMap<String, String>>) -> BTreeMap<String, String> {
    let mut labels = user_labels.cloned().unwrap_or_default();
    labels.extend(selector_labels(function));
    labels
}

/// The four executor labels identifying a function's objects
pub fn selector_labels(function: &FunctionMeta) -> BTreeMap<String, String> {
    BTreeMap::from([
        (EXECUTOR_TYPE.to_string(), ExecutorType::Container.as_str().to_string()),
        (FUNCTION_NAME.to_string(), function.name.clone()),
        (FUNCTION_NAMESPACE.to_string(), function.namespace.clone()),
        (FUNCTION_UID.to_string(), function.uid.clone()),
    ])
}

/// Annotations recording the creating instance and the function revision
pub fn function_annotations(function: &FunctionMeta, instance_id: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (EXECUTOR_INSTANCE_ID.to_string(), instance_id.to_string()),
        (FUNCTION_RESOURCE_VERSION.to_string(), function.resource_version.clone()),
    ])
}

/// Selector matching every object owned by the container executor
pub fn executor_selector() -> String {
    format!("{}={}", EXECUTOR_TYPE, ExecutorType::Container.as_str())
}

fn head(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn tail(s: &str, n: usize) -> String {
    let skip = s.chars().count().saturating_sub(n);
    s.chars().skip(skip).collect()
}
