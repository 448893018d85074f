//! Helper functions shared by the mock resource modules

use super::MockClusterClient;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mock store, ignoring poisoning from a panicked test thread
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Store key for a namespaced object
pub(crate) fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

/// Equality-only label selector matching (`k1=v1,k2=v2`)
pub(crate) fn matches_selector(labels: Option<&BTreeMap<String, String>>, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.and_then(|l| l.get(k)).is_some_and(|actual| actual == v),
            None => labels.is_some_and(|l| l.contains_key(term)),
        })
}

/// Namespace filter for list calls (`None` = all namespaces)
pub(crate) fn in_namespace(object_ns: &str, namespace: Option<&str>) -> bool {
    namespace.is_none_or(|ns| ns == object_ns)
}

/// Fill in server-populated metadata on create
pub(crate) fn stamp_created(client: &MockClusterClient, meta: &mut ObjectMeta, namespace: &str) {
    meta.namespace = Some(namespace.to_string());
    meta.uid = Some(uuid::Uuid::new_v4().to_string());
    meta.resource_version = Some(client.next_resource_version());
}

/// Bump the resource version on update
pub(crate) fn stamp_updated(client: &MockClusterClient, meta: &mut ObjectMeta) {
    meta.resource_version = Some(client.next_resource_version());
}

/// RFC 7386 JSON merge patch
pub(crate) fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(target_map) = target {
        for (k, v) in patch_map {
            if v.is_null() {
                target_map.remove(k);
            } else {
                merge_patch(target_map.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
    }
}

/// Simplified strategic merge patch: lists of objects carrying a `name`
/// field are merged element-wise by name, everything else follows merge
/// patch rules.
pub(crate) fn strategic_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (k, v) in patch_map {
                if v.is_null() {
                    target_map.remove(k);
                } else {
                    strategic_merge(target_map.entry(k.clone()).or_insert(Value::Null), v);
                }
            }
        }
        (Value::Array(target_items), Value::Array(patch_items)) if is_named_list(patch_items) => {
            for patch_item in patch_items {
                let name = patch_item.get("name").cloned();
                match target_items.iter_mut().find(|t| t.get("name") == name.as_ref()) {
                    Some(existing) => strategic_merge(existing, patch_item),
                    None => target_items.push(patch_item.clone()),
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

fn is_named_list(items: &[Value]) -> bool {
    !items.is_empty() && items.iter().all(|item| item.get("name").is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_matches_selector() {
        let mut labels = BTreeMap::new();
        labels.insert("a".to_string(), "1".to_string());
        labels.insert("b".to_string(), "2".to_string());
        assert!(matches_selector(Some(&labels), ""));
        assert!(matches_selector(Some(&labels), "a=1"));
        assert!(matches_selector(Some(&labels), "a=1,b=2"));
        assert!(!matches_selector(Some(&labels), "a=2"));
        assert!(!matches_selector(None, "a=1"));
    }

    #[test]
    fn test_merge_patch_replaces_scalars_and_removes_nulls() {
        let mut target = json!({"spec": {"minReplicas": 1, "maxReplicas": 5, "metrics": [1]}});
        merge_patch(&mut target, &json!({"spec": {"maxReplicas": 10, "metrics": null}}));
        assert_eq!(target, json!({"spec": {"minReplicas": 1, "maxReplicas": 10}}));
    }

    #[test]
    fn test_strategic_merge_merges_named_lists() {
        let mut target = json!({"containers": [{"name": "f", "image": "img", "env": [{"name": "A", "value": "1"}]}]});
        strategic_merge(
            &mut target,
            &json!({"containers": [{"name": "f", "env": [{"name": "B", "value": "2"}]}]}),
        );
        assert_eq!(
            target,
            json!({"containers": [{"name": "f", "image": "img", "env": [{"name": "A", "value": "1"}, {"name": "B", "value": "2"}]}]})
        );
    }
}
