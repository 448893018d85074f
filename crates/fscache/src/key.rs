//! Function identity and cache keys

use crate::error::CacheError;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use std::fmt;

/// Identity snapshot of a function at one resource version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FunctionMeta {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub resource_version: String,
    pub generation: i64,
}

impl FunctionMeta {
    /// Build from object metadata; name, namespace and uid are required
    pub fn from_object_meta(meta: &ObjectMeta) -> Result<Self, CacheError> {
        let name = required(meta.name.as_deref(), "name")?;
        let namespace = required(meta.namespace.as_deref(), "namespace")?;
        let uid = required(meta.uid.as_deref(), "uid")?;
        Ok(Self {
            name,
            namespace,
            uid,
            resource_version: meta.resource_version.clone().unwrap_or_default(),
            generation: meta.generation.unwrap_or_default(),
        })
    }

    /// Primary index key
    pub fn key(&self) -> FunctionKey {
        FunctionKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            resource_version: self.resource_version.clone(),
        }
    }

    /// Pool cache key
    pub fn pool_key(&self) -> PoolKey {
        PoolKey {
            uid: self.uid.clone(),
            resource_version: self.resource_version.clone(),
            generation: self.generation,
        }
    }
}

fn required(value: Option<&str>, field: &str) -> Result<String, CacheError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(CacheError::InvalidKey(format!("function metadata missing {}", field))),
    }
}

/// Key of the by-function index: namespace, name and resource version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FunctionKey {
    pub namespace: String,
    pub name: String,
    pub resource_version: String,
}

impl fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.namespace, self.name, self.resource_version)
    }
}

/// Key of the pool cache: uid, resource version and generation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PoolKey {
    pub uid: String,
    pub resource_version: String,
    pub generation: i64,
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}#{}", self.uid, self.resource_version, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_object_meta() {
        let meta = ObjectMeta {
            name: Some("f1".to_string()),
            namespace: Some("default".to_string()),
            uid: Some("u1".to_string()),
            resource_version: Some("7".to_string()),
            generation: Some(2),
            ..Default::default()
        };
        let fm = FunctionMeta::from_object_meta(&meta).unwrap();
        assert_eq!(fm.key().to_string(), "default/f1@7");
        assert_eq!(fm.pool_key().to_string(), "u1@7#2");
    }

    #[test]
    fn test_missing_uid_is_invalid() {
        let meta = ObjectMeta {
            name: Some("f1".to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        };
        let err = FunctionMeta::from_object_meta(&meta).unwrap_err();
        assert!(matches!(err, CacheError::InvalidKey(_)));
    }
}
