//! Schema overrides for upstream Kubernetes types.
//!
//! `k8s-openapi` types do not implement `JsonSchema`, so fields embedding
//! them are published as free-form objects and validated by the API server
//! when the executor builds workloads from them.

use schemars::{Schema, SchemaGenerator, json_schema};

pub(crate) fn preserve_unknown_object(_: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "object",
        "nullable": true,
        "x-kubernetes-preserve-unknown-fields": true
    })
}

pub(crate) fn preserve_unknown_array(_: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "array",
        "items": {
            "type": "object",
            "x-kubernetes-preserve-unknown-fields": true
        }
    })
}
