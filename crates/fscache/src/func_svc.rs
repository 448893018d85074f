//! Live binding of a function to its backend

use crate::key::FunctionMeta;
use chrono::{DateTime, Utc};
use crds::{EnvironmentReference, ExecutorType};
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::Serialize;
use std::time::Duration;

/// A function bound to a reachable backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuncSvc {
    /// Name of the backing objects
    pub name: String,
    /// Function this backend serves
    pub function: FunctionMeta,
    /// Environment the function runs in
    pub environment: Option<EnvironmentReference>,
    /// `host.namespace` (optionally with port) the backend is reachable at
    pub address: String,
    /// Objects owned for this function (Deployment, Service, optionally HPA)
    pub kubernetes_objects: Vec<ObjectReference>,
    /// Executor that owns this entry
    pub executor: ExecutorType,
    /// CPU limit of one backend instance (pool accounting)
    pub cpu_limit: Option<Quantity>,
    pub ctime: DateTime<Utc>,
    pub atime: DateTime<Utc>,
}

impl FuncSvc {
    /// Refresh the last access time; never moves it backwards
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.atime {
            self.atime = now;
        }
    }

    /// Reset creation and access times to now
    pub fn stamp_created(&mut self) {
        let now = Utc::now();
        self.ctime = now;
        self.atime = now;
    }

    /// Time since last access
    pub fn idle_for(&self) -> Duration {
        (Utc::now() - self.atime).to_std().unwrap_or_default()
    }

    /// Time between creation and last access
    pub fn lifetime(&self) -> Duration {
        (self.atime - self.ctime).to_std().unwrap_or_default()
    }

    /// Reference to the owned object of `kind`, if any
    pub fn object(&self, kind: &str) -> Option<&ObjectReference> {
        self.kubernetes_objects.iter().find(|o| o.kind.as_deref() == Some(kind))
    }
}
