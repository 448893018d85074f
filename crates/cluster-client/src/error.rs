//! Cluster client errors

use thiserror::Error;

/// Errors returned by [`crate::ClusterClientTrait`] implementations.
///
/// `NotFound` and `AlreadyExists` are split out of the generic API error so
/// callers can drive create-or-get and idempotent delete paths without
/// inspecting status codes.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Object already exists (create race)
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Any other Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(kube::Error),

    /// API error that did not come from the Kubernetes client
    #[error("API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Object returned by the API is missing required fields
    #[error("Invalid object: {0}")]
    InvalidObject(String),
}

impl ClusterError {
    /// True for [`ClusterError::NotFound`]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }

    /// True for [`ClusterError::AlreadyExists`]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ClusterError::AlreadyExists(_))
    }
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ref status) if status.code == 404 => {
                ClusterError::NotFound(status.message.clone())
            }
            kube::Error::Api(ref status) if status.code == 409 => {
                ClusterError::AlreadyExists(status.message.clone())
            }
            other => ClusterError::Kube(other),
        }
    }
}
