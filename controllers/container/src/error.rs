//! Controller-specific error types.
//!
//! Cluster and cache errors are wrapped with the operation and object they
//! came from. Failures from independent steps (deleting the three objects of
//! a function, cleaning up orphans) are collected into a [`MultiError`] so
//! every problem is reported, not just the first.

use cluster_client::ClusterError;
use fscache::CacheError;
use kube::Error as KubeError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur in the container executor.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error outside the cluster client seam
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Cluster API error
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Function service cache error
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Creating one of the objects backing a function failed
    #[error("error creating {kind} {name}: {source}")]
    Create {
        kind: &'static str,
        name: String,
        #[source]
        source: ClusterError,
    },

    /// Reading an object a function depends on failed
    #[error("error reading {kind} {name}: {source}")]
    Read {
        kind: &'static str,
        name: String,
        #[source]
        source: ClusterError,
    },

    /// The creation path for a function failed.
    ///
    /// The source is shared with every caller that waited on the same
    /// creation.
    #[error("error creating kubernetes objects for function {function}: {source}")]
    FunctionCreation {
        function: String,
        #[source]
        source: Arc<ControllerError>,
    },

    /// Waiting for a backend timed out
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The function cannot be served by this executor
    #[error("Invalid function: {0}")]
    InvalidFunction(String),

    /// Several independent steps failed
    #[error("{0}")]
    Multiple(MultiError),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Metrics registration or encoding failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Filesystem or socket error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ControllerError {
    /// True when the underlying cause is a missing object or cache entry
    pub fn is_not_found(&self) -> bool {
        match self {
            ControllerError::Cluster(e) => e.is_not_found(),
            ControllerError::Cache(e) => e.is_not_found(),
            ControllerError::Create { source, .. } | ControllerError::Read { source, .. } => source.is_not_found(),
            ControllerError::FunctionCreation { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// True when the function itself is at fault, not the cluster
    pub fn is_invalid_function(&self) -> bool {
        match self {
            ControllerError::InvalidFunction(_) | ControllerError::Cache(CacheError::InvalidKey(_)) => true,
            ControllerError::Multiple(errors) => {
                !errors.is_empty() && errors.errors().iter().all(ControllerError::is_invalid_function)
            }
            _ => false,
        }
    }
}

/// Collector for errors from steps that run independently of each other.
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<ControllerError>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: impl Into<ControllerError>) {
        self.errors.push(error.into());
    }

    /// Record the error of `result`, if any
    pub fn collect<T, E: Into<ControllerError>>(&mut self, result: Result<T, E>) {
        if let Err(e) = result {
            self.push(e);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[ControllerError] {
        &self.errors
    }

    /// `Ok` when nothing was collected, the lone error when there is one,
    /// otherwise [`ControllerError::Multiple`]
    pub fn into_result(mut self) -> Result<(), ControllerError> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(ControllerError::Multiple(self)),
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred:", self.errors.len())?;
        for e in &self.errors {
            write!(f, "\n\t* {}", e)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_error_collapses() {
        let empty = MultiError::new();
        assert!(empty.into_result().is_ok());

        let mut one = MultiError::new();
        one.collect::<(), _>(Err(ClusterError::NotFound("svc".to_string())));
        one.collect::<(), ControllerError>(Ok(()));
        let err = one.into_result().unwrap_err();
        assert!(matches!(err, ControllerError::Cluster(ClusterError::NotFound(_))));

        let mut many = MultiError::new();
        many.push(ControllerError::Timeout("a".to_string()));
        many.push(ControllerError::Timeout("b".to_string()));
        assert_eq!(many.len(), 2);
        let text = many.into_result().unwrap_err().to_string();
        assert!(text.starts_with("2 errors occurred:"));
        assert!(text.contains("Timed out: a"));
        assert!(text.contains("Timed out: b"));
    }

    #[test]
    fn test_not_found_classification() {
        let err = ControllerError::Cache(CacheError::NotFound("u1".to_string()));
        assert!(err.is_not_found());

        let shared = ControllerError::FunctionCreation {
            function: "default/f1".to_string(),
            source: Arc::new(ControllerError::Timeout("deployment".to_string())),
        };
        assert!(!shared.is_not_found());

        let read = ControllerError::Read {
            kind: "Secret",
            name: "default/db".to_string(),
            source: ClusterError::NotFound("secret default/db".to_string()),
        };
        assert!(read.is_not_found());
        assert!(read.to_string().starts_with("error reading Secret default/db"));
    }

    #[test]
    fn test_invalid_function_classification() {
        let mut all_invalid = MultiError::new();
        all_invalid.push(ControllerError::InvalidFunction("a".to_string()));
        all_invalid.push(ControllerError::InvalidFunction("b".to_string()));
        assert!(all_invalid.into_result().unwrap_err().is_invalid_function());

        let mut mixed = MultiError::new();
        mixed.push(ControllerError::InvalidFunction("a".to_string()));
        mixed.push(ControllerError::Timeout("b".to_string()));
        assert!(!mixed.into_result().unwrap_err().is_invalid_function());
    }
}
