//! Cluster API client for executor controllers
//!
//! Wraps the handful of Kubernetes API calls an executor needs to own the
//! workloads backing a function: Deployments, Services and
//! HorizontalPodAutoscalers, plus reads of Functions and of the Secrets and
//! ConfigMaps they reference.
//!
//! Controllers depend on [`ClusterClientTrait`] rather than on
//! [`KubeClusterClient`] so reconciliation logic can be unit tested against
//! [`MockClusterClient`] (feature `test-util`).
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClientTrait, KubeClusterClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubeClusterClient::try_default().await?;
//! let deployments = client
//!     .list_deployments(Some("default"), "funcd.io/executor-type=container")
//!     .await?;
//! println!("{} container deployments", deployments.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubeClusterClient;
pub use cluster_trait::ClusterClientTrait;
pub use error::ClusterError;
#[cfg(feature = "test-util")]
pub use mock::MockClusterClient;

/// Render a label map as an equality-based selector (`k1=v1,k2=v2`).
///
/// Keys are sorted so the selector is stable across calls.
pub fn label_selector(labels: &std::collections::BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
