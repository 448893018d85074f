//! Funcd CRD Definitions
//!
//! Kubernetes Custom Resource Definitions consumed by the executor
//! controllers, plus the label and annotation keys stamped on every
//! object an executor owns.

pub mod function;
pub mod labels;
pub mod references;
mod schema;

pub use function::*;
pub use labels::*;
pub use references::*;
