//! Change detection between two revisions of a function.
//!
//! The update path is driven entirely by a [`FunctionDiff`]: which executor
//! owns the function before and after, whether the autoscaler settings
//! moved, and whether anything baked into the deployment changed.

use crds::{ExecutorType, Function};

/// How ownership of a function moved between revisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorTransition {
    /// Owned by this executor before and after
    Unchanged,
    /// Moved to this executor from another one
    Into,
    /// Moved from this executor to another one
    OutOf,
    /// Owned by another executor before and after
    NotOurs,
}

/// Which aspects of a function changed between two revisions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDiff {
    pub transition: ExecutorTransition,
    pub min_scale: bool,
    pub max_scale: bool,
    pub target_cpu: bool,
    pub metrics: bool,
    pub behavior: bool,
    pub secrets: bool,
    pub config_maps: bool,
    pub pod_spec: bool,
}

impl FunctionDiff {
    /// Compare `old` and `new` from the point of view of the executor `ours`
    pub fn between(old: &Function, new: &Function, ours: ExecutorType) -> Self {
        let transition = match (old.executor_type() == ours, new.executor_type() == ours) {
            (true, true) => ExecutorTransition::Unchanged,
            (false, true) => ExecutorTransition::Into,
            (true, false) => ExecutorTransition::OutOf,
            (false, false) => ExecutorTransition::NotOurs,
        };
        let (a, b) = (old.execution_strategy(), new.execution_strategy());

        Self {
            transition,
            min_scale: a.min_scale != b.min_scale,
            max_scale: a.max_scale != b.max_scale,
            target_cpu: a.target_cpu_percent != b.target_cpu_percent,
            metrics: a.metrics != b.metrics,
            behavior: a.behavior != b.behavior,
            secrets: old.spec.secrets != new.spec.secrets,
            config_maps: old.spec.config_maps != new.spec.config_maps,
            pod_spec: old.spec.pod_spec != new.spec.pod_spec,
        }
    }

    /// Autoscaler settings changed
    pub fn hpa_changed(&self) -> bool {
        self.min_scale || self.max_scale || self.target_cpu || self.metrics || self.behavior
    }

    /// Something baked into the deployment changed
    pub fn deployment_changed(&self) -> bool {
        self.secrets || self.config_maps || self.pod_spec
    }
}
