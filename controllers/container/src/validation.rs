//! Function validation.
//!
//! Every problem with a function is collected before anything is created,
//! so a broken function reports all of its defects at once.

use crate::error::{ControllerError, MultiError};
use crds::Function;

/// Check that `function` can be backed by a deployment and an HPA
pub fn validate_function(function: &Function) -> Result<(), ControllerError> {
    let mut errors = MultiError::new();
    let display = function.display_name();
    let invalid = |problem: &str| ControllerError::InvalidFunction(format!("{} {}", display, problem));

    let meta = &function.metadata;
    if meta.name.as_deref().is_none_or(str::is_empty) {
        errors.push(invalid("has no name"));
    }
    if meta.namespace.as_deref().is_none_or(str::is_empty) {
        errors.push(invalid("has no namespace"));
    }
    if meta.uid.as_deref().is_none_or(str::is_empty) {
        errors.push(invalid("has no uid"));
    }

    match function.spec.pod_spec.as_ref() {
        None => errors.push(invalid("has no pod spec")),
        Some(pod) if pod.containers.is_empty() => errors.push(invalid("has no containers")),
        Some(_) => {}
    }

    let strategy = function.execution_strategy();
    if strategy.min_scale < 0 {
        errors.push(invalid(&format!("has negative minScale {}", strategy.min_scale)));
    }
    if strategy.max_scale < 0 {
        errors.push(invalid(&format!("has negative maxScale {}", strategy.max_scale)));
    }
    if strategy.max_scale > 0 && strategy.max_scale < strategy.min_scale {
        errors.push(invalid(&format!(
            "has maxScale {} below minScale {}",
            strategy.max_scale, strategy.min_scale
        )));
    }

    errors.into_result()
}
