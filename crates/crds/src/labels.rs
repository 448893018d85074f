//! Label and annotation keys shared by executors.
//!
//! Every object an executor creates carries the four function labels so it
//! can be listed by function (adoption, pod refresh) and by executor type
//! (orphan cleanup).

/// Executor type owning the object
pub const EXECUTOR_TYPE: &str = "funcd.io/executor-type";

/// Name of the function the object backs
pub const FUNCTION_NAME: &str = "funcd.io/function-name";

/// Namespace of the function the object backs
pub const FUNCTION_NAMESPACE: &str = "funcd.io/function-namespace";

/// UID of the function the object backs
pub const FUNCTION_UID: &str = "funcd.io/function-uid";

/// Annotation recording which executor instance created the object
pub const EXECUTOR_INSTANCE_ID: &str = "funcd.io/executor-instance-id";

/// Annotation recording the function resource version the object was built from
pub const FUNCTION_RESOURCE_VERSION: &str = "funcd.io/function-resource-version";

/// Environment variable set on the function container to the sum of the
/// referenced Secret and ConfigMap resource versions
pub const RESOURCE_VERSION_COUNT: &str = "RESOURCE_VERSION_COUNT";
