//! Cache metrics

use prometheus::{HistogramOpts, HistogramVec, Registry};

/// Metrics recorded by [`crate::FunctionServiceCache`]
#[derive(Clone, Debug)]
pub struct CacheMetrics {
    /// Seconds between creation and last access of a removed entry
    pub function_running_seconds: HistogramVec,
}

impl CacheMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let function_running_seconds = HistogramVec::new(
            HistogramOpts::new(
                "funcd_function_running_seconds",
                "Lifetime of a function service cache entry, observed when it is removed",
            )
            .buckets(vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0, 86400.0]),
            &["function_name", "function_namespace"],
        )?;
        Ok(Self { function_running_seconds })
    }

    /// Register every metric with `registry`
    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.function_running_seconds.clone()))
    }
}
