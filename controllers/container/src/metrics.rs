//! Prometheus metrics of the container executor

use fscache::CacheMetrics;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

const FUNCTION_LABELS: &[&str] = &["function_name", "function_namespace"];

/// Counters for the creation path plus the cache's own metrics, all
/// registered on a private registry served at `/metrics`
#[derive(Clone, Debug)]
pub struct ExecutorMetrics {
    registry: Registry,
    /// Functions whose backend was created from scratch
    pub cold_starts: IntCounterVec,
    /// Creations that failed
    pub cold_start_errors: IntCounterVec,
    /// Creations that found the function already cached
    pub cold_start_races: IntCounterVec,
    pub cache: CacheMetrics,
}

impl ExecutorMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let cold_starts = IntCounterVec::new(
            Opts::new("funcd_cold_starts_total", "Number of function cold starts"),
            FUNCTION_LABELS,
        )?;
        let cold_start_errors = IntCounterVec::new(
            Opts::new("funcd_cold_start_errors_total", "Number of failed function cold starts"),
            FUNCTION_LABELS,
        )?;
        let cold_start_races = IntCounterVec::new(
            Opts::new(
                "funcd_cold_start_races_total",
                "Number of cold starts that found the function already cached",
            ),
            FUNCTION_LABELS,
        )?;
        let cache = CacheMetrics::new()?;

        registry.register(Box::new(cold_starts.clone()))?;
        registry.register(Box::new(cold_start_errors.clone()))?;
        registry.register(Box::new(cold_start_races.clone()))?;
        cache.register(&registry)?;

        Ok(Self {
            registry,
            cold_starts,
            cold_start_errors,
            cold_start_races,
            cache,
        })
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_counters() {
        let metrics = ExecutorMetrics::new().unwrap();
        metrics.cold_starts.with_label_values(&["f1", "default"]).inc();
        metrics.cold_start_races.with_label_values(&["f1", "default"]).inc();

        let text = metrics.render().unwrap();
        assert!(text.contains("funcd_cold_starts_total{function_name=\"f1\",function_namespace=\"default\"} 1"));
        assert!(text.contains("funcd_cold_start_races_total"));
    }
}
