//! Executor configuration, read once from the environment at startup.

use crate::error::ControllerError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration of the container executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Identifies objects created by this process; orphans from other
    /// instances are cleaned up at startup
    pub instance_id: String,
    /// Namespaces to watch for functions; empty means all namespaces
    pub watch_namespaces: Vec<String>,
    /// Idle time after which a function is scaled to its minimum, unless the
    /// function overrides it
    pub default_idle_timeout: Duration,
    /// How often the idle reaper runs
    pub reaper_interval: Duration,
    /// Entries idle for less than this are not considered by the reaper
    pub idle_prefilter: Duration,
    /// How long a completed creation is remembered by the throttler
    pub throttler_expiry: Duration,
    /// Re-run creation for existing functions at startup instead of cleaning
    /// up objects left by previous instances
    pub adopt_existing_resources: bool,
    /// Listen address of the HTTP API
    pub http_addr: SocketAddr,
    /// Directory debug dumps are written to
    pub dump_dir: PathBuf,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            instance_id: uuid::Uuid::new_v4().to_string(),
            watch_namespaces: Vec::new(),
            default_idle_timeout: Duration::from_secs(60),
            reaper_interval: Duration::from_secs(5),
            idle_prefilter: Duration::from_secs(5),
            throttler_expiry: Duration::from_secs(60),
            adopt_existing_resources: false,
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8888)),
            dump_dir: std::env::temp_dir(),
        }
    }
}

impl ExecutorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`; unset or empty variables keep
    /// their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(id) = get("EXECUTOR_INSTANCE_ID") {
            config.instance_id = id;
        }
        if let Some(namespaces) = get("WATCH_NAMESPACES") {
            config.watch_namespaces = namespaces
                .split(',')
                .map(str::trim)
                .filter(|ns| !ns.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = get("DEFAULT_IDLE_TIMEOUT_SECONDS") {
            config.default_idle_timeout = Duration::from_secs(parse("DEFAULT_IDLE_TIMEOUT_SECONDS", &v)?);
        }
        if let Some(v) = get("OBJECT_REAPER_INTERVAL_SECONDS") {
            let secs: u64 = parse("OBJECT_REAPER_INTERVAL_SECONDS", &v)?;
            if secs == 0 {
                return Err(ControllerError::InvalidConfig(
                    "OBJECT_REAPER_INTERVAL_SECONDS must be greater than zero".to_string(),
                ));
            }
            config.reaper_interval = Duration::from_secs(secs);
        }
        if let Some(v) = get("IDLE_PREFILTER_SECONDS") {
            config.idle_prefilter = Duration::from_secs(parse("IDLE_PREFILTER_SECONDS", &v)?);
        }
        if let Some(v) = get("THROTTLER_EXPIRY_SECONDS") {
            config.throttler_expiry = Duration::from_secs(parse("THROTTLER_EXPIRY_SECONDS", &v)?);
        }
        if let Some(v) = get("ADOPT_EXISTING_RESOURCES") {
            config.adopt_existing_resources = parse("ADOPT_EXISTING_RESOURCES", &v.to_lowercase())?;
        }
        if let Some(v) = get("HTTP_ADDR") {
            config.http_addr = parse("HTTP_ADDR", &v)?;
        }
        if let Some(v) = get("DUMP_DIR") {
            config.dump_dir = PathBuf::from(v);
        }

        Ok(config)
    }

    /// Namespaces to watch, `None` standing for all namespaces
    pub fn namespaces(&self) -> Vec<Option<&str>> {
        if self.watch_namespaces.is_empty() {
            vec![None]
        } else {
            self.watch_namespaces.iter().map(|ns| Some(ns.as_str())).collect()
        }
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ControllerError::InvalidConfig(format!("{}={:?}: {}", key, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.default_idle_timeout, Duration::from_secs(60));
        assert_eq!(config.reaper_interval, Duration::from_secs(5));
        assert_eq!(config.idle_prefilter, Duration::from_secs(5));
        assert!(!config.adopt_existing_resources);
        assert!(!config.instance_id.is_empty());
        assert_eq!(config.namespaces(), vec![None]);
        assert_eq!(config.http_addr.port(), 8888);
    }

    #[test]
    fn test_overrides() {
        let config = ExecutorConfig::from_lookup(lookup(&[
            ("EXECUTOR_INSTANCE_ID", "exec-1"),
            ("WATCH_NAMESPACES", "default, fn ,,"),
            ("DEFAULT_IDLE_TIMEOUT_SECONDS", "300"),
            ("ADOPT_EXISTING_RESOURCES", "True"),
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("DUMP_DIR", "/var/tmp"),
        ]))
        .unwrap();

        assert_eq!(config.instance_id, "exec-1");
        assert_eq!(config.watch_namespaces, vec!["default".to_string(), "fn".to_string()]);
        assert_eq!(config.namespaces(), vec![Some("default"), Some("fn")]);
        assert_eq!(config.default_idle_timeout, Duration::from_secs(300));
        assert!(config.adopt_existing_resources);
        assert_eq!(config.http_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.dump_dir, PathBuf::from("/var/tmp"));
    }

    #[test]
    fn test_invalid_values() {
        let err = ExecutorConfig::from_lookup(lookup(&[("DEFAULT_IDLE_TIMEOUT_SECONDS", "soon")])).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(msg) if msg.contains("DEFAULT_IDLE_TIMEOUT_SECONDS")));

        let err = ExecutorConfig::from_lookup(lookup(&[("ADOPT_EXISTING_RESOURCES", "maybe")])).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));

        let err = ExecutorConfig::from_lookup(lookup(&[("OBJECT_REAPER_INTERVAL_SECONDS", "0")])).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }
}
