//! Warm pool cache
//!
//! Tracks, per function, the addresses of specialized backend instances and
//! how many requests each is serving. Executors that specialize generic warm
//! pods (rather than running one deployment per function) use it to hand out
//! an existing instance before specializing a new one.
//!
//! State is kept per [`PoolKey`] in a `DashMap`, so operations on different
//! functions never contend.

use crate::error::CacheError;
use crate::func_svc::FuncSvc;
use crate::key::PoolKey;
use dashmap::DashMap;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// State of one address in a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEntryState {
    /// Can take more requests
    Available,
    /// Serving `requests_per_pod` requests
    Assigned,
    /// Specialization failed; kept until cleanup
    SpecializationFailed,
    /// Function was deleted; kept until cleanup
    MarkedDeleted,
}

/// One address inside a function's pool
#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub svc: FuncSvc,
    pub active_requests: u32,
    pub cpu_limit: Option<Quantity>,
    pub cpu_usage: Option<Quantity>,
    pub state: PoolEntryState,
    /// Sequence number of the last transition to `Available`
    available_since: u64,
}

#[derive(Debug, Default)]
struct PoolGroup {
    entries: HashMap<String, PoolEntry>,
    /// Specializations handed out but not yet reported back
    waiting: u32,
    svcs_retain: usize,
    deleted: bool,
}

impl PoolGroup {
    /// Evict least recently available idle entries beyond `svcs_retain`
    fn enforce_retain(&mut self) -> Vec<FuncSvc> {
        if self.svcs_retain == 0 {
            return Vec::new();
        }
        let mut available: Vec<(u64, String)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.state == PoolEntryState::Available && e.active_requests == 0)
            .map(|(addr, e)| (e.available_since, addr.clone()))
            .collect();
        if available.len() <= self.svcs_retain {
            return Vec::new();
        }
        available.sort();
        let excess = available.len() - self.svcs_retain;
        available
            .into_iter()
            .take(excess)
            .filter_map(|(_, addr)| self.entries.remove(&addr))
            .map(|e| e.svc)
            .collect()
    }
}

/// Per-function pool of specialized addresses
#[derive(Default)]
pub struct PoolCache {
    groups: DashMap<PoolKey, PoolGroup>,
    sequence: AtomicU64,
}

impl PoolCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Pick an instance with spare capacity for one more request.
    ///
    /// The least loaded available instance is chosen and its request count
    /// incremented; it becomes `Assigned` once it serves `requests_per_pod`
    /// requests. With no spare capacity the call returns `NotFound` (and
    /// counts one pending specialization) while the pool is below
    /// `concurrency` instances, otherwise `Busy`.
    pub fn get_svc_value(&self, key: &PoolKey, requests_per_pod: u32, concurrency: u32) -> Result<FuncSvc, CacheError> {
        let requests_per_pod = requests_per_pod.max(1);
        let Some(mut group) = self.groups.get_mut(key) else {
            // Only a pending specialization earns an empty group a slot
            if concurrency == 0 {
                return Err(CacheError::Busy(key.to_string()));
            }
            self.groups.entry(key.clone()).or_default().waiting += 1;
            return Err(CacheError::NotFound(key.to_string()));
        };
        if group.deleted {
            return Err(CacheError::NotFound(key.to_string()));
        }

        let candidate = group
            .entries
            .iter()
            .filter(|(_, e)| e.state == PoolEntryState::Available && e.active_requests < requests_per_pod && !over_cpu_limit(e))
            .min_by_key(|(_, e)| (e.active_requests, e.available_since))
            .map(|(addr, _)| addr.clone());

        if let Some(addr) = candidate {
            if let Some(entry) = group.entries.get_mut(&addr) {
                entry.active_requests += 1;
                if entry.active_requests >= requests_per_pod {
                    entry.state = PoolEntryState::Assigned;
                }
                entry.svc.touch();
                return Ok(entry.svc.clone());
            }
        }

        let instances = group.entries.len() as u64 + u64::from(group.waiting);
        if instances < u64::from(concurrency) {
            group.waiting += 1;
            Err(CacheError::NotFound(key.to_string()))
        } else {
            Err(CacheError::Busy(key.to_string()))
        }
    }

    /// Record a specialized instance at `address` serving one request.
    ///
    /// Returns the entries evicted to keep at most `svcs_retain` idle
    /// available instances (`0` keeps everything).
    pub fn set_svc_value(
        &self,
        key: &PoolKey,
        address: &str,
        svc: FuncSvc,
        cpu_limit: Option<Quantity>,
        requests_per_pod: u32,
        svcs_retain: usize,
    ) -> Vec<FuncSvc> {
        let requests_per_pod = requests_per_pod.max(1);
        let sequence = self.next_sequence();
        let mut group = self.groups.entry(key.clone()).or_default();
        group.waiting = group.waiting.saturating_sub(1);
        group.svcs_retain = svcs_retain;
        group.deleted = false;

        let entry = group.entries.entry(address.to_string()).or_insert_with(|| PoolEntry {
            svc: svc.clone(),
            active_requests: 0,
            cpu_limit: cpu_limit.clone(),
            cpu_usage: None,
            state: PoolEntryState::Available,
            available_since: sequence,
        });
        entry.svc = svc;
        entry.cpu_limit = cpu_limit;
        entry.active_requests += 1;
        entry.state = if entry.active_requests >= requests_per_pod {
            PoolEntryState::Assigned
        } else {
            PoolEntryState::Available
        };

        let evicted = group.enforce_retain();
        for e in &evicted {
            debug!("Evicted {} from pool {}", e.address, key);
        }
        evicted
    }

    /// One request on `address` finished; the instance is available again.
    ///
    /// Returns entries evicted by the retention limit.
    pub fn mark_available(&self, key: &PoolKey, address: &str) -> Vec<FuncSvc> {
        let sequence = self.next_sequence();
        let Some(mut group) = self.groups.get_mut(key) else {
            return Vec::new();
        };
        let Some(entry) = group.entries.get_mut(address) else {
            return Vec::new();
        };
        entry.active_requests = entry.active_requests.saturating_sub(1);
        if matches!(entry.state, PoolEntryState::Available | PoolEntryState::Assigned) {
            entry.state = PoolEntryState::Available;
            entry.available_since = sequence;
        }
        entry.svc.touch();
        group.enforce_retain()
    }

    /// A specialization handed out by `get_svc_value` failed.
    ///
    /// Releases the pending slot and, when the failed instance had already
    /// registered at `address`, marks it unusable.
    pub fn mark_specialization_failure(&self, key: &PoolKey, address: Option<&str>) {
        {
            let Some(mut group) = self.groups.get_mut(key) else {
                return;
            };
            group.waiting = group.waiting.saturating_sub(1);
            if let Some(address) = address {
                if let Some(entry) = group.entries.get_mut(address) {
                    entry.state = PoolEntryState::SpecializationFailed;
                }
            }
        }
        self.groups.remove_if(key, |_, g| g.entries.is_empty() && g.waiting == 0);
    }

    /// Record the observed CPU usage of an instance
    pub fn set_cpu_utilization(&self, key: &PoolKey, address: &str, cpu_usage: Quantity) {
        if let Some(mut group) = self.groups.get_mut(key) {
            if let Some(entry) = group.entries.get_mut(address) {
                entry.cpu_usage = Some(cpu_usage);
            }
        }
    }

    /// Function was deleted: no instance of it may be handed out again
    pub fn mark_func_deleted(&self, key: &PoolKey) {
        if let Some(mut group) = self.groups.get_mut(key) {
            group.deleted = true;
            for entry in group.entries.values_mut() {
                entry.state = PoolEntryState::MarkedDeleted;
            }
        }
    }

    /// Remove one instance; the group goes away with its last instance
    pub fn delete_value(&self, key: &PoolKey, address: &str) -> Result<FuncSvc, CacheError> {
        let removed = {
            let mut group = self
                .groups
                .get_mut(key)
                .ok_or_else(|| CacheError::NotFound(key.to_string()))?;
            group
                .entries
                .remove(address)
                .ok_or_else(|| CacheError::NotFound(format!("{} {}", key, address)))?
        };
        self.groups.remove_if(key, |_, g| g.entries.is_empty() && g.waiting == 0);
        Ok(removed.svc)
    }

    /// Snapshot of every idle available instance across all functions
    pub fn list_available_value(&self) -> Vec<FuncSvc> {
        self.groups
            .iter()
            .flat_map(|group| {
                group
                    .entries
                    .values()
                    .filter(|e| e.state == PoolEntryState::Available && e.active_requests == 0)
                    .map(|e| e.svc.clone())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Snapshot of one function's entries
    pub fn entries(&self, key: &PoolKey) -> Vec<PoolEntry> {
        self.groups
            .get(key)
            .map(|g| g.entries.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Write one line per instance: key, address, state, active requests,
    /// CPU usage and limit
    pub fn log_fn_svc_group<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let mut groups: Vec<(PoolKey, Vec<String>)> = self
            .groups
            .iter()
            .map(|g| {
                let mut lines: Vec<String> = g
                    .entries
                    .iter()
                    .map(|(addr, e)| {
                        format!(
                            "{}\t{:?}\t{}\t{}\t{}",
                            addr,
                            e.state,
                            e.active_requests,
                            e.cpu_usage.as_ref().map(|q| q.0.as_str()).unwrap_or("-"),
                            e.cpu_limit.as_ref().map(|q| q.0.as_str()).unwrap_or("-"),
                        )
                    })
                    .collect();
                lines.sort();
                (g.key().clone(), lines)
            })
            .collect();
        groups.sort_by(|a, b| a.0.cmp(&b.0));

        for (key, lines) in groups {
            writeln!(writer, "{}", key)?;
            for line in lines {
                writeln!(writer, "\t{}", line)?;
            }
        }
        Ok(())
    }
}

fn over_cpu_limit(entry: &PoolEntry) -> bool {
    match (
        entry.cpu_usage.as_ref().and_then(parse_millicores),
        entry.cpu_limit.as_ref().and_then(parse_millicores),
    ) {
        (Some(usage), Some(limit)) => usage > limit,
        _ => false,
    }
}

/// Parse a CPU quantity (`"250m"`, `"1"`, `"0.5"`) into millicores
pub fn parse_millicores(quantity: &Quantity) -> Option<i64> {
    let raw = quantity.0.trim();
    if let Some(milli) = raw.strip_suffix('m') {
        return milli.parse::<i64>().ok();
    }
    raw.parse::<f64>().ok().map(|cores| (cores * 1000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::FunctionMeta;
    use chrono::Utc;
    use crds::ExecutorType;

    fn key() -> PoolKey {
        PoolKey {
            uid: "u1".to_string(),
            resource_version: "1".to_string(),
            generation: 1,
        }
    }

    fn svc(address: &str) -> FuncSvc {
        FuncSvc {
            name: "pool-f1".to_string(),
            function: FunctionMeta {
                name: "f1".to_string(),
                namespace: "default".to_string(),
                uid: "u1".to_string(),
                resource_version: "1".to_string(),
                generation: 1,
            },
            environment: None,
            address: address.to_string(),
            kubernetes_objects: Vec::new(),
            executor: ExecutorType::Poolmgr,
            cpu_limit: None,
            ctime: Utc::now(),
            atime: Utc::now(),
        }
    }

    #[test]
    fn test_get_from_empty_pool_counts_pending_specialization() {
        let pool = PoolCache::new();
        assert!(pool.get_svc_value(&key(), 1, 2).unwrap_err().is_not_found());
        assert!(pool.get_svc_value(&key(), 1, 2).unwrap_err().is_not_found());
        assert!(matches!(pool.get_svc_value(&key(), 1, 2), Err(CacheError::Busy(_))));
    }

    #[test]
    fn test_misses_on_unknown_functions_leave_no_groups() {
        let pool = PoolCache::new();
        for uid in 0..50 {
            let other = PoolKey {
                uid: format!("u{}", uid),
                ..key()
            };
            assert!(matches!(pool.get_svc_value(&other, 1, 0), Err(CacheError::Busy(_))));
        }
        assert_eq!(pool.groups.len(), 0);

        // A pending specialization holds its group until it reports back
        assert!(pool.get_svc_value(&key(), 1, 1).unwrap_err().is_not_found());
        assert_eq!(pool.groups.len(), 1);
        pool.mark_specialization_failure(&key(), None);
        assert_eq!(pool.groups.len(), 0);
        assert!(pool.get_svc_value(&key(), 1, 1).unwrap_err().is_not_found());
    }

    #[test]
    fn test_requests_per_pod_sharing() {
        let pool = PoolCache::new();
        pool.set_svc_value(&key(), "10.0.0.1", svc("10.0.0.1"), None, 2, 0);

        // Specializing request holds one slot, one more fits
        let got = pool.get_svc_value(&key(), 2, 10).unwrap();
        assert_eq!(got.address, "10.0.0.1");
        let entries = pool.entries(&key());
        assert_eq!(entries[0].state, PoolEntryState::Assigned);
        assert_eq!(entries[0].active_requests, 2);

        assert!(pool.get_svc_value(&key(), 2, 10).unwrap_err().is_not_found());

        pool.mark_available(&key(), "10.0.0.1");
        assert_eq!(pool.get_svc_value(&key(), 2, 10).unwrap().address, "10.0.0.1");
    }

    #[test]
    fn test_retention_evicts_least_recently_available() {
        let pool = PoolCache::new();
        for addr in ["a", "b", "c"] {
            pool.set_svc_value(&key(), addr, svc(addr), None, 1, 2);
        }
        assert!(pool.mark_available(&key(), "a").is_empty());
        assert!(pool.mark_available(&key(), "b").is_empty());
        let evicted = pool.mark_available(&key(), "c");
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].address, "a");

        let evicted = pool.set_svc_value(&key(), "d", svc("d"), None, 2, 2);
        // "d" is available with one active request, so it is not idle
        assert!(evicted.is_empty());
        let available = pool
            .entries(&key())
            .into_iter()
            .filter(|e| e.state == PoolEntryState::Available && e.active_requests == 0)
            .count();
        assert!(available <= 2);
    }

    #[test]
    fn test_set_svc_value_enforces_retain() {
        let pool = PoolCache::new();
        for addr in ["a", "b", "c"] {
            pool.set_svc_value(&key(), addr, svc(addr), None, 1, 0);
            pool.mark_available(&key(), addr);
        }
        assert_eq!(pool.list_available_value().len(), 3);

        // A new busy instance with a retain of 1 evicts the two oldest idle entries
        let evicted = pool.set_svc_value(&key(), "d", svc("d"), None, 1, 1);
        let mut evicted: Vec<String> = evicted.into_iter().map(|s| s.address).collect();
        evicted.sort();
        assert_eq!(evicted, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_specialization_failure_and_deletion() {
        let pool = PoolCache::new();
        pool.get_svc_value(&key(), 1, 1).unwrap_err();
        pool.mark_specialization_failure(&key(), None);
        // Pending slot released
        assert!(pool.get_svc_value(&key(), 1, 1).unwrap_err().is_not_found());

        pool.set_svc_value(&key(), "a", svc("a"), None, 1, 0);
        pool.mark_available(&key(), "a");
        pool.mark_specialization_failure(&key(), Some("a"));
        assert_eq!(pool.entries(&key())[0].state, PoolEntryState::SpecializationFailed);
        assert!(pool.list_available_value().is_empty());

        pool.mark_func_deleted(&key());
        assert!(pool.get_svc_value(&key(), 1, 10).unwrap_err().is_not_found());

        pool.delete_value(&key(), "a").unwrap();
        assert!(pool.delete_value(&key(), "a").unwrap_err().is_not_found());
    }

    #[test]
    fn test_cpu_limit_blocks_selection() {
        let pool = PoolCache::new();
        pool.set_svc_value(&key(), "a", svc("a"), Some(Quantity("500m".to_string())), 1, 0);
        pool.mark_available(&key(), "a");
        pool.set_cpu_utilization(&key(), "a", Quantity("0.75".to_string()));
        assert!(pool.get_svc_value(&key(), 1, 10).unwrap_err().is_not_found());
    }

    #[test]
    fn test_parse_millicores() {
        assert_eq!(parse_millicores(&Quantity("250m".to_string())), Some(250));
        assert_eq!(parse_millicores(&Quantity("2".to_string())), Some(2000));
        assert_eq!(parse_millicores(&Quantity("0.5".to_string())), Some(500));
        assert_eq!(parse_millicores(&Quantity("abc".to_string())), None);
    }

    #[test]
    fn test_log_fn_svc_group() {
        let pool = PoolCache::new();
        pool.set_svc_value(&key(), "a", svc("a"), None, 1, 0);
        let mut out = Vec::new();
        pool.log_fn_svc_group(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("u1@1#1\n"));
        assert!(text.contains("a\tAssigned\t1"));
    }
}
