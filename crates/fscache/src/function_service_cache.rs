//! Function service cache
//!
//! Indexes live [`FuncSvc`] entries three ways: by [`FunctionKey`] (the
//! authoritative index), by address and by function UID. The two secondary
//! indices map to the function's [`FunctionMeta`] and are filled best effort;
//! a collision there is logged and ignored.
//!
//! Touch, list and log requests are serialized through a single worker task
//! that owns no state of its own but executes requests strictly in arrival
//! order. Point lookups, inserts and deletes go straight to the indices.

use crate::cache::Cache;
use crate::error::CacheError;
use crate::func_svc::FuncSvc;
use crate::key::{FunctionKey, FunctionMeta, PoolKey};
use crate::metrics::CacheMetrics;
use crate::pool_cache::PoolCache;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::fmt::Display;
use std::hash::Hash;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

const REQUEST_QUEUE_DEPTH: usize = 128;

struct Indices {
    by_function: Cache<FunctionKey, FuncSvc>,
    by_address: Cache<String, FunctionMeta>,
    by_uid: Cache<String, FunctionMeta>,
}

enum Request {
    Touch {
        address: String,
        reply: oneshot::Sender<Result<(), CacheError>>,
    },
    ListOld {
        age: Duration,
        reply: oneshot::Sender<Vec<FuncSvc>>,
    },
    ListOldPool {
        age: Duration,
        reply: oneshot::Sender<Vec<FuncSvc>>,
    },
    Log {
        reply: oneshot::Sender<()>,
    },
}

/// Function service cache
pub struct FunctionServiceCache {
    indices: Arc<Indices>,
    pool: Arc<PoolCache>,
    requests: mpsc::Sender<Request>,
    metrics: Option<CacheMetrics>,
}

impl FunctionServiceCache {
    /// Create the cache and spawn its worker.
    ///
    /// Must be called from within a Tokio runtime. The worker exits when the
    /// cache is dropped.
    pub fn new() -> Self {
        let indices = Arc::new(Indices {
            by_function: Cache::new(),
            by_address: Cache::new(),
            by_uid: Cache::new(),
        });
        let pool = Arc::new(PoolCache::new());
        let (requests, receiver) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        tokio::spawn(serve(Arc::clone(&indices), Arc::clone(&pool), receiver));
        Self {
            indices,
            pool,
            requests,
            metrics: None,
        }
    }

    /// Create the cache recording entry lifetimes into `metrics`
    pub fn with_metrics(metrics: CacheMetrics) -> Self {
        Self {
            metrics: Some(metrics),
            ..Self::new()
        }
    }

    /// Insert `fsvc`.
    ///
    /// When the function key is already cached this is a benign creation
    /// race: the existing entry is touched and returned as `Some`, and
    /// `fsvc` is dropped.
    pub fn add(&self, mut fsvc: FuncSvc) -> Result<Option<FuncSvc>, CacheError> {
        if fsvc.address.is_empty() {
            return Err(CacheError::InvalidKey(format!("{} has no address", fsvc.function.key())));
        }
        fsvc.stamp_created();
        let key = fsvc.function.key();

        if let Some(existing) = self.indices.by_function.set(key.clone(), fsvc.clone()) {
            debug!("Function {} already cached at {}", key, existing.address);
            let touched = self.indices.by_function.modify(&key, FuncSvc::touch).unwrap_or(existing);
            return Ok(Some(touched));
        }

        index_secondary(&self.indices.by_address, fsvc.address.clone(), &fsvc.function, "address");
        index_secondary(&self.indices.by_uid, fsvc.function.uid.clone(), &fsvc.function, "function uid");
        debug!("Cached function {} at {}", key, fsvc.address);
        Ok(None)
    }

    /// Copy of the entry for `function`, refreshing its access time
    pub fn get_by_function(&self, function: &FunctionMeta) -> Result<FuncSvc, CacheError> {
        self.indices.by_function.modify(&function.key(), FuncSvc::touch)
    }

    /// Copy of the entry for the function with `uid`, refreshing its access time
    pub fn get_by_function_uid(&self, uid: &str) -> Result<FuncSvc, CacheError> {
        let meta = self.indices.by_uid.get(&uid.to_string())?;
        self.indices.by_function.modify(&meta.key(), FuncSvc::touch)
    }

    /// Refresh the access time of the entry serving `address`
    pub async fn touch_by_address(&self, address: &str) -> Result<(), CacheError> {
        let address = address.to_string();
        self.request(|reply| Request::Touch { address, reply }).await?
    }

    /// Remove `fsvc` from all three indices.
    ///
    /// A missing key in any index is logged, not returned.
    pub fn delete_entry(&self, fsvc: &FuncSvc) {
        let key = fsvc.function.key();
        if let Err(e) = self.indices.by_function.delete(&key) {
            debug!("Deleting {} from function index: {}", key, e);
        }
        if let Err(e) = self.indices.by_address.delete(&fsvc.address) {
            debug!("Deleting {} from address index: {}", key, e);
        }
        if let Err(e) = self.indices.by_uid.delete(&fsvc.function.uid) {
            debug!("Deleting {} from uid index: {}", key, e);
        }

        if let Some(metrics) = &self.metrics {
            metrics
                .function_running_seconds
                .with_label_values(&[fsvc.function.name.as_str(), fsvc.function.namespace.as_str()])
                .observe(fsvc.lifetime().as_secs_f64());
        }
    }

    /// Delete `fsvc` if it has been idle for at least `min_age`
    pub fn delete_old(&self, fsvc: &FuncSvc, min_age: Duration) -> bool {
        if fsvc.idle_for() < min_age {
            return false;
        }
        self.delete_entry(fsvc);
        true
    }

    /// Entries idle for longer than `age`
    pub async fn list_old(&self, age: Duration) -> Result<Vec<FuncSvc>, CacheError> {
        self.request(|reply| Request::ListOld { age, reply }).await
    }

    /// Idle available pool entries idle for longer than `age`
    pub async fn list_old_for_pool(&self, age: Duration) -> Result<Vec<FuncSvc>, CacheError> {
        self.request(|reply| Request::ListOldPool { age, reply }).await
    }

    /// Dump the cache contents to the log
    pub async fn log(&self) -> Result<(), CacheError> {
        info!("--- Function service cache contents");
        self.request(|reply| Request::Log { reply }).await?;
        info!("--- Function service cache contents end");
        Ok(())
    }

    /// Snapshot of every cached entry
    pub fn entries(&self) -> Vec<FuncSvc> {
        self.indices.by_function.copy().into_values().collect()
    }

    /// Number of cached functions
    pub fn len(&self) -> usize {
        self.indices.by_function.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.by_function.is_empty()
    }

    /// Add a specialized pool instance; returns instances evicted by `svcs_retain`
    pub fn add_func(&self, mut fsvc: FuncSvc, requests_per_pod: u32, svcs_retain: usize) -> Vec<FuncSvc> {
        fsvc.stamp_created();
        let key = fsvc.function.pool_key();
        let address = fsvc.address.clone();
        let cpu_limit = fsvc.cpu_limit.clone();
        self.pool
            .set_svc_value(&key, &address, fsvc, cpu_limit, requests_per_pod, svcs_retain)
    }

    /// Pool instance with spare capacity for `function`
    pub fn get_func_svc(&self, function: &FunctionMeta, requests_per_pod: u32, concurrency: u32) -> Result<FuncSvc, CacheError> {
        self.pool
            .get_svc_value(&function.pool_key(), requests_per_pod, concurrency)
            .inspect_err(|e| debug!("No pool instance for {}: {}", function.key(), e))
    }

    pub fn set_cpu_utilization(&self, key: &PoolKey, address: &str, cpu_usage: Quantity) {
        self.pool.set_cpu_utilization(key, address, cpu_usage);
    }

    pub fn mark_available(&self, key: &PoolKey, address: &str) -> Vec<FuncSvc> {
        self.pool.mark_available(key, address)
    }

    pub fn mark_specialization_failure(&self, key: &PoolKey, address: Option<&str>) {
        self.pool.mark_specialization_failure(key, address);
    }

    pub fn mark_func_deleted(&self, key: &PoolKey) {
        self.pool.mark_func_deleted(key);
    }

    /// Remove one pool instance; failures are logged
    pub fn delete_function_svc(&self, fsvc: &FuncSvc) {
        if let Err(e) = self.pool.delete_value(&fsvc.function.pool_key(), &fsvc.address) {
            warn!(
                "Error deleting pool instance {} of function {}: {}",
                fsvc.address, fsvc.function.name, e
            );
        }
    }

    /// Remove a pool instance if it has been idle for at least `min_age`
    pub fn delete_old_pool_cache(&self, fsvc: &FuncSvc, min_age: Duration) -> bool {
        if fsvc.idle_for() < min_age {
            return false;
        }
        self.delete_function_svc(fsvc);
        true
    }

    /// Write the pool groups and the function index to a timestamped file
    /// under `dir`, returning its path
    pub async fn dump_debug_info(&self, dir: &Path) -> std::io::Result<PathBuf> {
        info!("Dumping function service cache");
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("fscache-{}.txt", Utc::now().format("%Y%m%dT%H%M%S%.3fZ")));

        let mut buf = Vec::new();
        writeln!(buf, "# pool cache")?;
        self.pool.log_fn_svc_group(&mut buf)?;
        writeln!(buf, "# function service cache")?;
        let mut entries: Vec<(FunctionKey, FuncSvc)> = self.indices.by_function.copy().into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, fsvc) in entries {
            for object in &fsvc.kubernetes_objects {
                writeln!(
                    buf,
                    "{}\t{}\t{}\t{}\t{}",
                    key,
                    fsvc.address,
                    fsvc.executor,
                    object.kind.as_deref().unwrap_or_default(),
                    object.name.as_deref().unwrap_or_default()
                )?;
            }
        }

        tokio::fs::write(&path, buf).await?;
        info!("Dumped function service cache to {}", path.display());
        Ok(path)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T, CacheError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(build(reply))
            .await
            .map_err(|_| CacheError::WorkerStopped)?;
        response.await.map_err(|_| CacheError::WorkerStopped)
    }
}

impl Default for FunctionServiceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FunctionServiceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionServiceCache")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

/// Best-effort insert into a secondary index. Multiple specializations can
/// race for the same address or UID; the first mapping wins.
fn index_secondary<K>(index: &Cache<K, FunctionMeta>, key: K, meta: &FunctionMeta, index_name: &str)
where
    K: Eq + Hash + Clone + Display,
{
    if let Some(existing) = index.set(key.clone(), meta.clone()) {
        if existing != *meta {
            debug!(
                "{} index already maps {} to {}; keeping it over {}",
                index_name,
                key,
                existing.key(),
                meta.key()
            );
        }
    }
}

async fn serve(indices: Arc<Indices>, pool: Arc<PoolCache>, mut requests: mpsc::Receiver<Request>) {
    while let Some(request) = requests.recv().await {
        match request {
            Request::Touch { address, reply } => {
                let _ = reply.send(touch(&indices, &address));
            }
            Request::ListOld { age, reply } => {
                let _ = reply.send(list_old(&indices, age));
            }
            Request::ListOldPool { age, reply } => {
                let old = pool
                    .list_available_value()
                    .into_iter()
                    .filter(|fsvc| fsvc.idle_for() > age)
                    .collect();
                let _ = reply.send(old);
            }
            Request::Log { reply } => {
                log_contents(&indices);
                let _ = reply.send(());
            }
        }
    }
    debug!("Function service cache worker stopped");
}

fn touch(indices: &Indices, address: &str) -> Result<(), CacheError> {
    let meta = indices.by_address.get(&address.to_string())?;
    indices.by_function.modify(&meta.key(), FuncSvc::touch).map(|_| ())
}

fn list_old(indices: &Indices, age: Duration) -> Vec<FuncSvc> {
    let mut old = Vec::new();
    for (uid, meta) in indices.by_uid.copy() {
        match indices.by_function.get(&meta.key()) {
            Ok(fsvc) if fsvc.idle_for() > age => old.push(fsvc),
            Ok(_) => {}
            Err(e) => warn!("Function uid {} has no cached service: {}", uid, e),
        }
    }
    old
}

fn log_contents(indices: &Indices) {
    let contents = indices.by_function.copy();
    let mut lines: Vec<String> = contents
        .iter()
        .flat_map(|(key, fsvc)| {
            fsvc.kubernetes_objects.iter().map(move |o| {
                format!(
                    "{}\t{}\t{}",
                    key,
                    o.kind.as_deref().unwrap_or_default(),
                    o.name.as_deref().unwrap_or_default()
                )
            })
        })
        .collect();
    lines.sort();
    info!(item_count = contents.len(), "Function service cache");
    for line in lines {
        info!("{}", line);
    }
}
