//! Function service cache
//!
//! In-memory bookkeeping for executors: which backend serves which function,
//! when it was last used, and (for pool-based executors) which warm
//! instances have spare capacity.
//!
//! - [`Cache`]: generic expiring key-value cache with "already exists" inserts
//! - [`PoolCache`]: per-function pool of specialized instances
//! - [`FunctionServiceCache`]: the three-index function service cache built
//!   on both

pub mod cache;
pub mod error;
pub mod func_svc;
pub mod function_service_cache;
pub mod key;
pub mod metrics;
pub mod pool_cache;

pub use cache::Cache;
pub use error::CacheError;
pub use func_svc::FuncSvc;
pub use function_service_cache::FunctionServiceCache;
pub use key::{FunctionKey, FunctionMeta, PoolKey};
pub use metrics::CacheMetrics;
pub use pool_cache::{PoolCache, PoolEntry, PoolEntryState};
