//! Keyed single-flight gate
//!
//! [`Throttler::run_once`] admits one creation per key at a time. The first
//! caller runs its closure with `able_to_create = true`; callers arriving
//! while it is in flight wait and receive the same result. Once a key has
//! completed successfully, later callers run their closure with
//! `able_to_create = false` until the entry expires, and are expected to read
//! the published result from their own cache instead of creating again.
//!
//! A failed attempt is removed immediately so the next caller starts fresh.
//! If the leading caller is cancelled, waiters fall back to
//! `able_to_create = false`.
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use std::time::Duration;
//! use throttler::Throttler;
//!
//! let throttler: Throttler<String, std::io::Error> = Throttler::new(Duration::from_secs(60));
//! let address = throttler
//!     .run_once("uid-1", |able_to_create| async move {
//!         assert!(able_to_create);
//!         Ok("fn-1.default".to_string())
//!     })
//!     .await;
//! assert_eq!(address.unwrap(), "fn-1.default");
//! # }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::debug;

/// Result shared between the leader and its waiters
pub type SharedResult<V, E> = Result<V, Arc<E>>;

struct Flight<V, E> {
    id: u64,
    started: Instant,
    result: watch::Receiver<Option<SharedResult<V, E>>>,
}

impl<V, E> Flight<V, E> {
    fn is_done(&self) -> bool {
        self.result.borrow().is_some()
    }
}

enum Role<V, E> {
    Leader(u64, watch::Sender<Option<SharedResult<V, E>>>),
    Waiter(watch::Receiver<Option<SharedResult<V, E>>>),
    Late,
}

/// Keyed single-flight gate
pub struct Throttler<V, E> {
    flights: Mutex<HashMap<String, Flight<V, E>>>,
    expiry: Duration,
    next_id: AtomicU64,
}

impl<V, E> Throttler<V, E>
where
    V: Clone + Send + Sync,
    E: Send + Sync,
{
    /// Create a gate whose successful entries are kept for `expiry`
    pub fn new(expiry: Duration) -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
            expiry,
            next_id: AtomicU64::new(1),
        }
    }

    /// Run `f` at most once concurrently per `key`.
    ///
    /// `f` receives `true` when the caller leads the attempt and `false`
    /// when a previous attempt for the key already succeeded (or its leader
    /// went away).
    pub async fn run_once<F, Fut>(&self, key: &str, f: F) -> SharedResult<V, E>
    where
        F: FnOnce(bool) -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        match self.join(key) {
            Role::Leader(id, sender) => {
                debug!("Leading single-flight for {}", key);
                let mut guard = LeaderGuard {
                    throttler: self,
                    key,
                    id,
                    armed: true,
                };
                let result = f(true).await.map_err(Arc::new);
                if result.is_err() {
                    self.remove_if(key, id);
                }
                guard.armed = false;
                // Waiters may all have gone away already
                let _ = sender.send(Some(result.clone()));
                result
            }
            Role::Waiter(mut receiver) => {
                debug!("Waiting on in-flight request for {}", key);
                let published = match receiver.wait_for(Option::is_some).await {
                    Ok(done) => (*done).clone(),
                    Err(_) => None,
                };
                if let Some(result) = published {
                    return result;
                }
                debug!("Leader for {} went away, reading published state", key);
                f(false).await.map_err(Arc::new)
            }
            Role::Late => f(false).await.map_err(Arc::new),
        }
    }

    /// Drop any state for `key` so the next call leads a fresh attempt
    pub fn forget(&self, key: &str) {
        if lock(&self.flights).remove(key).is_some() {
            debug!("Forgot single-flight state for {}", key);
        }
    }

    /// Number of keys currently tracked (in flight or completed and unexpired)
    pub fn len(&self) -> usize {
        lock(&self.flights).len()
    }

    /// True when no key is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn join(&self, key: &str) -> Role<V, E> {
        let mut flights = lock(&self.flights);
        if let Some(flight) = flights.get(key) {
            let expired = flight.started.elapsed() >= self.expiry;
            match (flight.is_done(), expired) {
                (false, false) => return Role::Waiter(flight.result.clone()),
                (true, false) => return Role::Late,
                _ => {}
            }
        }

        let expiry = self.expiry;
        flights.retain(|_, f| !f.is_done() || f.started.elapsed() < expiry);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = watch::channel(None);
        flights.insert(
            key.to_string(),
            Flight {
                id,
                started: Instant::now(),
                result: receiver,
            },
        );
        Role::Leader(id, sender)
    }

    fn remove_if(&self, key: &str, id: u64) {
        let mut flights = lock(&self.flights);
        if flights.get(key).is_some_and(|f| f.id == id) {
            flights.remove(key);
        }
    }
}

/// Clears the leader's entry when its future is dropped before completing
struct LeaderGuard<'a, V, E>
where
    V: Clone + Send + Sync,
    E: Send + Sync,
{
    throttler: &'a Throttler<V, E>,
    key: &'a str,
    id: u64,
    armed: bool,
}

impl<V, E> Drop for LeaderGuard<'_, V, E>
where
    V: Clone + Send + Sync,
    E: Send + Sync,
{
    fn drop(&mut self) {
        if self.armed {
            self.throttler.remove_if(self.key, self.id);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct TestError(&'static str);

    type TestThrottler = Throttler<u32, TestError>;

    #[tokio::test]
    async fn test_single_leader_under_concurrency() {
        let throttler = Arc::new(TestThrottler::new(Duration::from_secs(60)));
        let leaders = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let throttler = throttler.clone();
            let leaders = leaders.clone();
            handles.push(tokio::spawn(async move {
                throttler
                    .run_once("uid-1", |able| async move {
                        if able {
                            leaders.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                        Ok(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(leaders.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_is_shared_then_retry_starts_fresh() {
        let throttler = Arc::new(TestThrottler::new(Duration::from_secs(60)));

        let leader = {
            let throttler = throttler.clone();
            tokio::spawn(async move {
                throttler
                    .run_once("uid-1", |_| async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Err(TestError("boom"))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let waiter = throttler.run_once("uid-1", |_| async { Ok(7) }).await;
        let leader = leader.await.unwrap();

        let waiter_err = waiter.unwrap_err();
        let leader_err = leader.unwrap_err();
        assert!(Arc::ptr_eq(&waiter_err, &leader_err));
        assert_eq!(waiter_err.0, "boom");

        let retry = throttler.run_once("uid-1", |able| async move { Ok(if able { 1 } else { 0 }) }).await;
        assert_eq!(retry.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_late_caller_cannot_create() {
        let throttler = TestThrottler::new(Duration::from_secs(60));
        let first = throttler.run_once("uid-1", |able| async move { Ok(if able { 1 } else { 0 }) }).await;
        let second = throttler.run_once("uid-1", |able| async move { Ok(if able { 1 } else { 0 }) }).await;
        assert_eq!(first.unwrap(), 1);
        assert_eq!(second.unwrap(), 0);

        let other = throttler.run_once("uid-2", |able| async move { Ok(if able { 1 } else { 0 }) }).await;
        assert_eq!(other.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_allows_new_leader() {
        let throttler = TestThrottler::new(Duration::from_millis(10));
        throttler.run_once("uid-1", |_| async { Ok(1) }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let again = throttler.run_once("uid-1", |able| async move { Ok(if able { 1 } else { 0 }) }).await;
        assert_eq!(again.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_forget() {
        let throttler = TestThrottler::new(Duration::from_secs(60));
        throttler.run_once("uid-1", |_| async { Ok(1) }).await.unwrap();
        assert_eq!(throttler.len(), 1);
        throttler.forget("uid-1");
        assert!(throttler.is_empty());
        let again = throttler.run_once("uid-1", |able| async move { Ok(if able { 1 } else { 0 }) }).await;
        assert_eq!(again.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_leader_releases_waiters() {
        let throttler = Arc::new(TestThrottler::new(Duration::from_secs(60)));

        let leader = {
            let throttler = throttler.clone();
            tokio::spawn(async move {
                throttler
                    .run_once("uid-1", |_| async {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok(1)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let waiter = {
            let throttler = throttler.clone();
            tokio::spawn(async move {
                throttler
                    .run_once("uid-1", |able| async move { Ok(if able { 1 } else { 0 }) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        leader.abort();

        assert_eq!(waiter.await.unwrap().unwrap(), 0);
        assert!(throttler.is_empty());
    }
}
