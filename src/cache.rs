//! Materialization cache and single-flight coordination.
//!
//! Per key `(name, query)` a materialization moves through
//! Absent -> Materializing -> Ready -> Expiring -> Absent.
//!
//! - Materializing: one leader holds a flight barrier; other callers for the
//!   same key wait on it, then look again.
//! - Ready: the entry is shared. Every user holds a reader lease for as long
//!   as the engine may be reading the files.
//! - Expiring: the eviction timer took the entry out of the map; the files are
//!   deleted once the last lease is gone.
//!
//! With a zero cache duration nothing reaches Ready: the leader materializes,
//! executes and deletes its files, then the next waiter takes its turn.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::storage::{self, Dirs};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub name: String,
    pub query: String,
}

impl CacheKey {
    pub fn new<N: Into<String>, Q: Into<String>>(name: N, query: Q) -> Self {
        Self { name: name.into(), query: query.into() }
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { write!(f, "{}:{}", self.name, self.query) }
}

/// Materialized directories plus a count of active readers.
#[derive(Debug)]
pub struct Materialization {
    dirs: Dirs,
    readers: watch::Sender<usize>,
}

impl Materialization {
    fn new(dirs: Dirs) -> Arc<Self> {
        let (readers, _) = watch::channel(0usize);
        Arc::new(Self { dirs, readers })
    }

    pub fn dirs(&self) -> &Dirs { &self.dirs }

    pub fn readers(&self) -> usize { *self.readers.borrow() }

    fn lease(self: &Arc<Self>) -> Lease {
        self.readers.send_modify(|n| *n += 1);
        Lease { mat: Arc::clone(self) }
    }

    async fn wait_idle(&self) {
        let mut rx = self.readers.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

/// Keeps a materialization's files alive while held.
#[derive(Debug)]
pub struct Lease {
    mat: Arc<Materialization>,
}

impl Lease {
    pub fn dirs(&self) -> &Dirs { self.mat.dirs() }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.mat.readers.send_modify(|n| *n = n.saturating_sub(1));
    }
}

struct Flight {
    done: watch::Sender<bool>,
}

impl Flight {
    fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self { done }
    }

    async fn wait(&self) {
        let mut rx = self.done.subscribe();
        let _ = rx.wait_for(|d| *d).await;
    }
}

/// Held by the leader; releases the barrier on drop, including on error or cancellation.
struct FlightGuard {
    inner: Arc<CacheInner>,
    key: CacheKey,
    flight: Arc<Flight>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.inner.flights.remove_if(&self.key, |_, f| Arc::ptr_eq(f, &self.flight));
        self.flight.done.send_replace(true);
    }
}

struct CacheEntry {
    mat: Arc<Materialization>,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct CacheInner {
    store: DashMap<CacheKey, CacheEntry>,
    flights: DashMap<CacheKey, Arc<Flight>>,
}

enum Role {
    Cached(Lease),
    Leader(FlightGuard),
}

/// Result of `QueryCache::run`.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheOutcome<T> {
    pub value: T,
    /// The materialization was reused rather than produced by this call.
    pub cached: bool,
}

#[derive(Clone, Default)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

impl QueryCache {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.inner.store.len() }

    pub fn is_empty(&self) -> bool { self.inner.store.is_empty() }

    pub fn contains(&self, key: &CacheKey) -> bool { self.inner.store.contains_key(key) }

    /// Materialize (or reuse) the files for `key` and run `execute` against them.
    ///
    /// `materialize` runs on the blocking pool and only when no usable entry
    /// exists. `execute` always runs under a reader lease. With a non-zero
    /// `ttl` a successful result's files stay reusable for `ttl`.
    pub async fn run<M, E, Fut, T>(&self, key: CacheKey, ttl: Duration, materialize: M, execute: E) -> AppResult<CacheOutcome<T>>
    where
        M: FnOnce() -> AppResult<Dirs> + Send + 'static,
        E: FnOnce(Dirs) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let use_cache = !ttl.is_zero();
        match self.acquire(&key, use_cache).await {
            Role::Cached(lease) => {
                info!(target: "duckframe::cache", key = %key, "data retrieved from cache");
                let out = execute(lease.dirs().clone()).await;
                drop(lease);
                out.map(|value| CacheOutcome { value, cached: true })
            }
            Role::Leader(guard) => {
                let dirs = materialize_blocking(materialize).await?;
                let mat = Materialization::new(dirs);
                let lease = mat.lease();
                let out = execute(mat.dirs().clone()).await;
                drop(lease);
                match out {
                    Ok(value) if use_cache => {
                        self.store(key, mat, ttl);
                        drop(guard);
                        Ok(CacheOutcome { value, cached: false })
                    }
                    Ok(value) => {
                        // nothing is kept; the next waiter becomes leader
                        storage::wipe(mat.dirs());
                        drop(guard);
                        Ok(CacheOutcome { value, cached: false })
                    }
                    Err(e) => {
                        drop(guard);
                        storage::wipe(mat.dirs());
                        Err(e)
                    }
                }
            }
        }
    }

    /// Remove every entry, cancelling its timer, and delete its files once unread.
    pub async fn clear(&self) {
        let keys: Vec<CacheKey> = self.inner.store.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, entry)) = self.inner.store.remove(&key) {
                entry.timer.abort();
                entry.mat.wait_idle().await;
                storage::wipe(entry.mat.dirs());
                debug!(target: "duckframe::cache", key = %key, "cleared");
            }
        }
    }

    fn lookup(&self, key: &CacheKey) -> Option<Lease> {
        // the lease is taken under the map guard, before eviction can remove the entry
        self.inner.store.get(key).map(|e| e.mat.lease())
    }

    async fn acquire(&self, key: &CacheKey, use_cache: bool) -> Role {
        loop {
            if let Some(lease) = self.lookup(key).filter(|_| use_cache) {
                return Role::Cached(lease);
            }
            let (flight, leader) = match self.inner.flights.entry(key.clone()) {
                Entry::Occupied(o) => (Arc::clone(o.get()), false),
                Entry::Vacant(v) => {
                    let f = Arc::new(Flight::new());
                    v.insert(Arc::clone(&f));
                    (f, true)
                }
            };
            if leader {
                let guard = FlightGuard { inner: Arc::clone(&self.inner), key: key.clone(), flight };
                // a previous leader may have stored between the lookup and the registration
                if let Some(lease) = self.lookup(key).filter(|_| use_cache) {
                    return Role::Cached(lease);
                }
                return Role::Leader(guard);
            }
            debug!(target: "duckframe::cache", key = %key, "waiting for in-flight materialization");
            flight.wait().await;
        }
    }

    /// First successful store wins; a losing materialization is deleted.
    fn store(&self, key: CacheKey, mat: Arc<Materialization>, ttl: Duration) {
        match self.inner.store.entry(key.clone()) {
            Entry::Occupied(_) => {
                debug!(target: "duckframe::cache", key = %key, "entry already stored, dropping duplicate");
                storage::wipe(mat.dirs());
            }
            Entry::Vacant(v) => {
                let timer = self.spawn_eviction(key, Arc::clone(&mat), ttl);
                v.insert(CacheEntry { mat, timer });
            }
        }
    }

    fn spawn_eviction(&self, key: CacheKey, mat: Arc<Materialization>, ttl: Duration) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let removed = inner.store.remove_if(&key, |_, e| Arc::ptr_eq(&e.mat, &mat)).is_some();
            if !removed {
                return;
            }
            debug!(target: "duckframe::cache", key = %key, readers = mat.readers(), "expired, waiting for readers");
            mat.wait_idle().await;
            storage::wipe(mat.dirs());
            debug!(target: "duckframe::cache", key = %key, "evicted");
        })
    }
}

async fn materialize_blocking<M>(materialize: M) -> AppResult<Dirs>
where
    M: FnOnce() -> AppResult<Dirs> + Send + 'static,
{
    tokio::task::spawn_blocking(materialize)
        .await
        .map_err(|e| AppError::materialization(format!("materialization task failed: {}", e)))?
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod cache_tests;
