//! Connection Pool
//!
//! Keep-alive connections keyed by `(scheme, host, port)`.
//!
//! The pool only tracks handles; it never opens or closes sockets itself.
//! Entries live until they are invalidated or the pool is dropped. There is
//! no eviction, size bound or idle timeout: the client serves one user in
//! one process, so the number of origins stays small.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::lock;
use crate::transport::Transport;
use crate::uri::Scheme;

/// Shared handle to a pooled transport.
///
/// The inner mutex is held for one request/response exchange, which
/// serializes callers that share a connection key.
pub type TransportHandle<T = Transport> = Arc<Mutex<T>>;

/// Key for connection pooling
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub scheme: Scheme,
    pub host: Box<str>,
    pub port: u16,
}

impl ConnectionKey {
    pub fn new(scheme: Scheme, host: &str, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    pub fn is_tls(&self) -> bool {
        self.scheme == Scheme::Https
    }
}

impl std::fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Connection pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// `acquire` found a pooled connection
    pub hits: u64,
    /// `acquire` found nothing
    pub misses: u64,
    /// Handles stored back into the pool
    pub stores: u64,
    /// Entries removed by `invalidate`
    pub invalidations: u64,
}

impl PoolStats {
    pub fn reuse_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct PoolInner<T> {
    entries: HashMap<ConnectionKey, TransportHandle<T>>,
    stats: PoolStats,
}

/// Connection pool
#[derive(Debug)]
pub struct ConnectionPool<T = Transport> {
    inner: Mutex<PoolInner<T>>,
}

impl<T> Default for ConnectionPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ConnectionPool<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                entries: HashMap::new(),
                stats: PoolStats::default(),
            }),
        }
    }

    /// Look up the connection for `key`. The entry stays in the pool.
    pub fn acquire(&self, key: &ConnectionKey) -> Option<TransportHandle<T>> {
        let mut inner = lock(&self.inner);
        let handle = inner.entries.get(key).cloned();

        if handle.is_some() {
            inner.stats.hits += 1;
            tracing::debug!(%key, "reusing pooled connection");
        } else {
            inner.stats.misses += 1;
        }

        handle
    }

    /// Put a connection into the pool, replacing any entry for `key`.
    ///
    /// Closing a replaced connection is the caller's job.
    pub fn store(&self, key: ConnectionKey, handle: TransportHandle<T>) {
        let mut inner = lock(&self.inner);
        inner.stats.stores += 1;
        inner.entries.insert(key, handle);
    }

    /// Forget the connection for `key`. The caller must already have closed it.
    pub fn invalidate(&self, key: &ConnectionKey) {
        let mut inner = lock(&self.inner);
        if inner.entries.remove(key).is_some() {
            inner.stats.invalidations += 1;
            tracing::debug!(%key, "connection invalidated");
        }
    }

    /// Empty the pool and hand back every entry for the caller to close.
    pub fn drain(&self) -> Vec<(ConnectionKey, TransportHandle<T>)> {
        let mut inner = lock(&self.inner);
        let drained: Vec<_> = inner.entries.drain().collect();
        inner.stats.invalidations += drained.len() as u64;
        drained
    }

    pub fn contains(&self, key: &ConnectionKey) -> bool {
        lock(&self.inner).entries.contains_key(key)
    }

    /// Get statistics
    pub fn stats(&self) -> PoolStats {
        lock(&self.inner).stats
    }

    /// Pooled connection count
    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).entries.is_empty()
    }
}
