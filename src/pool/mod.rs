//! Shared, reference-counted connection pools.
//!
//! Physical pooling is delegated to `bb8`. A [`PoolRegistry`] hands the same
//! pool to every client opened with the same key and tears it down exactly once,
//! when the last of those clients releases it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bb8::{Pool, PooledConnection, RunError};

use crate::driver::PoolBackend;
use crate::error::PgMiddlewareError;

const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Sizing and timeouts of one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_size: u32,
    pub min_idle: Option<u32>,
    /// How long `acquire` waits for a free connection.
    pub acquire_timeout: Duration,
    /// How long the final close waits for connections still in use.
    pub close_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 10,
            min_idle: None,
            acquire_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// Connection counts of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub connections: u32,
    pub idle_connections: u32,
}

impl PoolStatus {
    /// Connections currently checked out.
    #[must_use]
    pub fn in_use(&self) -> u32 {
        self.connections.saturating_sub(self.idle_connections)
    }
}

/// A cloneable handle onto one shared pool.
pub struct PoolHandle<M: PoolBackend> {
    pool: Pool<M>,
    key: Arc<str>,
}

impl<M: PoolBackend> Clone for PoolHandle<M> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            key: Arc::clone(&self.key),
        }
    }
}

impl<M: PoolBackend> std::fmt::Debug for PoolHandle<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolHandle")
            .field("key", &self.key)
            .field("status", &self.status())
            .finish()
    }
}

impl<M: PoolBackend> PoolHandle<M> {
    /// Check out a connection, waiting at most `timeout`.
    ///
    /// The connection goes back to the pool when the returned guard is
    /// dropped, on every exit path.
    ///
    /// # Errors
    /// Returns `PoolTimeout` when no connection frees up in time, or the
    /// backend's error (`ConnectionError` for PostgreSQL) when a new connection
    /// cannot be opened.
    pub async fn acquire(
        &self,
        timeout: Duration,
    ) -> Result<PooledConnection<'static, M>, PgMiddlewareError> {
        let started = Instant::now();
        let timed_out = || PgMiddlewareError::PoolTimeout {
            waited_ms: started.elapsed().as_millis(),
        };
        match tokio::time::timeout(timeout, self.pool.get_owned()).await {
            Ok(Ok(conn)) => {
                tracing::debug!(pool = %self.key, "acquired connection");
                Ok(conn)
            }
            Ok(Err(RunError::User(err))) => Err(err),
            Ok(Err(RunError::TimedOut)) | Err(_) => {
                tracing::debug!(pool = %self.key, ?timeout, "connection acquire timed out");
                Err(timed_out())
            }
        }
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.pool.state();
        PoolStatus {
            connections: state.connections,
            idle_connections: state.idle_connections,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

struct PoolEntry<M: PoolBackend> {
    handle: PoolHandle<M>,
    refs: usize,
    close_timeout: Duration,
}

/// Pools shared by key with an explicit reference count.
pub struct PoolRegistry<M: PoolBackend> {
    entries: Mutex<HashMap<String, PoolEntry<M>>>,
    teardowns: AtomicUsize,
}

impl<M: PoolBackend> Default for PoolRegistry<M> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            teardowns: AtomicUsize::new(0),
        }
    }
}

/// A pool whose last reference is gone, waiting to be drained.
pub(crate) struct Retired<M: PoolBackend> {
    handle: PoolHandle<M>,
    close_timeout: Duration,
}

impl<M: PoolBackend> PoolRegistry<M> {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PoolEntry<M>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Join the pool registered under `key`, or build one from `manager`.
    ///
    /// # Errors
    /// Returns `ConnectionError` if `bb8` fails to build the pool.
    pub async fn open(
        &self,
        key: &str,
        manager: M,
        settings: &PoolSettings,
    ) -> Result<PoolHandle<M>, PgMiddlewareError> {
        if let Some(handle) = self.join(key) {
            return Ok(handle);
        }

        let pool = Pool::builder()
            .max_size(settings.max_size.max(1))
            .min_idle(settings.min_idle)
            .connection_timeout(settings.acquire_timeout)
            // A failed connect goes back to the waiting caller instead of
            // being retried until the acquire timeout hides it.
            .retry_connection(false)
            .build(manager)
            .await
            .map_err(|e| PgMiddlewareError::ConnectionError(format!("pool build error: {e}")))?;

        // Another caller may have registered the key while the pool was built;
        // theirs wins and ours is dropped.
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.refs += 1;
            return Ok(entry.handle.clone());
        }
        let handle = PoolHandle {
            pool,
            key: Arc::from(key),
        };
        entries.insert(
            key.to_string(),
            PoolEntry {
                handle: handle.clone(),
                refs: 1,
                close_timeout: settings.close_timeout,
            },
        );
        tracing::info!(pool = %key, max_size = settings.max_size, "opened pool");
        Ok(handle)
    }

    fn join(&self, key: &str) -> Option<PoolHandle<M>> {
        let mut entries = self.lock();
        let entry = entries.get_mut(key)?;
        entry.refs += 1;
        tracing::debug!(pool = %key, refs = entry.refs, "joined shared pool");
        Some(entry.handle.clone())
    }

    /// Drop one reference; returns the pool to drain when it was the last.
    pub(crate) fn release(&self, key: &str) -> Option<Retired<M>> {
        let mut entries = self.lock();
        let entry = entries.get_mut(key)?;
        entry.refs -= 1;
        if entry.refs > 0 {
            tracing::debug!(pool = %key, refs = entry.refs, "released shared pool");
            return None;
        }
        let entry = entries.remove(key)?;
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        tracing::info!(pool = %key, "tearing down pool");
        Some(Retired {
            handle: entry.handle,
            close_timeout: entry.close_timeout,
        })
    }

    /// Number of clients holding the pool under `key`.
    #[must_use]
    pub fn ref_count(&self, key: &str) -> usize {
        self.lock().get(key).map_or(0, |e| e.refs)
    }

    /// How many pools this registry has torn down.
    #[must_use]
    pub fn teardown_count(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<M: PoolBackend> Retired<M> {
    /// Wait for checked-out connections to come back, then drop the pool.
    ///
    /// # Errors
    /// Returns `ConnectionError` if connections are still in use after the
    /// close timeout. The pool is dropped either way.
    pub(crate) async fn drain(self) -> Result<(), PgMiddlewareError> {
        let deadline = Instant::now() + self.close_timeout;
        loop {
            let in_use = self.handle.status().in_use();
            if in_use == 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    pool = %self.handle.key,
                    in_use,
                    "pool torn down with connections still in use"
                );
                return Err(PgMiddlewareError::ConnectionError(format!(
                    "{in_use} connection(s) still in use after {:?}",
                    self.close_timeout
                )));
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
    }
}
