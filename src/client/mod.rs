//! The client object: a reference to a shared pool plus the five operations.

mod ops;
mod procedure;
mod stream;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::driver::PoolBackend;
use crate::error::PgMiddlewareError;
use crate::pool::{PoolHandle, PoolRegistry, PoolSettings, PoolStatus};
use crate::query::BindOptions;

pub use procedure::{OutParam, OutSlot, ProcedureArg, ProcedureCall, ProcedureKind, ProcedureResult};
pub use stream::RowStream;

/// Per-client settings.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Database the client targets; informational for the dispatcher.
    pub database: String,
    pub pool: PoolSettings,
    pub bind: BindOptions,
}

/// A handle onto a shared pool. `Open` until [`close`](Client::close).
///
/// Clients opened with the same key share one pool; the pool is torn down when
/// the last of them closes.
pub struct Client<M: PoolBackend> {
    handle: Mutex<Option<PoolHandle<M>>>,
    registry: Arc<PoolRegistry<M>>,
    key: String,
    database: String,
    bind: BindOptions,
    acquire_timeout: Duration,
}

impl<M: PoolBackend> std::fmt::Debug for Client<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("key", &self.key)
            .field("database", &self.database)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl<M: PoolBackend> Client<M> {
    /// Open a client on the pool registered under `key`, creating the pool
    /// from `manager` if no other client holds it.
    ///
    /// # Errors
    /// Returns `ConnectionError` if the pool cannot be built.
    pub async fn open(
        registry: &Arc<PoolRegistry<M>>,
        key: &str,
        manager: M,
        config: ClientConfig,
    ) -> Result<Self, PgMiddlewareError> {
        let handle = registry.open(key, manager, &config.pool).await?;
        Ok(Self {
            handle: Mutex::new(Some(handle)),
            registry: Arc::clone(registry),
            key: key.to_string(),
            database: config.database,
            bind: config.bind,
            acquire_timeout: config.pool.acquire_timeout,
        })
    }

    fn slot(&self) -> MutexGuard<'_, Option<PoolHandle<M>>> {
        match self.handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn pool(&self) -> Result<PoolHandle<M>, PgMiddlewareError> {
        self.slot().clone().ok_or_else(|| {
            PgMiddlewareError::ClosedResource(format!("client for '{}' is closed", self.database))
        })
    }

    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    #[must_use]
    pub fn pool_key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn bind_options(&self) -> &BindOptions {
        &self.bind
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.slot().is_none()
    }

    /// Connection counts of the shared pool; `None` once closed.
    #[must_use]
    pub fn pool_status(&self) -> Option<PoolStatus> {
        self.slot().as_ref().map(PoolHandle::status)
    }

    /// Release this client's reference to the pool.
    ///
    /// Idempotent: later calls return `Ok(())`. When this was the last
    /// reference the pool is torn down, waiting up to the close timeout for
    /// connections still in use.
    ///
    /// # Errors
    /// Returns `ConnectionError` if connections were still in use when the
    /// close timeout expired; the pool is torn down regardless.
    pub async fn close(&self) -> Result<(), PgMiddlewareError> {
        let Some(handle) = self.slot().take() else {
            return Ok(());
        };
        drop(handle);
        tracing::debug!(pool = %self.key, "client closed");
        match self.registry.release(&self.key) {
            Some(retired) => retired.drain().await,
            None => Ok(()),
        }
    }
}

impl<M: PoolBackend> Drop for Client<M> {
    fn drop(&mut self) {
        if self.slot().take().is_some() {
            tracing::warn!(pool = %self.key, "client dropped without close");
            // Nothing can be awaited here; the pool is released without draining.
            drop(self.registry.release(&self.key));
        }
    }
}
