use std::future::Future;

use bb8::ManageConnection;
use tokio_postgres::{Client as PgClient, NoTls, Statement};

use super::cache::StatementCache;
use super::config::PostgresConfig;
use crate::error::PgMiddlewareError;

/// `bb8` manager opening plaintext `tokio-postgres` connections.
#[derive(Debug, Clone)]
pub struct PgManager {
    config: tokio_postgres::Config,
    prepare_threshold: u32,
    cache_capacity: usize,
}

impl PgManager {
    /// # Errors
    /// Returns `ConfigError` if the configuration cannot be used with the
    /// plaintext connector.
    pub fn new(config: &PostgresConfig) -> Result<Self, PgMiddlewareError> {
        Ok(Self {
            config: config.to_pg_config()?,
            prepare_threshold: config.options.prepare_threshold,
            cache_capacity: config.options.statement_cache_capacity,
        })
    }
}

impl ManageConnection for PgManager {
    type Connection = PgConnection;
    type Error = PgMiddlewareError;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let config = self.config.clone();
        let threshold = self.prepare_threshold;
        let capacity = self.cache_capacity;
        async move {
            let (client, connection) = config.connect(NoTls).await.map_err(|e| {
                PgMiddlewareError::ConnectionError(format!("Failed to connect to Postgres: {e}"))
            })?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::warn!(error = %e, "postgres connection task ended");
                }
            });
            tracing::debug!("opened postgres connection");
            Ok(PgConnection {
                client,
                cache: StatementCache::new(threshold, capacity),
            })
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move {
            conn.client
                .simple_query("SELECT 1")
                .await
                .map(|_| ())
                .map_err(PgMiddlewareError::from)
        }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.client.is_closed()
    }
}

/// A pooled `tokio-postgres` session with its statement cache.
pub struct PgConnection {
    pub(super) client: PgClient,
    pub(super) cache: StatementCache<Statement>,
}

impl std::fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnection")
            .field("closed", &self.client.is_closed())
            .field("cached_statements", &self.cache.len())
            .finish()
    }
}

impl PgConnection {
    /// The underlying driver client, for work outside the dispatcher.
    #[must_use]
    pub fn raw(&self) -> &PgClient {
        &self.client
    }
}
