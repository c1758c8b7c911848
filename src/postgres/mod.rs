//! PostgreSQL backend over `tokio-postgres`.
//!
//! ```rust,no_run
//! use pg_middleware::postgres::{PgClient, PostgresConfig};
//! use pg_middleware::prelude::*;
//!
//! # async fn run() -> Result<(), PgMiddlewareError> {
//! let cfg = PostgresConfig::new("localhost", "app", "inventory").with_password("secret");
//! let client = PgClient::connect(&cfg).await?;
//! let q = ParameterizedQuery::new(
//!     "INSERT INTO hosts(id, addr) VALUES ($1, $2)",
//!     vec![RowValues::Int(42), RowValues::Typed(TypedValue::inet("192.168.1.1")?)],
//! )?;
//! assert_eq!(client.execute(&q).await?.rows_affected, 1);
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod config;
mod manager;
mod params;
mod query;

use std::sync::Arc;

use lazy_static::lazy_static;

use crate::client::Client;
use crate::error::PgMiddlewareError;
use crate::pool::PoolRegistry;

pub use config::{ConnectArgs, PostgresConfig, PostgresOptions, SslConfig, SslMode};
pub use manager::{PgConnection, PgManager};
pub use query::PgRowSource;

/// A client of the PostgreSQL backend.
pub type PgClient = Client<PgManager>;

lazy_static! {
    static ref REGISTRY: Arc<PoolRegistry<PgManager>> = PoolRegistry::new();
}

/// Process-wide registry shared by every [`PgClient::connect`].
#[must_use]
pub fn registry() -> &'static Arc<PoolRegistry<PgManager>> {
    &REGISTRY
}

impl Client<PgManager> {
    /// Open a client, joining the pool of any open client with an identical
    /// configuration.
    ///
    /// # Errors
    /// Returns `ConfigError` for an invalid configuration (including SSL modes
    /// that require encryption) or `ConnectionError` if the pool cannot be
    /// built.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, PgMiddlewareError> {
        config.validate()?;
        let manager = PgManager::new(config)?;
        let key = config.pool_key();
        tracing::debug!(pool = %key, "connecting postgres client");
        Client::open(registry(), &key, manager, config.client_config()).await
    }
}
