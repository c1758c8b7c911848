use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::client::ClientConfig;
use crate::error::PgMiddlewareError;
use crate::pool::PoolSettings;
use crate::query::BindOptions;

/// TLS negotiation mode, spelled as libpq spells `sslmode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    Allow,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    /// Whether the mode refuses a plaintext connection.
    #[must_use]
    pub fn requires_encryption(self) -> bool {
        matches!(self, SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull)
    }

    #[must_use]
    pub fn verifies_server(self) -> bool {
        matches!(self, SslMode::VerifyCa | SslMode::VerifyFull)
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SslMode::Disable => "disable",
            SslMode::Allow => "allow",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SslConfig {
    pub mode: SslMode,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub root_cert: Option<PathBuf>,
}

fn require_file(label: &str, path: &Path) -> Result<(), PgMiddlewareError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PgMiddlewareError::ConfigError(format!(
            "{label} '{}' does not exist",
            path.display()
        )))
    }
}

impl SslConfig {
    /// Check that the certificate material is coherent and present on disk.
    ///
    /// # Errors
    /// Returns `ConfigError` describing the first problem found.
    pub fn validate(&self) -> Result<(), PgMiddlewareError> {
        if self.mode.verifies_server() && self.root_cert.is_none() {
            return Err(PgMiddlewareError::ConfigError(format!(
                "sslmode {} requires a root certificate",
                self.mode
            )));
        }
        match (&self.client_cert, &self.client_key) {
            (Some(_), None) => {
                return Err(PgMiddlewareError::ConfigError(
                    "client certificate given without a client key".to_string(),
                ));
            }
            (None, Some(_)) => {
                return Err(PgMiddlewareError::ConfigError(
                    "client key given without a client certificate".to_string(),
                ));
            }
            _ => {}
        }
        if let Some(path) = &self.root_cert {
            require_file("root certificate", path)?;
        }
        if let Some(path) = &self.client_cert {
            require_file("client certificate", path)?;
        }
        if let Some(path) = &self.client_key {
            require_file("client key", path)?;
        }
        Ok(())
    }
}

/// Driver and pool tuning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresOptions {
    pub connect_timeout: Option<Duration>,
    /// Sent as the session's `statement_timeout`.
    pub statement_timeout: Option<Duration>,
    /// How long an operation waits for a pooled connection.
    pub acquire_timeout: Duration,
    /// How long the last close waits for connections still in use.
    pub close_timeout: Duration,
    pub max_connections: u32,
    pub min_idle: Option<u32>,
    pub keepalives: bool,
    pub keepalives_idle: Option<Duration>,
    /// Executions of the same statement before it is kept prepared; 0 disables
    /// the cache.
    pub prepare_threshold: u32,
    pub statement_cache_capacity: usize,
    pub binary_transfer: bool,
    pub infer_plain_types: bool,
    pub application_name: Option<String>,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        let pool = PoolSettings::default();
        Self {
            connect_timeout: Some(Duration::from_secs(10)),
            statement_timeout: None,
            acquire_timeout: pool.acquire_timeout,
            close_timeout: pool.close_timeout,
            max_connections: 10,
            min_idle: None,
            keepalives: true,
            keepalives_idle: None,
            prepare_threshold: 5,
            statement_cache_capacity: 256,
            binary_transfer: true,
            infer_plain_types: true,
            application_name: None,
        }
    }
}

/// Connection settings for one PostgreSQL database.
///
/// ```rust
/// use pg_middleware::postgres::PostgresConfig;
///
/// let mut cfg = PostgresConfig::new("localhost", "app", "inventory");
/// cfg.options.max_connections = 4;
/// assert!(cfg.validate().is_ok());
/// assert_eq!(cfg.pool_key(), cfg.clone().pool_key());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    pub dbname: String,
    #[serde(default)]
    pub options: PostgresOptions,
    #[serde(default)]
    pub ssl: SslConfig,
}

fn default_port() -> u16 {
    5432
}

impl PostgresConfig {
    #[must_use]
    pub fn new(host: &str, user: &str, dbname: &str) -> Self {
        Self {
            host: host.to_string(),
            port: default_port(),
            user: user.to_string(),
            password: None,
            dbname: dbname.to_string(),
            options: PostgresOptions::default(),
            ssl: SslConfig::default(),
        }
    }

    #[must_use]
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    /// Check required fields and TLS material.
    ///
    /// # Errors
    /// Returns `ConfigError` for a missing host, user or database, a zero
    /// pool size, or invalid SSL settings.
    pub fn validate(&self) -> Result<(), PgMiddlewareError> {
        if self.host.trim().is_empty() {
            return Err(PgMiddlewareError::ConfigError("host is required".to_string()));
        }
        if self.user.trim().is_empty() {
            return Err(PgMiddlewareError::ConfigError("user is required".to_string()));
        }
        if self.dbname.trim().is_empty() {
            return Err(PgMiddlewareError::ConfigError(
                "dbname is required".to_string(),
            ));
        }
        if self.options.max_connections == 0 {
            return Err(PgMiddlewareError::ConfigError(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if let Some(min_idle) = self.options.min_idle {
            if min_idle > self.options.max_connections {
                return Err(PgMiddlewareError::ConfigError(format!(
                    "min_idle {min_idle} exceeds max_connections {}",
                    self.options.max_connections
                )));
            }
        }
        self.ssl.validate()
    }

    /// Identity under which clients share a pool.
    ///
    /// Identical configurations produce identical keys. The password only
    /// enters through a hash of the serialized configuration.
    #[must_use]
    pub fn pool_key(&self) -> String {
        let serialized = serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"));
        let mut hasher = DefaultHasher::new();
        serialized.hash(&mut hasher);
        format!(
            "{}@{}:{}/{}#{:016x}",
            self.user,
            self.host,
            self.port,
            self.dbname,
            hasher.finish()
        )
    }

    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            database: self.dbname.clone(),
            pool: PoolSettings {
                max_size: self.options.max_connections,
                min_idle: self.options.min_idle,
                acquire_timeout: self.options.acquire_timeout,
                close_timeout: self.options.close_timeout,
            },
            bind: BindOptions {
                binary_transfer: self.options.binary_transfer,
                infer_plain_types: self.options.infer_plain_types,
            },
        }
    }

    /// Driver configuration for the plaintext connector.
    ///
    /// # Errors
    /// Returns `ConfigError` when the SSL mode requires encryption.
    pub fn to_pg_config(&self) -> Result<tokio_postgres::Config, PgMiddlewareError> {
        use tokio_postgres::config::SslMode as DriverSslMode;

        if self.ssl.mode.requires_encryption() {
            return Err(PgMiddlewareError::ConfigError(format!(
                "sslmode {} needs a TLS connector; this build connects in plaintext",
                self.ssl.mode
            )));
        }

        let mut cfg = tokio_postgres::Config::new();
        cfg.host(&self.host)
            .port(self.port)
            .user(&self.user)
            .dbname(&self.dbname)
            .keepalives(self.options.keepalives)
            .ssl_mode(match self.ssl.mode {
                SslMode::Disable => DriverSslMode::Disable,
                _ => DriverSslMode::Prefer,
            });
        if let Some(password) = &self.password {
            cfg.password(password);
        }
        if let Some(timeout) = self.options.connect_timeout {
            cfg.connect_timeout(timeout);
        }
        if let Some(idle) = self.options.keepalives_idle {
            cfg.keepalives_idle(idle);
        }
        if let Some(name) = &self.options.application_name {
            cfg.application_name(name);
        }
        if let Some(timeout) = self.options.statement_timeout {
            cfg.options(&format!("-c statement_timeout={}", timeout.as_millis()));
        }
        Ok(cfg)
    }
}

/// Connection flags for binaries built on this crate.
///
/// Flatten into a `clap` parser with `#[command(flatten)]`.
#[derive(Debug, Clone, clap::Args)]
pub struct ConnectArgs {
    #[arg(long = "pg-host", env = "PGHOST", default_value = "localhost")]
    pub host: String,
    #[arg(long = "pg-port", env = "PGPORT", default_value_t = 5432)]
    pub port: u16,
    #[arg(long = "pg-user", env = "PGUSER")]
    pub user: String,
    #[arg(long = "pg-password", env = "PGPASSWORD")]
    pub password: Option<String>,
    #[arg(long = "pg-dbname", env = "PGDATABASE")]
    pub dbname: String,
    #[arg(long = "pg-sslmode", value_enum, default_value_t = SslMode::Prefer)]
    pub sslmode: SslMode,
    #[arg(long = "pg-sslrootcert")]
    pub root_cert: Option<PathBuf>,
    #[arg(long = "pg-sslcert")]
    pub client_cert: Option<PathBuf>,
    #[arg(long = "pg-sslkey")]
    pub client_key: Option<PathBuf>,
    #[arg(long = "pg-max-connections", default_value_t = 10)]
    pub max_connections: u32,
    /// Pool acquire timeout in seconds.
    #[arg(long = "pg-acquire-timeout", default_value_t = 30)]
    pub acquire_timeout_secs: u64,
}

impl From<ConnectArgs> for PostgresConfig {
    fn from(args: ConnectArgs) -> Self {
        let mut cfg = PostgresConfig::new(&args.host, &args.user, &args.dbname);
        cfg.port = args.port;
        cfg.password = args.password;
        cfg.ssl = SslConfig {
            mode: args.sslmode,
            client_cert: args.client_cert,
            client_key: args.client_key,
            root_cert: args.root_cert,
        };
        cfg.options.max_connections = args.max_connections;
        cfg.options.acquire_timeout = Duration::from_secs(args.acquire_timeout_secs);
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_fields() {
        let cfg = PostgresConfig::new("", "u", "d");
        assert!(matches!(cfg.validate(), Err(PgMiddlewareError::ConfigError(_))));
        let cfg = PostgresConfig::new("h", "u", " ");
        assert!(matches!(cfg.validate(), Err(PgMiddlewareError::ConfigError(_))));
    }

    #[test]
    fn pool_key_tracks_every_field() {
        let a = PostgresConfig::new("h", "u", "d").with_password("one");
        let b = PostgresConfig::new("h", "u", "d").with_password("two");
        assert_ne!(a.pool_key(), b.pool_key());
        assert!(!a.pool_key().contains("one"));
        assert_eq!(a.pool_key(), a.clone().pool_key());
    }

    #[test]
    fn encrypted_modes_are_refused() {
        let mut cfg = PostgresConfig::new("h", "u", "d");
        cfg.ssl.mode = SslMode::Require;
        assert!(cfg.validate().is_ok());
        assert!(matches!(cfg.to_pg_config(), Err(PgMiddlewareError::ConfigError(_))));
        cfg.ssl.mode = SslMode::Allow;
        assert!(cfg.to_pg_config().is_ok());
    }

    #[test]
    fn serde_defaults() {
        let cfg: PostgresConfig =
            serde_json::from_str(r#"{"host":"db","user":"app","dbname":"main","ssl":{"mode":"verify-full","root_cert":"/x"}}"#)
                .unwrap();
        assert_eq!(cfg.port, 5432);
        assert_eq!(cfg.options.max_connections, 10);
        assert_eq!(cfg.ssl.mode, SslMode::VerifyFull);
    }
}
