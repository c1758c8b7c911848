#![cfg(feature = "postgres")]

use std::io::Write;
use std::time::Duration;

use clap::Parser;
use pg_middleware::postgres::{ConnectArgs, PgClient, PostgresConfig, SslMode};
use pg_middleware::prelude::*;

#[derive(Debug, Parser)]
struct Cli {
    #[command(flatten)]
    connect: ConnectArgs,
}

#[test]
fn test06_ssl_file_checks() -> Result<(), Box<dyn std::error::Error>> {
    let mut root = tempfile::NamedTempFile::new()?;
    writeln!(root, "-----BEGIN CERTIFICATE-----")?;

    let mut cfg = PostgresConfig::new("localhost", "app", "main");
    cfg.ssl.mode = SslMode::VerifyFull;
    assert!(matches!(cfg.validate(), Err(PgMiddlewareError::ConfigError(_))));

    cfg.ssl.root_cert = Some(root.path().to_path_buf());
    cfg.validate()?;

    let dir = tempfile::tempdir()?;
    cfg.ssl.root_cert = Some(dir.path().join("missing.pem"));
    assert!(matches!(cfg.validate(), Err(PgMiddlewareError::ConfigError(_))));

    cfg.ssl.root_cert = Some(root.path().to_path_buf());
    cfg.ssl.client_cert = Some(root.path().to_path_buf());
    assert!(matches!(cfg.validate(), Err(PgMiddlewareError::ConfigError(_))));
    let key = tempfile::NamedTempFile::new()?;
    cfg.ssl.client_key = Some(key.path().to_path_buf());
    cfg.validate()?;
    Ok(())
}

#[test]
fn test06_connect_args() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::try_parse_from([
        "tool",
        "--pg-host",
        "db.internal",
        "--pg-port",
        "6543",
        "--pg-user",
        "svc",
        "--pg-dbname",
        "inventory",
        "--pg-sslmode",
        "disable",
        "--pg-max-connections",
        "3",
        "--pg-acquire-timeout",
        "2",
    ])?;
    let cfg = PostgresConfig::from(cli.connect);
    assert_eq!(cfg.host, "db.internal");
    assert_eq!(cfg.port, 6543);
    assert_eq!(cfg.user, "svc");
    assert_eq!(cfg.dbname, "inventory");
    assert_eq!(cfg.ssl.mode, SslMode::Disable);
    assert_eq!(cfg.options.max_connections, 3);
    assert_eq!(cfg.options.acquire_timeout, Duration::from_secs(2));

    let client_cfg = cfg.client_config();
    assert_eq!(client_cfg.database, "inventory");
    assert_eq!(client_cfg.pool.max_size, 3);
    assert!(client_cfg.bind.binary_transfer);

    assert!(Cli::try_parse_from(["tool", "--pg-user", "u", "--pg-dbname", "d", "--pg-sslmode", "sometimes"]).is_err());
    Ok(())
}

#[test]
fn test06_pool_keys() {
    let a = PostgresConfig::new("h", "u", "d");
    let mut b = a.clone();
    assert_eq!(a.pool_key(), b.pool_key());
    b.options.statement_cache_capacity = 16;
    assert_ne!(a.pool_key(), b.pool_key());
    assert!(a.pool_key().starts_with("u@h:5432/d#"));
}

#[test]
fn test06_config_from_json() -> Result<(), Box<dyn std::error::Error>> {
    let cfg: PostgresConfig = serde_json::from_str(
        r#"{
            "host": "localhost",
            "user": "app",
            "password": "secret",
            "dbname": "main",
            "options": { "max_connections": 4, "prepare_threshold": 0 },
            "ssl": { "mode": "allow" }
        }"#,
    )?;
    assert_eq!(cfg.port, 5432);
    assert_eq!(cfg.options.max_connections, 4);
    assert_eq!(cfg.options.prepare_threshold, 0);
    assert_eq!(cfg.options.acquire_timeout, Duration::from_secs(30));
    assert!(cfg.options.infer_plain_types);
    assert_eq!(cfg.ssl.mode, SslMode::Allow);
    cfg.validate()?;
    Ok(())
}

#[tokio::test]
async fn test06_connect_rejects_bad_config_before_pooling() {
    let missing_db = PostgresConfig::new("localhost", "app", "");
    assert!(matches!(
        PgClient::connect(&missing_db).await,
        Err(PgMiddlewareError::ConfigError(_))
    ));

    let mut tls = PostgresConfig::new("localhost", "app", "main");
    tls.ssl.mode = SslMode::Require;
    assert!(matches!(
        PgClient::connect(&tls).await,
        Err(PgMiddlewareError::ConfigError(_))
    ));
    assert!(pg_middleware::postgres::registry().is_empty());
}
