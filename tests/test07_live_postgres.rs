#![cfg(feature = "postgres")]
//! Runs against a real server. Point `TESTING_PG_HOST`, `TESTING_PG_PORT`,
//! `TESTING_PG_USER`, `TESTING_PG_PASSWORD` and `TESTING_PG_DB` at a scratch
//! database and run with `cargo test -- --ignored`.

use pg_middleware::postgres::{PgClient, PostgresConfig, SslMode};
use pg_middleware::prelude::*;

// Each test gets its own pool; pooled connections belong to the runtime that opened them.
fn live_config(app: &str) -> Option<PostgresConfig> {
    let host = std::env::var("TESTING_PG_HOST").ok()?;
    let user = std::env::var("TESTING_PG_USER").unwrap_or_else(|_| "postgres".to_string());
    let db = std::env::var("TESTING_PG_DB").unwrap_or_else(|_| "testing".to_string());
    let mut cfg = PostgresConfig::new(&host, &user, &db);
    if let Some(port) = std::env::var("TESTING_PG_PORT").ok().and_then(|p| p.parse().ok()) {
        cfg.port = port;
    }
    cfg.password = std::env::var("TESTING_PG_PASSWORD").ok();
    cfg.ssl.mode = SslMode::Disable;
    cfg.options.max_connections = 2;
    cfg.options.prepare_threshold = 1;
    cfg.options.application_name = Some(app.to_string());
    Some(cfg)
}

#[tokio::test]
#[ignore = "needs a PostgreSQL server"]
async fn test07_inet_round_trip() -> Result<(), PgMiddlewareError> {
    let Some(cfg) = live_config("pgmw_inet") else {
        return Ok(());
    };
    let client = PgClient::connect(&cfg).await?;

    client
        .execute(&ParameterizedQuery::new(
            "CREATE TABLE IF NOT EXISTS pgmw_hosts (id bigint PRIMARY KEY, addr inet)",
            vec![],
        )?)
        .await?;

    client
        .execute(&ParameterizedQuery::new("TRUNCATE pgmw_hosts", vec![])?)
        .await?;
    let insert = Template::parse("INSERT INTO pgmw_hosts(id, addr) VALUES (?, ?)")?;
    let meta = client
        .execute(&ParameterizedQuery::from_template(
            &insert,
            vec![
                RowValues::Int(42),
                RowValues::Typed(TypedValue::inet("192.168.1.1")?),
            ],
        )?)
        .await?;
    assert_eq!(meta.rows_affected, 1);

    let row = client
        .query_row(&ParameterizedQuery::new(
            "SELECT id, addr FROM pgmw_hosts WHERE id = ?",
            vec![RowValues::Int(42)],
        )?)
        .await?;
    assert_eq!(row.get("id"), Some(&RowValues::Int(42)));
    let addr = row.get("addr").and_then(RowValues::as_typed).expect("inet column");
    assert_eq!(addr.tag(), TypeTag::Inet);
    assert_eq!(addr.to_pg_text().as_deref(), Some("192.168.1.1"));

    client
        .execute(&ParameterizedQuery::new("DROP TABLE pgmw_hosts", vec![])?)
        .await?;
    client.close().await
}

#[tokio::test]
#[ignore = "needs a PostgreSQL server"]
async fn test07_batch_and_call() -> Result<(), PgMiddlewareError> {
    let Some(cfg) = live_config("pgmw_batch") else {
        return Ok(());
    };
    let client = PgClient::connect(&cfg).await?;

    client
        .execute(&ParameterizedQuery::new(
            "CREATE TABLE IF NOT EXISTS pgmw_batch (id bigint PRIMARY KEY)",
            vec![],
        )?)
        .await?;
    client
        .execute(&ParameterizedQuery::new("TRUNCATE pgmw_batch", vec![])?)
        .await?;

    let t = Template::parse("INSERT INTO pgmw_batch(id) VALUES (?)")?;
    let batch = (1..=3)
        .map(|i| ParameterizedQuery::from_template(&t, vec![RowValues::Int(i)]))
        .collect::<Result<Vec<_>, _>>()?;
    let done = client.batch_execute(&batch).await?;
    assert_eq!(done.total_rows_affected(), 3);

    // Re-inserting id 2 fails on the unique key after id 4 went in.
    let retry = vec![
        ParameterizedQuery::from_template(&t, vec![RowValues::Int(4)])?,
        ParameterizedQuery::from_template(&t, vec![RowValues::Int(2)])?,
    ];
    match client.batch_execute(&retry).await {
        Err(PgMiddlewareError::BatchExecution { failed_index, .. }) => assert_eq!(failed_index, 1),
        other => panic!("expected BatchExecution, got {other:?}"),
    }

    let call = ProcedureCall::function("upper")?
        .input("abc")
        .output(TypeTag::Custom);
    let result = client.call(&call).await?;
    let rows = result.rows.expect("function rows").collect().await?;
    assert_eq!(rows.len(), 1);

    let count = client
        .query_row(&ParameterizedQuery::new("SELECT count(*) AS n FROM pgmw_batch", vec![])?)
        .await?;
    assert_eq!(count.get("n"), Some(&RowValues::Int(4)));

    client
        .execute(&ParameterizedQuery::new("DROP TABLE pgmw_batch", vec![])?)
        .await?;
    client.close().await
}
