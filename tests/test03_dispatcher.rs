#![cfg(feature = "test-utils")]

use pg_middleware::prelude::*;
use pg_middleware::test_utils::{MockCell, MockDatabase, MockReply, query};

fn hosts_db() -> std::sync::Arc<MockDatabase> {
    MockDatabase::new(|stmt| {
        if stmt.sql.starts_with("INSERT") {
            return MockReply::Affected(1);
        }
        if stmt.sql.contains("WHERE 1 = 0") {
            return MockReply::empty(&["id", "addr"]);
        }
        MockReply::rows(
            &["id", "addr"],
            vec![
                vec![RowValues::Int(1), RowValues::Text("10.0.0.1".into())],
                vec![RowValues::Int(2), RowValues::Text("10.0.0.2".into())],
                vec![RowValues::Int(3), RowValues::Text("10.0.0.3".into())],
            ],
        )
    })
}

#[tokio::test]
async fn test03_execute_binds_typed_values() -> Result<(), PgMiddlewareError> {
    let db = hosts_db();
    let client = db.client("test03_execute").await?;

    let q = ParameterizedQuery::new(
        "INSERT INTO t(a,b) VALUES ($1,$2)",
        vec![
            RowValues::Int(42),
            RowValues::Typed(TypedValue::inet("192.168.1.1")?),
        ],
    )?;
    let meta = client.execute(&q).await?;
    assert_eq!(meta.rows_affected, 1);
    assert!(meta.generated_keys.is_none());

    let seen = db.statements();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].params[0].value, RowValues::Int(42));
    assert_eq!(seen[0].params[1].hint.name, "inet");
    assert_eq!(
        seen[0].params[1].value.as_typed().and_then(TypedValue::to_pg_text),
        Some("192.168.1.1".to_string())
    );

    client.close().await
}

#[tokio::test]
async fn test03_query_row_cardinality() -> Result<(), PgMiddlewareError> {
    let db = hosts_db();
    let client = db.client("test03_query_row").await?;

    let none = client
        .query_row(&query("SELECT id, addr FROM hosts WHERE 1 = 0", vec![]))
        .await;
    assert!(matches!(none, Err(PgMiddlewareError::NoRows)));

    // More than one row: the first one wins.
    let row = client
        .query_row(&query("SELECT id, addr FROM hosts", vec![]))
        .await?;
    assert_eq!(row.get("id"), Some(&RowValues::Int(1)));

    let (id, addr): (i64, String) = client
        .query_row_as(&query("SELECT id, addr FROM hosts", vec![]))
        .await?;
    assert_eq!((id, addr.as_str()), (1, "10.0.0.1"));

    // The connection came back after each call.
    assert_eq!(client.pool_status().map(|s| s.in_use()), Some(0));
    client.close().await
}

#[tokio::test]
async fn test03_query_streams_rows() -> Result<(), PgMiddlewareError> {
    let db = hosts_db();
    let client = db.client("test03_stream").await?;

    let mut rows = client
        .query(&query("SELECT id, addr FROM hosts WHERE id > ?", vec![0.into()]))
        .await?;
    assert_eq!(rows.columns().len(), 2);
    assert_eq!(rows.columns()[1], "addr");
    let first = rows.next_row().await?.expect("first row");
    assert_eq!(first.get_as::<i64>("id")?, 1);
    let rest = rows.collect().await?;
    assert_eq!(rest.len(), 2);
    assert_eq!(
        rest.first().and_then(|r| r.get("addr")).and_then(RowValues::as_text),
        Some("10.0.0.2")
    );

    client.close().await
}

#[tokio::test]
async fn test03_decode_error_does_not_abort_stream() -> Result<(), PgMiddlewareError> {
    let db = MockDatabase::new(|_| MockReply::Rows {
        columns: vec!["loc".to_string()],
        rows: vec![
            vec![MockCell::Value(RowValues::Text("(1,2)".into()))],
            vec![MockCell::Undecodable("bad point".into())],
            vec![MockCell::Value(RowValues::Text("(3,4)".into()))],
        ],
    });
    let client = db.client("test03_decode").await?;

    let mut rows = client.query(&query("SELECT loc FROM places", vec![])).await?;
    assert!(rows.next_row().await?.is_some());
    assert!(matches!(
        rows.next_row().await,
        Err(PgMiddlewareError::TypeMismatch { .. })
    ));
    assert!(rows.is_open());
    let third = rows.next_row().await?.expect("third row");
    assert_eq!(third.get("loc").and_then(RowValues::as_text), Some("(3,4)"));
    assert!(rows.next_row().await?.is_none());
    assert!(!rows.is_open());
    assert_eq!(rows.rows_read(), 3);

    client.close().await
}

#[tokio::test]
async fn test03_transport_error_ends_stream() -> Result<(), PgMiddlewareError> {
    let db = MockDatabase::new(|_| MockReply::RowsThenError {
        columns: vec!["n".to_string()],
        rows: vec![vec![MockCell::Value(RowValues::Int(1))]],
        error: "connection reset".to_string(),
    });
    let client = db.client("test03_transport").await?;

    let mut rows = client.query(&query("SELECT n FROM t", vec![])).await?;
    assert!(rows.next_row().await?.is_some());
    assert!(matches!(
        rows.next_row().await,
        Err(PgMiddlewareError::ExecutionError(_))
    ));
    assert!(!rows.is_open());
    assert!(rows.next_row().await?.is_none());

    client.close().await
}

#[tokio::test]
async fn test03_cancel_releases_connection() -> Result<(), PgMiddlewareError> {
    let db = hosts_db();
    let client = db.client("test03_cancel").await?;

    let mut rows = client.query(&query("SELECT id, addr FROM hosts", vec![])).await?;
    assert!(rows.next_row().await?.is_some());
    assert_eq!(client.pool_status().map(|s| s.in_use()), Some(1));
    rows.cancel();
    assert!(!rows.is_open());
    assert!(rows.next_row().await?.is_none());
    assert_eq!(client.pool_status().map(|s| s.in_use()), Some(0));

    // Dropping an unfinished stream releases as well.
    let rows = client.query(&query("SELECT id, addr FROM hosts", vec![])).await?;
    drop(rows);
    assert_eq!(client.pool_status().map(|s| s.in_use()), Some(0));

    client.close().await
}

#[tokio::test]
async fn test03_batch_stops_at_first_failure() -> Result<(), PgMiddlewareError> {
    let db = MockDatabase::new(|stmt| {
        if stmt.params[0].value == RowValues::Int(2) {
            MockReply::Error("duplicate key value violates unique constraint (23505)".into())
        } else {
            MockReply::Affected(1)
        }
    });
    let client = db.client("test03_batch").await?;

    let t = Template::parse("INSERT INTO t(id) VALUES (?)")?;
    let batch = vec![
        ParameterizedQuery::from_template(&t, vec![1.into()])?,
        ParameterizedQuery::from_template(&t, vec![2.into()])?,
        ParameterizedQuery::from_template(&t, vec![3.into()])?,
    ];
    match client.batch_execute(&batch).await {
        Err(PgMiddlewareError::BatchExecution {
            completed,
            failed_index,
            source,
        }) => {
            assert_eq!(failed_index, 1);
            assert_eq!(completed.len(), 1);
            assert_eq!(completed[0].rows_affected, 1);
            assert!(source.server_message().contains("23505"));
        }
        other => panic!("expected BatchExecution, got {other:?}"),
    }
    // The third statement never ran.
    assert_eq!(db.statements().len(), 2);

    let ok = client.batch_execute(&batch[..1]).await?;
    assert_eq!(ok.total_rows_affected(), 1);

    client.close().await
}

#[tokio::test]
async fn test03_batch_requires_one_template() -> Result<(), PgMiddlewareError> {
    let db = hosts_db();
    let client = db.client("test03_batch_shape").await?;

    let mixed = vec![
        query("INSERT INTO t(id) VALUES (?)", vec![1.into()]),
        query("INSERT INTO u(id) VALUES (?)", vec![2.into()]),
    ];
    assert!(matches!(
        client.batch_execute(&mixed).await,
        Err(PgMiddlewareError::ParameterError(_))
    ));
    assert!(db.statements().is_empty());

    let empty = client.batch_execute(&[]).await?;
    assert!(empty.is_empty());

    client.close().await
}

#[tokio::test]
async fn test03_generated_keys() -> Result<(), PgMiddlewareError> {
    let db = MockDatabase::new(|stmt| {
        assert!(stmt.returning);
        MockReply::rows(&["id"], vec![vec![RowValues::Int(101)]])
    });
    let client = db.client("test03_keys").await?;

    let q = query("INSERT INTO t(a) VALUES (?)", vec!["x".into()]).with_generated_keys(&["id"])?;
    let meta = client.execute(&q).await?;
    assert_eq!(meta.rows_affected, 1);
    let keys = meta.generated_keys.expect("generated keys");
    assert_eq!(keys.first().and_then(|r| r.get("id")), Some(&RowValues::Int(101)));
    assert_eq!(
        &*db.statements()[0].sql,
        "INSERT INTO t(a) VALUES ($1) RETURNING id"
    );

    client.close().await
}

#[tokio::test]
async fn test03_generated_keys_survive_trailing_comment() -> Result<(), PgMiddlewareError> {
    let db = MockDatabase::new(|stmt| {
        if stmt.sql.contains("-- audit RETURNING") {
            MockReply::empty(&["id"])
        } else {
            MockReply::rows(&["id"], vec![vec![RowValues::Int(7)]])
        }
    });
    let client = db.client("test03_keys_comment").await?;

    let q = query("INSERT INTO t(a) VALUES (?) -- audit", vec!["x".into()])
        .with_generated_keys(&["id"])?;
    let meta = client.execute(&q).await?;
    assert_eq!(meta.rows_affected, 1);
    assert_eq!(
        meta.generated_keys
            .as_ref()
            .and_then(|keys| keys.first())
            .and_then(|r| r.get("id")),
        Some(&RowValues::Int(7))
    );

    client.close().await
}

#[tokio::test]
async fn test03_closed_client_rejects_operations() -> Result<(), PgMiddlewareError> {
    let db = hosts_db();
    let client = db.client("test03_closed").await?;
    client.close().await?;
    assert!(client.is_closed());

    let q = query("SELECT id FROM hosts", vec![]);
    assert!(matches!(
        client.query(&q).await,
        Err(PgMiddlewareError::ClosedResource(_))
    ));
    assert!(matches!(
        client.query_row(&q).await,
        Err(PgMiddlewareError::ClosedResource(_))
    ));
    assert!(matches!(
        client.execute(&q).await,
        Err(PgMiddlewareError::ClosedResource(_))
    ));
    assert!(matches!(
        client.batch_execute(&[]).await,
        Err(PgMiddlewareError::ClosedResource(_))
    ));
    let call = ProcedureCall::procedure("noop")?;
    assert!(matches!(
        client.call(&call).await,
        Err(PgMiddlewareError::ClosedResource(_))
    ));
    assert!(db.statements().is_empty());

    // Closing again is a no-op.
    client.close().await
}

#[tokio::test]
async fn test03_server_errors_surface_as_execution_errors() -> Result<(), PgMiddlewareError> {
    let db = MockDatabase::new(|_| MockReply::Error("relation \"nope\" does not exist (42P01)".into()));
    let client = db.client("test03_server_error").await?;

    let err = client
        .execute(&query("DELETE FROM nope", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, PgMiddlewareError::ExecutionError(_)));
    assert!(err.server_message().contains("42P01"));
    // A failed statement does not leak its connection.
    assert_eq!(client.pool_status().map(|s| s.in_use()), Some(0));

    client.close().await
}
