#![cfg(feature = "mssql")]

//! Runs against a real SQL Server when `MSSQL_MIDDLEWARE_TEST_SERVER` is set.
//! Credentials come from `MSSQL_MIDDLEWARE_TEST_USER` (default `sa`) and
//! `MSSQL_MIDDLEWARE_TEST_PASSWORD`.

use mssql_middleware::{
    Config, ExecError, MiddlewareError, Query, RowValues, create_pool, execute, execute_bulk,
};

fn live_config() -> Option<Config> {
    let server = std::env::var("MSSQL_MIDDLEWARE_TEST_SERVER").ok()?;
    let user = std::env::var("MSSQL_MIDDLEWARE_TEST_USER").unwrap_or_else(|_| "sa".into());
    let password = std::env::var("MSSQL_MIDDLEWARE_TEST_PASSWORD").unwrap_or_default();
    Some(
        Config::builder(server, user, password)
            .trust_server_certificate(true)
            .build(),
    )
}

#[tokio::test(flavor = "current_thread")]
async fn live_round_trip() -> Result<(), MiddlewareError> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let Some(config) = live_config() else {
        eprintln!("MSSQL_MIDDLEWARE_TEST_SERVER not set; skipping");
        return Ok(());
    };

    let rows = execute(&config, &Query::new("select 1 as x")).await?;
    assert_eq!(rows[0].get("x"), Some(&RowValues::Int(1)));

    let pool = create_pool(&config, 2).await?;
    let rows = execute(&pool, &Query::new("select @p as x").bind("p", 42)).await?;
    assert_eq!(rows[0].get("x"), Some(&RowValues::Int(42)));

    let err = execute(&pool, &Query::new("throw 50000, 'boom', 1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::Server { code: 50000, .. }));
    assert_eq!(err.server_message(), Some("boom"));

    execute_bulk(
        &pool,
        &[
            Query::new("create table #bulk (id bigint)"),
            Query::new("insert into #bulk values (@id)").bind("id", 1),
            Query::new("drop table #bulk"),
        ],
    )
    .await?;

    pool.close().await;
    Ok(())
}
