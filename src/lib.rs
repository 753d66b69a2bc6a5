//! Async SQL Server access: one-off statements, a fixed pool of eagerly
//! connected sessions that recover from remote closes, and sequential bulk runs.
//!
//! ```rust,no_run
//! use mssql_middleware::prelude::*;
//!
//! # async fn run() -> Result<(), MiddlewareError> {
//! let config = Config::builder("db.example.net".into(), "app".into(), "secret".into())
//!     .database("orders")
//!     .build();
//! let pool = create_pool(&config, 4).await?;
//!
//! let rows = execute(&pool, &Query::new("select @id as id").bind("id", 7)).await?;
//! assert_eq!(rows[0].get("id"), Some(&RowValues::Int(7)));
//!
//! execute_bulk(&pool, &["insert into t values (1)".into(), "insert into t values (2)".into()]).await?;
//! pool.close().await;
//! # Ok(())
//! # }
//! ```

pub mod bulk;
pub mod config;
pub mod error;
pub mod executor;
mod helpers;
#[cfg(feature = "mssql")]
pub mod mssql;
pub mod pool;
pub mod prelude;
pub mod query;
pub mod results;
pub mod session;
#[cfg(feature = "test-utils")]
pub mod test_utils;
pub mod types;

pub use bulk::{execute_bulk, execute_bulk_with};
pub use config::{Config, ConfigBuilder, ConnectOptions, PoolConfig, RecoveryPolicy};
pub use error::{ConnError, ExecError, MiddlewareError, PoolError};
pub use executor::{Direct, QueryTarget, execute, execute_with};
#[cfg(feature = "mssql")]
pub use mssql::{TiberiusConnector, TiberiusSession};
#[cfg(feature = "mssql")]
pub use pool::create_pool;
pub use pool::{Pool, PoolStatus, PooledConnection};
pub use query::{Parameter, Query, Request};
pub use results::ResultRow;
pub use session::{
    ConnectionState, Connector, DisconnectNotifier, EventStream, HandleId, Session, SessionLink,
    StatementEvent,
};
pub use types::{RowValues, WireType};
