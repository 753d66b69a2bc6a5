//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::bulk::execute_bulk;
pub use crate::config::{Config, PoolConfig, RecoveryPolicy};
pub use crate::error::{ConnError, ExecError, MiddlewareError, PoolError};
pub use crate::executor::{QueryTarget, execute};
pub use crate::pool::{Pool, PoolStatus, PooledConnection};
pub use crate::query::Query;
pub use crate::results::ResultRow;
pub use crate::types::RowValues;

#[cfg(feature = "mssql")]
pub use crate::mssql::{MssqlClient, TiberiusConnector, create_mssql_client};
#[cfg(feature = "mssql")]
pub use crate::pool::create_pool;
