// MSSQL module - SQL Server sessions over tiberius
//
// - config: middleware Config -> tiberius::Config
// - client: raw client creation (named instances, routing, timeouts)
// - params: named parameter binding through sp_executesql
// - query: driver items -> statement events, value conversion
// - session: the Session/Connector implementation

pub mod client;
mod config;
mod params;
mod query;
mod session;

pub use client::{MssqlClient, create_mssql_client};
pub use session::{TiberiusConnector, TiberiusSession};
