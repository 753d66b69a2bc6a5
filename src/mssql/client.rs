use tiberius::error::Error as TiberiusError;
use tiberius::{Client, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::config::build_tiberius_config;
use crate::config::Config;
use crate::error::ConnError;

/// Type alias for the raw tiberius client.
pub type MssqlClient = Client<Compat<TcpStream>>;

// Login failed, password expired/must change, cannot open database.
const LOGIN_FAILURE_CODES: [u32; 6] = [18456, 18452, 18486, 18487, 18488, 4060];

/// Open a new MSSQL connection, bounded by the configured connect timeout.
///
/// # Errors
/// Returns `ConnError::Timeout` if the handshake does not complete in time,
/// `ConnError::Auth` when the server rejects the login and
/// `ConnError::Network` for everything else.
pub async fn create_mssql_client(config: &Config) -> Result<MssqlClient, ConnError> {
    config.validate()?;
    let limit = config.connect_timeout();
    match tokio::time::timeout(limit, connect(config)).await {
        Ok(result) => result,
        Err(_) => Err(ConnError::Timeout(limit)),
    }
}

async fn connect(config: &Config) -> Result<MssqlClient, ConnError> {
    let tiberius_config = build_tiberius_config(config);

    let tcp = if config.options.instance_name.is_some() {
        TcpStream::connect_named(&tiberius_config)
            .await
            .map_err(conn_error)?
    } else {
        TcpStream::connect(tiberius_config.get_addr())
            .await
            .map_err(|e| ConnError::Network(format!("TCP connection error: {e}")))?
    };
    tcp.set_nodelay(true)
        .map_err(|e| ConnError::Network(e.to_string()))?;

    match Client::connect(tiberius_config, tcp.compat_write()).await {
        Ok(client) => Ok(client),
        // Azure SQL gateways redirect to the node that owns the database
        Err(TiberiusError::Routing { host, port }) => {
            tracing::debug!(%host, port, "server routed connection");
            let mut routed = build_tiberius_config(config);
            routed.host(&host);
            routed.port(port);
            let tcp = TcpStream::connect(routed.get_addr())
                .await
                .map_err(|e| ConnError::Network(format!("TCP connection error: {e}")))?;
            tcp.set_nodelay(true)
                .map_err(|e| ConnError::Network(e.to_string()))?;
            Client::connect(routed, tcp.compat_write())
                .await
                .map_err(conn_error)
        }
        Err(e) => Err(conn_error(e)),
    }
}

fn conn_error(err: TiberiusError) -> ConnError {
    match err {
        TiberiusError::Server(token) if LOGIN_FAILURE_CODES.contains(&token.code()) => {
            ConnError::Auth(token.message().to_string())
        }
        other => ConnError::Network(format!("SQL Server connection error: {other}")),
    }
}
