use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::mssql::MssqlDriver;
use crate::db::DatabaseDriver;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectParams, ConnectionInfo};

/// Open a new connection. The caller installs it in the [`ConnectionSlot`](crate::state::ConnectionSlot).
pub async fn connect(
    params: &ConnectParams,
    config: &AppConfig,
) -> DbResult<(Arc<dyn DatabaseDriver>, ConnectionInfo)> {
    validate(params)?;
    tracing::info!(
        server = %params.server,
        database = %params.database,
        port = ?params.port,
        integrated = params.credentials().is_none(),
        "connecting to SQL Server"
    );

    match MssqlDriver::connect(params, config.connect_timeout()).await {
        Ok((driver, info)) => {
            tracing::info!(
                database = %info.database_name,
                tables = info.table_count,
                version = %info.server_version,
                "connected"
            );
            Ok((Arc::new(driver), info))
        }
        Err(e) => {
            tracing::warn!(error = %e, "connection failed");
            Err(e)
        }
    }
}

fn validate(params: &ConnectParams) -> DbResult<()> {
    if params.server.trim().is_empty() {
        return Err(DbError::Validation("please enter the server name".to_string()));
    }
    if params.database.trim().is_empty() {
        return Err(DbError::Validation("please enter the database name".to_string()));
    }
    Ok(())
}

/// Round-trip `SELECT 1` on the live connection.
pub async fn test_connection(driver: &dyn DatabaseDriver) -> DbResult<String> {
    driver.ping().await?;
    Ok("Connection active".to_string())
}
