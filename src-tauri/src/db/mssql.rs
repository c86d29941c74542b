use async_trait::async_trait;
use std::time::Duration;
use tiberius::{AuthMethod, Client, ColumnData, Config, Query, SqlBrowser};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::db::DatabaseDriver;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectParams, ConnectionInfo, QueryResult, SqlValue};

type MssqlClient = Client<Compat<TcpStream>>;

const LOGIN_FAILED: u32 = 18456;
const CANNOT_OPEN_DATABASE: u32 = 4060;

/// A single TDS connection. Statements are serialised through the mutex.
pub struct MssqlDriver {
    client: Mutex<Option<MssqlClient>>,
}

impl MssqlDriver {
    /// Log in, switch to explicit transaction control and read the banner info.
    pub async fn connect(
        params: &ConnectParams,
        timeout: Duration,
    ) -> DbResult<(Self, ConnectionInfo)> {
        let (config, named_instance) = build_config(params)?;

        let client = tokio::time::timeout(timeout, open_client(config, named_instance, &params.database))
            .await
            .map_err(|_| {
                DbError::Connection(format!(
                    "timed out after {}s connecting to {}",
                    timeout.as_secs(),
                    params.server
                ))
            })??;

        let driver = Self {
            client: Mutex::new(Some(client)),
        };
        driver.execute_batch("SET IMPLICIT_TRANSACTIONS ON").await?;
        let info = driver.connection_info(&params.server).await?;
        Ok((driver, info))
    }

    async fn connection_info(&self, server: &str) -> DbResult<ConnectionInfo> {
        let result = self
            .query(
                "SELECT @@VERSION AS version, DB_NAME() AS db_name, \
                 (SELECT COUNT(*) FROM sys.tables) AS table_count",
                &[],
            )
            .await?;
        self.commit().await?;

        let row = result
            .rows
            .first()
            .ok_or_else(|| DbError::Connection("server returned no banner row".to_string()))?;
        let text = |i: usize| row.get(i).and_then(|v| v.as_str()).unwrap_or_default().to_string();

        Ok(ConnectionInfo {
            server: server.to_string(),
            server_version: text(0).lines().next().unwrap_or_default().trim().to_string(),
            database_name: text(1),
            table_count: row.get(2).and_then(|v| v.as_i64()).unwrap_or(0),
        })
    }
}

/// `HOST\INSTANCE` -> (`HOST`, Some(`INSTANCE`)).
fn split_instance(server: &str) -> (&str, Option<&str>) {
    match server.trim().split_once('\\') {
        Some((host, instance)) if !instance.is_empty() => (host, Some(instance)),
        Some((host, _)) => (host, None),
        None => (server.trim(), None),
    }
}

/// Build a tiberius config. The flag says whether the port must be resolved
/// through the SQL Browser service.
fn build_config(params: &ConnectParams) -> DbResult<(Config, bool)> {
    let mut config = Config::new();
    let (host, instance) = split_instance(&params.server);
    if host.is_empty() {
        return Err(DbError::Validation("server name is required".to_string()));
    }
    config.host(host);

    let named_instance = match (params.port, instance) {
        (Some(port), _) => {
            config.port(port);
            false
        }
        (None, Some(instance)) => {
            config.instance_name(instance);
            true
        }
        (None, None) => false,
    };

    if !params.database.trim().is_empty() {
        config.database(params.database.trim());
    }
    config.application_name("asterdb");

    match params.credentials() {
        Some((user, password)) => config.authentication(AuthMethod::sql_server(user, password)),
        None => integrated_auth(&mut config)?,
    }
    config.trust_cert();

    Ok((config, named_instance))
}

#[cfg(windows)]
fn integrated_auth(config: &mut Config) -> DbResult<()> {
    config.authentication(AuthMethod::Integrated);
    Ok(())
}

#[cfg(not(windows))]
fn integrated_auth(_config: &mut Config) -> DbResult<()> {
    Err(DbError::Connection(
        "integrated authentication is only available on Windows; enter a username and password"
            .to_string(),
    ))
}

async fn open_client(config: Config, named_instance: bool, database: &str) -> DbResult<MssqlClient> {
    let tcp = connect_tcp(&config, named_instance).await?;
    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        // Azure SQL may redirect the login to another gateway.
        Err(tiberius::error::Error::Routing { host, port }) => {
            let mut routed = config;
            routed.host(&host);
            routed.port(port);
            let tcp = connect_tcp(&routed, false).await?;
            Client::connect(routed, tcp.compat_write())
                .await
                .map_err(|e| classify_login_error(e, database))
        }
        Err(e) => Err(classify_login_error(e, database)),
    }
}

async fn connect_tcp(config: &Config, named_instance: bool) -> DbResult<TcpStream> {
    let tcp = if named_instance {
        TcpStream::connect_named(config)
            .await
            .map_err(|e| DbError::Connection(format!("SQL Browser lookup failed: {}", e)))?
    } else {
        TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| DbError::Connection(format!("failed to reach {}: {}", config.get_addr(), e)))?
    };
    tcp.set_nodelay(true).ok();
    Ok(tcp)
}

fn classify_login_error(err: tiberius::error::Error, database: &str) -> DbError {
    match &err {
        tiberius::error::Error::Server(token) if token.code() == LOGIN_FAILED => {
            DbError::Authentication(token.message().to_string())
        }
        tiberius::error::Error::Server(token) if token.code() == CANNOT_OPEN_DATABASE => {
            DbError::DatabaseNotFound(database.to_string())
        }
        _ => DbError::Connection(err.to_string()),
    }
}

const COMMIT: &str = "IF @@TRANCOUNT > 0 COMMIT TRANSACTION";
const ROLLBACK: &str = "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION";

async fn run_batch(client: &mut MssqlClient, sql: &str) -> DbResult<()> {
    client.simple_query(sql).await?.into_results().await?;
    Ok(())
}

/// Roll back when `outcome` failed, keeping the original error.
async fn finish<T>(client: &mut MssqlClient, outcome: DbResult<T>) -> DbResult<T> {
    if outcome.is_err() {
        if let Err(rollback_err) = run_batch(client, ROLLBACK).await {
            tracing::warn!(error = %rollback_err, "rollback after failed statement also failed");
        }
    }
    outcome
}

fn bind<'a>(sql: &'a str, params: &'a [SqlValue]) -> Query<'a> {
    let mut query = Query::new(sql);
    for param in params {
        match param {
            SqlValue::Null => query.bind(Option::<String>::None),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.as_str()),
        }
    }
    query
}

#[async_trait]
impl DatabaseDriver for MssqlDriver {
    async fn query(&self, sql: &str, params: &[SqlValue]) -> DbResult<QueryResult> {
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or(DbError::NoActiveConnection)?;

        let mut stream = bind(sql, params).query(client).await?;
        let columns: Vec<String> = stream
            .columns()
            .await?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows = stream.into_first_result().await?;

        let rows = rows
            .iter()
            .map(|row| {
                row.cells()
                    .enumerate()
                    .map(|(i, (_, data))| map_mssql_value(row, i, data))
                    .collect()
            })
            .collect();

        Ok(QueryResult { columns, rows })
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> DbResult<u64> {
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or(DbError::NoActiveConnection)?;
        Ok(bind(sql, params).execute(client).await?.total())
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or(DbError::NoActiveConnection)?;
        run_batch(client, sql).await
    }

    async fn commit(&self) -> DbResult<()> {
        self.execute_batch(COMMIT).await
    }

    async fn rollback(&self) -> DbResult<()> {
        self.execute_batch(ROLLBACK).await
    }

    // The lock is held from the write to its commit or rollback so that the
    // alert watcher cannot interleave with a pending transaction.
    async fn execute_committed(&self, sql: &str, params: &[SqlValue]) -> DbResult<u64> {
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or(DbError::NoActiveConnection)?;
        let outcome = match bind(sql, params).execute(&mut *client).await {
            Ok(result) => run_batch(client, COMMIT).await.map(|_| result.total()),
            Err(e) => Err(e.into()),
        };
        finish(client, outcome).await
    }

    async fn execute_batch_committed(&self, sql: &str) -> DbResult<()> {
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or(DbError::NoActiveConnection)?;
        let outcome = match run_batch(client, sql).await {
            Ok(()) => run_batch(client, COMMIT).await,
            Err(e) => Err(e),
        };
        finish(client, outcome).await
    }

    async fn ping(&self) -> DbResult<()> {
        self.query("SELECT 1", &[]).await.map(|_| ())
    }

    async fn close(&self) -> DbResult<()> {
        let client = self.client.lock().await.take();
        if let Some(client) = client {
            client.close().await?;
        }
        Ok(())
    }
}

fn map_mssql_value(row: &tiberius::Row, index: usize, data: &ColumnData<'_>) -> serde_json::Value {
    use serde_json::Value;

    match data {
        ColumnData::Bit(Some(b)) => Value::Bool(*b),
        ColumnData::U8(Some(v)) => serde_json::json!(*v as i64),
        ColumnData::I16(Some(v)) => serde_json::json!(*v as i64),
        ColumnData::I32(Some(v)) => serde_json::json!(*v as i64),
        ColumnData::I64(Some(v)) => serde_json::json!(*v),
        ColumnData::F32(Some(v)) => serde_json::json!(*v as f64),
        ColumnData::F64(Some(v)) => serde_json::json!(*v),
        ColumnData::Numeric(Some(n)) => {
            serde_json::json!(n.value() as f64 / 10f64.powi(n.scale() as i32))
        }
        ColumnData::String(Some(s)) => Value::String(s.to_string()),
        ColumnData::Guid(Some(g)) => Value::String(g.to_string()),
        ColumnData::Xml(Some(xml)) => Value::String(xml.to_string()),
        ColumnData::Binary(Some(bytes)) => {
            let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
            Value::String(format!("0x{}", hex))
        }
        ColumnData::DateTime(Some(_))
        | ColumnData::SmallDateTime(Some(_))
        | ColumnData::DateTime2(Some(_)) => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .ok()
            .flatten()
            .map(|dt| Value::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(Value::Null),
        ColumnData::DateTimeOffset(Some(_)) => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(index)
            .ok()
            .flatten()
            .map(|dt| Value::String(dt.to_rfc3339()))
            .unwrap_or(Value::Null),
        ColumnData::Date(Some(_)) => row
            .try_get::<chrono::NaiveDate, _>(index)
            .ok()
            .flatten()
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Time(Some(_)) => row
            .try_get::<chrono::NaiveTime, _>(index)
            .ok()
            .flatten()
            .map(|t| Value::String(t.format("%H:%M:%S").to_string()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}
