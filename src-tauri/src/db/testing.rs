//! Recording driver used by unit tests in place of a live server.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use crate::db::DatabaseDriver;
use crate::error::{DbError, DbResult};
use crate::models::{QueryResult, SqlValue};

pub(crate) enum Reply {
    Rows(QueryResult),
    Affected(u64),
}

pub(crate) fn rows(columns: &[&str], rows: Vec<Vec<serde_json::Value>>) -> Reply {
    Reply::Rows(QueryResult {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows,
    })
}

type Responder = Box<dyn Fn(&str, &[SqlValue]) -> DbResult<Reply> + Send + Sync>;

pub(crate) struct FakeDriver {
    calls: Mutex<Vec<(String, Vec<SqlValue>)>>,
    responder: Responder,
}

impl FakeDriver {
    pub(crate) fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, &[SqlValue]) -> DbResult<Reply> + Send + Sync + 'static,
    {
        Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    /// Every call so far as `"kind: sql"`, or just `"commit"` / `"rollback"`.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub(crate) fn params(&self, index: usize) -> Vec<SqlValue> {
        self.calls.lock().unwrap()[index].1.clone()
    }

    /// Index of the first call whose text contains `needle`.
    pub(crate) fn position(&self, needle: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.contains(needle))
    }

    fn record(&self, call: String, params: &[SqlValue]) {
        self.calls.lock().unwrap().push((call, params.to_vec()));
    }
}

#[async_trait]
impl DatabaseDriver for FakeDriver {
    async fn query(&self, sql: &str, params: &[SqlValue]) -> DbResult<QueryResult> {
        self.record(format!("query: {}", sql), params);
        match (self.responder)(sql, params)? {
            Reply::Rows(result) => Ok(result),
            Reply::Affected(_) => Ok(QueryResult::default()),
        }
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> DbResult<u64> {
        self.record(format!("execute: {}", sql), params);
        match (self.responder)(sql, params)? {
            Reply::Rows(result) => Ok(result.rows.len() as u64),
            Reply::Affected(n) => Ok(n),
        }
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.record(format!("batch: {}", sql), &[]);
        (self.responder)(sql, &[]).map(|_| ())
    }

    async fn commit(&self) -> DbResult<()> {
        self.record("commit".to_string(), &[]);
        Ok(())
    }

    async fn rollback(&self) -> DbResult<()> {
        self.record("rollback".to_string(), &[]);
        Ok(())
    }

    async fn ping(&self) -> DbResult<()> {
        self.record("ping".to_string(), &[]);
        (self.responder)("SELECT 1", &[]).map(|_| ())
    }

    async fn close(&self) -> DbResult<()> {
        self.record("close".to_string(), &[]);
        Ok(())
    }
}

#[derive(Default)]
struct TxState {
    pending: Vec<String>,
    committed: Vec<String>,
}

/// Keeps uncommitted and committed writes apart, like one session with
/// implicit transactions. Every read fails as if the alert tables were missing.
pub(crate) struct TxDriver {
    session: tokio::sync::Mutex<TxState>,
    latency: Duration,
}

impl TxDriver {
    pub(crate) fn new() -> Self {
        Self {
            session: tokio::sync::Mutex::new(TxState::default()),
            latency: Duration::from_millis(50),
        }
    }

    pub(crate) async fn committed(&self) -> Vec<String> {
        self.session.lock().await.committed.clone()
    }
}

#[async_trait]
impl DatabaseDriver for TxDriver {
    async fn query(&self, _sql: &str, _params: &[SqlValue]) -> DbResult<QueryResult> {
        let _session = self.session.lock().await;
        Err(DbError::SqlExecution("Invalid object name 'Alert'.".to_string()))
    }

    async fn execute(&self, sql: &str, _params: &[SqlValue]) -> DbResult<u64> {
        self.session.lock().await.pending.push(sql.to_string());
        Ok(1)
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.execute(sql, &[]).await.map(|_| ())
    }

    async fn commit(&self) -> DbResult<()> {
        let mut session = self.session.lock().await;
        let pending = std::mem::take(&mut session.pending);
        session.committed.extend(pending);
        Ok(())
    }

    async fn rollback(&self) -> DbResult<()> {
        self.session.lock().await.pending.clear();
        Ok(())
    }

    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }

    async fn close(&self) -> DbResult<()> {
        Ok(())
    }

    async fn execute_committed(&self, sql: &str, _params: &[SqlValue]) -> DbResult<u64> {
        let mut session = self.session.lock().await;
        session.pending.push(sql.to_string());
        tokio::time::sleep(self.latency).await;
        let pending = std::mem::take(&mut session.pending);
        session.committed.extend(pending);
        Ok(1)
    }
}
