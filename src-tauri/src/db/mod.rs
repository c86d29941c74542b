use async_trait::async_trait;
use crate::error::DbResult;
use crate::models::{QueryResult, SqlValue};

pub mod ident;
pub mod mssql;
#[cfg(test)]
pub(crate) mod testing;

/// The live connection every gateway call runs against.
///
/// Statements use `@P1`, `@P2`, ... placeholders; `params` are bound in order.
/// Implicit transactions are on, so nothing is durable until [`commit`](Self::commit).
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Run a statement that returns rows. Only the first result set is kept.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> DbResult<QueryResult>;
    /// Run a statement and return the number of affected rows.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> DbResult<u64>;
    /// Send raw text as a single batch, without parameter binding.
    async fn execute_batch(&self, sql: &str) -> DbResult<()>;
    async fn commit(&self) -> DbResult<()>;
    async fn rollback(&self) -> DbResult<()>;
    async fn ping(&self) -> DbResult<()>;
    async fn close(&self) -> DbResult<()>;

    /// Run one mutation as its own transaction: commit on success, roll back on failure.
    ///
    /// Drivers shared between tasks must override this so no other statement
    /// can land between the write and its commit.
    async fn execute_committed(&self, sql: &str, params: &[SqlValue]) -> DbResult<u64> {
        match self.execute(sql, params).await {
            Ok(affected) => {
                self.commit().await?;
                Ok(affected)
            }
            Err(e) => {
                if let Err(rollback_err) = self.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback after failed statement also failed");
                }
                Err(e)
            }
        }
    }

    /// [`execute_batch`](Self::execute_batch) with the same commit/rollback contract
    /// as [`execute_committed`](Self::execute_committed).
    async fn execute_batch_committed(&self, sql: &str) -> DbResult<()> {
        let outcome = match self.execute_batch(sql).await {
            Ok(()) => self.commit().await,
            Err(e) => Err(e),
        };
        if outcome.is_err() {
            if let Err(rollback_err) = self.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback after failed batch also failed");
            }
        }
        outcome
    }
}

/// `@P1, @P2, ...` for `count` parameters starting at `first`.
pub fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|i| format!("@P{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}
