/// Errors surfaced by the data-access layer.
///
/// Every gateway function returns [`DbResult`]; the command layer renders the
/// `Display` text verbatim in an error dialog, so messages are written for the
/// person sitting in front of the form rather than for a log file.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Network, driver, or TLS failure while talking to the server.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server rejected the login.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The server is reachable but the named database does not exist (or the
    /// login may not open it).
    #[error("Database '{0}' not found or not accessible")]
    DatabaseNotFound(String),

    /// An operation was attempted before `connect` succeeded, or after `close`.
    #[error("No active database connection")]
    NoActiveConnection,

    /// The server rejected or failed to run a statement.
    #[error("SQL error: {0}")]
    SqlExecution(String),

    /// Zero rows were affected by an update/delete, or a point lookup found nothing.
    #[error("Record with {key}={id} not found")]
    RecordNotFound { key: String, id: String },

    /// Input failed validation before any SQL was sent.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Every field of an insert form was empty.
    #[error("No data to insert: every field is empty")]
    EmptyInsert,

    /// Every field of an update form was empty.
    #[error("No fields to update")]
    NoFieldsToUpdate,

    #[error("File '{0}' not found")]
    FileNotFound(String),

    /// One or more batches of a script failed. Successful batches stay committed.
    #[error("{failed} of {total} batches failed:\n{}", messages.join("\n"))]
    ScriptFailed {
        total: usize,
        failed: usize,
        messages: Vec<String>,
    },

    #[error("Trigger '{0}' not found")]
    TriggerNotFound(String),

    #[error("Missing triggers: {}", .0.join(", "))]
    TriggersMissing(Vec<String>),

    #[error("View '{0}' not found")]
    ViewNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tiberius::error::Error> for DbError {
    fn from(err: tiberius::error::Error) -> Self {
        match err {
            tiberius::error::Error::Server(token) => DbError::SqlExecution(token.message().to_string()),
            tiberius::error::Error::Io { .. } | tiberius::error::Error::Tls(_) => {
                DbError::Connection(err.to_string())
            }
            other => DbError::SqlExecution(other.to_string()),
        }
    }
}

/// Convenience `Result` alias for data-access operations.
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Collapse a gateway result into the `(payload | message)` shape the UI renders.
pub fn into_ui<T>(result: DbResult<T>) -> Result<T, String> {
    result.map_err(|e| e.to_string())
}
