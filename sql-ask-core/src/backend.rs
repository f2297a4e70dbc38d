pub mod postgres;
pub mod sqlite;

use std::{error::Error, fmt::Display, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{executor::ResultSet, schema::ForeignKeyEdge};

pub use postgres::PostgresBackend;
pub use sqlite::SqliteBackend;

#[derive(Debug, Clone)]
pub enum DbError {
    UnsupportedUrl { scheme: String },
    Connection { message: String },
    Query { message: String },
    Timeout { seconds: u64 },
}

impl Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbError::UnsupportedUrl { scheme } => {
                write!(f, "Unsupported database url scheme '{scheme}'")
            }
            DbError::Connection { message } => write!(f, "Database connection failed: {message}"),
            DbError::Query { message } => write!(f, "{message}"),
            DbError::Timeout { seconds } => {
                write!(f, "Database operation timed out after {seconds}s")
            }
        }
    }
}

impl Error for DbError {}

impl From<sqlx::Error> for DbError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(err) => DbError::Query {
                message: err.message().to_owned(),
            },
            sqlx::Error::Configuration(_)
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => DbError::Connection {
                message: value.to_string(),
            },
            other => DbError::Query {
                message: other.to_string(),
            },
        }
    }
}

impl DbError {
    pub fn is_connection(&self) -> bool {
        matches!(self, DbError::Connection { .. } | DbError::UnsupportedUrl { .. })
    }
}

/// Column metadata as reported by the database, before primary-key
/// membership is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

/// The capabilities the rest of the crate needs from a database.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    /// Owner/schema used when none is configured.
    fn default_owner(&self) -> &str;

    async fn ping(&self) -> Result<(), DbError>;

    async fn list_tables(&self, owner: &str) -> Result<Vec<String>, DbError>;

    async fn columns(&self, owner: &str, table: &str) -> Result<Vec<RawColumn>, DbError>;

    async fn primary_key(&self, owner: &str, table: &str) -> Result<Vec<String>, DbError>;

    async fn foreign_keys(&self, owner: &str, table: &str)
    -> Result<Vec<ForeignKeyEdge>, DbError>;

    /// Runs a read statement and materialises every row.
    async fn fetch(&self, sql: &str) -> Result<ResultSet, DbError>;

    /// Runs a write statement in a transaction and returns the affected row
    /// count. Nothing is committed when the statement fails.
    async fn execute(&self, sql: &str) -> Result<u64, DbError>;
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions {
    pub timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

/// Opens the backend matching the url scheme.
pub async fn connect(url: &str, options: ConnectOptions) -> Result<Arc<dyn Backend>, DbError> {
    let scheme = url.split(':').next().unwrap_or_default();
    match scheme {
        "sqlite" => Ok(Arc::new(SqliteBackend::connect(url, options).await?)),
        "postgres" | "postgresql" => Ok(Arc::new(PostgresBackend::connect(url, options).await?)),
        _ => Err(DbError::UnsupportedUrl {
            scheme: scheme.to_owned(),
        }),
    }
}

pub(crate) async fn bounded<T>(
    timeout: Duration,
    operation: impl Future<Output = Result<T, sqlx::Error>>,
) -> Result<T, DbError> {
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(DbError::Timeout {
            seconds: timeout.as_secs(),
        }),
    }
}
