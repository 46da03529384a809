//! Database seam
//!
//! Bulk operations talk to the database through these traits only. A driver
//! crate implements `BulkExecutor` (statements, queries and the bulk-copy
//! transport) and `BulkConnection` (transaction control) for its connection
//! type, and `Connector` to open one from a connection string. The async
//! twins mirror them one to one for drivers built on an async runtime.
//!
//! `TransactionScope` decides who owns the transaction: an operation either
//! opens and finishes its own (`commit` / `commit_async`) or runs inside one
//! the caller already holds (`commit_in`).

use crate::error::{BulkError, ConfigError, IDENTITY_INSERT_ERROR};
use crate::predicate::SqlParameter;
use crate::schema::{catalog_query, TableRef, TableSchema};
use crate::settings::BulkCopySettings;
use crate::table::{ColumnMapping, DataTable};
use async_trait::async_trait;
use sea_query::Value;
use std::time::Duration;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// A result row, one value per selected column
pub type Row = Vec<Value>;

/// Trait for executing statements and bulk loads on one connection
///
/// # Examples
///
/// ```no_run
/// use bulkguard::executor::BulkExecutor;
/// use bulkguard::schema::TableRef;
/// # fn example(conn: &mut impl BulkExecutor) -> Result<(), bulkguard::BulkError> {
/// let schema = conn.table_columns(&TableRef::new("dbo", "Books"))?;
/// println!("{} columns", schema.columns.len());
/// # Ok(())
/// # }
/// ```
pub trait BulkExecutor {
    /// Execute a statement and return the number of rows affected
    fn execute(&mut self, sql: &str, params: &[SqlParameter]) -> Result<u64, BulkError>;

    /// Execute a query and return every row
    fn query_all(&mut self, sql: &str, params: &[SqlParameter]) -> Result<Vec<Row>, BulkError>;

    /// Stream `table` into `destination` through the native bulk-copy protocol.
    ///
    /// Columns are matched by the explicit `mappings`, never by position.
    /// Returns the number of rows copied.
    fn bulk_load(
        &mut self,
        destination: &str,
        table: &DataTable,
        mappings: &[ColumnMapping],
        settings: &BulkCopySettings,
    ) -> Result<u64, BulkError>;

    /// Timeout applied to subsequent statements
    fn set_command_timeout(&mut self, _timeout: Duration) {}

    /// Read the target table's column metadata from the catalog
    fn table_columns(&mut self, table: &TableRef) -> Result<TableSchema, BulkError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::catalog_span(&table.qualified()).entered();

        let (sql, params) = catalog_query(table);
        let rows = self.query_all(&sql, &params)?;
        TableSchema::from_rows(table.clone(), &rows)
    }
}

/// A connection with transaction control
pub trait BulkConnection: BulkExecutor {
    fn begin(&mut self) -> Result<(), BulkError>;
    fn commit(&mut self) -> Result<(), BulkError>;
    fn rollback(&mut self) -> Result<(), BulkError>;
}

/// Opens connections from a connection string
pub trait Connector {
    type Connection: BulkConnection;

    fn connect(&self, connection_string: &str) -> Result<Self::Connection, BulkError>;
}

/// Async twin of `BulkExecutor`
#[async_trait]
pub trait AsyncBulkExecutor: Send {
    async fn execute(&mut self, sql: &str, params: &[SqlParameter]) -> Result<u64, BulkError>;

    async fn query_all(&mut self, sql: &str, params: &[SqlParameter]) -> Result<Vec<Row>, BulkError>;

    async fn bulk_load(
        &mut self,
        destination: &str,
        table: &DataTable,
        mappings: &[ColumnMapping],
        settings: &BulkCopySettings,
    ) -> Result<u64, BulkError>;

    fn set_command_timeout(&mut self, _timeout: Duration) {}

    async fn table_columns(&mut self, table: &TableRef) -> Result<TableSchema, BulkError> {
        let (sql, params) = catalog_query(table);
        let rows = self.query_all(&sql, &params).await?;
        TableSchema::from_rows(table.clone(), &rows)
    }
}

/// Async twin of `BulkConnection`
#[async_trait]
pub trait AsyncBulkConnection: AsyncBulkExecutor {
    async fn begin(&mut self) -> Result<(), BulkError>;
    async fn commit(&mut self) -> Result<(), BulkError>;
    async fn rollback(&mut self) -> Result<(), BulkError>;
}

/// Async twin of `Connector`
#[async_trait]
pub trait AsyncConnector: Sync {
    type Connection: AsyncBulkConnection;

    async fn connect(&self, connection_string: &str) -> Result<Self::Connection, BulkError>;
}

/// Map well-known server errors to the error kinds callers act on
pub fn translate_sql_error(err: BulkError) -> BulkError {
    match err {
        BulkError::Database {
            code: Some(IDENTITY_INSERT_ERROR),
            message,
        } => BulkError::Identity {
            message: format!(
                "{message}. The identity column is being written explicitly; \
                 designate it with set_identity_column so it is excluded from the statement, \
                 or use BulkCopyOption::KeepIdentity to preserve source identity values"
            ),
        },
        other => other,
    }
}

/// Who owns the transaction an operation runs in
pub enum TransactionScope<'c, C> {
    /// The operation opened the connection and owns its transaction
    Owned(C),
    /// The caller's connection and transaction; never begun, committed or rolled back here
    Enlisted(&'c mut C),
}

impl<'c, C> TransactionScope<'c, C> {
    pub fn connection(&mut self) -> &mut C {
        match self {
            TransactionScope::Owned(conn) => conn,
            TransactionScope::Enlisted(conn) => conn,
        }
    }

    pub fn owns_transaction(&self) -> bool {
        matches!(self, TransactionScope::Owned(_))
    }
}

/// Check a connection string before handing it to a connector
pub fn require_connection_string(url: &str) -> Result<&str, ConfigError> {
    if url.trim().is_empty() {
        Err(ConfigError::EmptyConnectionString)
    } else {
        Ok(url)
    }
}

impl<'c, C: BulkConnection> TransactionScope<'c, C> {
    /// Open a connection and its transaction
    pub fn open<K>(connector: &K, url: &str) -> Result<TransactionScope<'c, C>, BulkError>
    where
        K: Connector<Connection = C>,
    {
        let url = require_connection_string(url)?;
        let mut conn = connector.connect(url)?;
        {
            #[cfg(feature = "tracing")]
            let _span = tracing_helpers::begin_transaction_span().entered();
            conn.begin()?;
        }
        Ok(TransactionScope::Owned(conn))
    }

    /// Commit on success and roll back on failure when the transaction is owned.
    ///
    /// A failed rollback is logged; the original error is returned.
    pub fn finish<T>(self, result: Result<T, BulkError>) -> Result<T, BulkError> {
        let TransactionScope::Owned(mut conn) = self else {
            return result;
        };
        match result {
            Ok(value) => {
                #[cfg(feature = "tracing")]
                let _span = tracing_helpers::commit_transaction_span().entered();
                conn.commit()
                    .map_err(|e| BulkError::Transaction(format!("commit failed: {e}")))?;
                Ok(value)
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                let _span = tracing_helpers::rollback_transaction_span().entered();
                log::warn!("rolling back bulk operation: {err}");
                if let Err(rollback_err) = conn.rollback() {
                    log::error!("rollback failed after '{err}': {rollback_err}");
                }
                Err(err)
            }
        }
    }
}

impl<'c, C: AsyncBulkConnection> TransactionScope<'c, C> {
    /// Async twin of `open`
    pub async fn open_async<K>(
        connector: &K,
        url: &str,
    ) -> Result<TransactionScope<'c, C>, BulkError>
    where
        K: AsyncConnector<Connection = C>,
    {
        let url = require_connection_string(url)?;
        let mut conn = connector.connect(url).await?;
        conn.begin().await?;
        Ok(TransactionScope::Owned(conn))
    }

    /// Async twin of `finish`
    pub async fn finish_async<T>(self, result: Result<T, BulkError>) -> Result<T, BulkError> {
        let TransactionScope::Owned(mut conn) = self else {
            return result;
        };
        match result {
            Ok(value) => {
                conn.commit()
                    .await
                    .map_err(|e| BulkError::Transaction(format!("commit failed: {e}")))?;
                Ok(value)
            }
            Err(err) => {
                log::warn!("rolling back bulk operation: {err}");
                if let Err(rollback_err) = conn.rollback().await {
                    log::error!("rollback failed after '{err}': {rollback_err}");
                }
                Err(err)
            }
        }
    }
}
