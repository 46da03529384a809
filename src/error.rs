//! Error types for bulk operations
//!
//! Two layers:
//! - `ConfigError` - the operation was configured in a way that can never
//!   succeed. Raised while building or at commit, always before any round trip.
//! - `BulkError` - everything that can go wrong once commit starts talking to
//!   the database, plus `ConfigError` wrapped for a single `?` path.

use crate::statement::OperationKind;
use std::fmt;

/// SQL Server error number for "Cannot insert explicit value for identity column"
pub const IDENTITY_INSERT_ERROR: u32 = 8102;

/// Invalid operation configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The record type has no field with this name
    InvalidColumn { field: String, record: &'static str },
    /// The field exists but has no flat column representation
    UnsupportedColumnType {
        field: String,
        record: &'static str,
        type_name: &'static str,
    },
    /// `remove_column` for a field that is not in the column set
    ColumnNotIncluded { field: String },
    /// No table name was given
    MissingTableName,
    /// Update, delete and upsert need at least one match column
    MissingMatchTargetOn { operation: OperationKind },
    /// A match column must also be staged
    MatchColumnNotSelected { field: String },
    /// No column besides the identity column would be written
    NoColumnsSelected { operation: OperationKind },
    /// An identity column was already designated
    DuplicateIdentityColumn { existing: String, requested: String },
    /// Disabling all non-clustered indexes and disabling named indexes are exclusive
    ConflictingIndexHints,
    /// The predicate cannot be expressed
    InvalidPredicate { field: String, reason: String },
    /// Delete predicates only apply to `WHEN NOT MATCHED BY SOURCE`
    DeletePredicatesWithoutDeleteWhenNotMatched,
    /// No connection string was configured
    EmptyConnectionString,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidColumn { field, record } => {
                write!(f, "'{field}' is not a field of {record}")
            }
            ConfigError::UnsupportedColumnType {
                field,
                record,
                type_name,
            } => {
                write!(
                    f,
                    "field '{field}' of {record} has type {type_name}, which cannot be bulk loaded"
                )
            }
            ConfigError::ColumnNotIncluded { field } => {
                write!(f, "column '{field}' is not in the column set")
            }
            ConfigError::MissingTableName => write!(f, "no table name was configured"),
            ConfigError::MissingMatchTargetOn { operation } => {
                write!(
                    f,
                    "{operation} requires at least one match column, call match_target_on"
                )
            }
            ConfigError::MatchColumnNotSelected { field } => {
                write!(
                    f,
                    "match column '{field}' must also be in the column set"
                )
            }
            ConfigError::NoColumnsSelected { operation } => {
                write!(
                    f,
                    "{operation} has no columns to write, call with_column or add_all_columns"
                )
            }
            ConfigError::DuplicateIdentityColumn {
                existing,
                requested,
            } => {
                write!(
                    f,
                    "identity column already set to '{existing}', cannot also use '{requested}'"
                )
            }
            ConfigError::ConflictingIndexHints => {
                write!(
                    f,
                    "cannot disable all non-clustered indexes and a named index list at the same time"
                )
            }
            ConfigError::InvalidPredicate { field, reason } => {
                write!(f, "invalid predicate on '{field}': {reason}")
            }
            ConfigError::DeletePredicatesWithoutDeleteWhenNotMatched => {
                write!(
                    f,
                    "delete_when requires delete_when_not_matched(true)"
                )
            }
            ConfigError::EmptyConnectionString => {
                write!(f, "connection string is empty")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Bulk operation error type
#[derive(Debug)]
pub enum BulkError {
    /// Invalid configuration, detected before any round trip
    Config(ConfigError),
    /// The catalog returned no columns for the table
    TableNotFound { table: String },
    /// A staged column does not exist on the target table
    ColumnNotInTable { column: String, table: String },
    /// The database refused to write an identity column
    Identity { message: String },
    /// A value could not be read from or written back into a record
    Mapping {
        column: String,
        operation: OperationKind,
        message: String,
    },
    /// Error reported by the database
    Database { code: Option<u32>, message: String },
    /// Begin, commit or rollback failed
    Transaction(String),
    /// Other execution errors
    Other(String),
}

impl fmt::Display for BulkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkError::Config(e) => write!(f, "Configuration error: {e}"),
            BulkError::TableNotFound { table } => {
                write!(f, "Table not found: {table} has no columns in the catalog")
            }
            BulkError::ColumnNotInTable { column, table } => {
                write!(f, "Column [{column}] does not exist on {table}")
            }
            BulkError::Identity { message } => write!(f, "Identity error: {message}"),
            BulkError::Mapping {
                column,
                operation,
                message,
            } => {
                write!(f, "Mapping error on column '{column}' during {operation}: {message}")
            }
            BulkError::Database {
                code: Some(code),
                message,
            } => write!(f, "Database error {code}: {message}"),
            BulkError::Database { code: None, message } => {
                write!(f, "Database error: {message}")
            }
            BulkError::Transaction(s) => write!(f, "Transaction error: {s}"),
            BulkError::Other(s) => write!(f, "Execution error: {s}"),
        }
    }
}

impl std::error::Error for BulkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BulkError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for BulkError {
    fn from(err: ConfigError) -> Self {
        BulkError::Config(err)
    }
}

impl BulkError {
    /// The database error number, if the error came from the server
    pub fn sql_error_code(&self) -> Option<u32> {
        match self {
            BulkError::Database { code, .. } => *code,
            _ => None,
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, BulkError::Config(_))
    }
}
