//! # Bulkguard
//!
//! Temp-table staged bulk insert, update, delete and insert-or-update for SQL
//! Server style databases.
//!
//! Records are bulk loaded into a session temp table through the native
//! bulk-copy transport, then applied to the target table with one set-based
//! `MERGE` or `INSERT` statement. Column types come from the target's catalog,
//! predicates compile to parameterized guards, and database-generated identity
//! values can be written back onto the records.
//!
//! The database itself sits behind the traits in [`executor`]; a driver crate
//! implements them for its connection type.

// Lets `#[derive(BulkRecord)]` output name `::bulkguard` inside this crate's own tests
extern crate self as bulkguard;

pub mod column_set;
pub mod config;
pub mod error;
pub mod executor;
pub mod identity;
pub mod index;
pub mod metrics;
pub mod operation;
pub mod plan;
pub mod predicate;
pub mod record;
pub mod schema;
pub mod settings;
pub mod statement;
pub mod table;
pub mod value;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use bulkguard_derive::BulkRecord;
pub use sea_query;

pub use column_set::{ColumnSet, CustomColumnMapping};
pub use config::BulkguardConfig;
pub use error::{BulkError, ConfigError};
pub use executor::{
    AsyncBulkConnection, AsyncBulkExecutor, AsyncConnector, BulkConnection, BulkExecutor, Connector,
    TransactionScope,
};
pub use identity::ColumnDirection;
pub use operation::{
    BulkDelete, BulkInsert, BulkInsertOrUpdate, BulkOperations, BulkUpdate, CollectionSetup, TableSetup,
};
pub use predicate::{Comparison, Condition, SqlParameter};
pub use record::{BulkRecord, FieldDescriptor, FieldKind, SetValueError};
pub use schema::{CatalogColumn, TableRef, TableSchema};
pub use settings::{BulkCopyOption, BulkCopySettings};
pub use statement::OperationKind;
pub use table::{ColumnMapping, DataColumn, DataTable};
pub use value::{SqlDbType, ValueType};
