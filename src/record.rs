//! Field accessor table for bulk-loaded record types
//!
//! Bulk operations never inspect a record type at runtime. Instead,
//! `#[derive(BulkRecord)]` generates a static table of `FieldDescriptor`s and
//! two dispatch functions, `get_value` and `set_value`, keyed by field name.
//! The table is what column selection validates against, what the row
//! materializer reads through, and what identity write-back goes through.
//!
//! ```rust
//! use bulkguard::{BulkRecord, FieldKind, SqlDbType};
//!
//! #[derive(BulkRecord, Default)]
//! #[rename_all = "PascalCase"]
//! pub struct Book {
//!     pub id: i32,
//!     pub title: String,
//! }
//!
//! let id = Book::field("id").unwrap();
//! assert_eq!(id.column, "Id");
//! assert_eq!(id.kind, FieldKind::Flat(SqlDbType::Int));
//! ```

use crate::value::SqlDbType;
use sea_query::Value;
use std::fmt;

/// How a record field can be carried in a bulk-loaded column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// A flat column value of the given dialect type
    Flat(SqlDbType),
    /// A nested or collection type with no column representation
    Unsupported(&'static str),
}

impl FieldKind {
    pub fn sql_type(&self) -> Option<SqlDbType> {
        match self {
            FieldKind::Flat(ty) => Some(*ty),
            FieldKind::Unsupported(_) => None,
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, FieldKind::Flat(_))
    }
}

/// One entry of a record's accessor table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Rust field identifier
    pub name: &'static str,
    /// Default destination column name
    pub column: &'static str,
    pub kind: FieldKind,
    /// The field is an `Option<T>`
    pub nullable: bool,
    /// The field accepts `set_value`
    pub writable: bool,
}

/// Error returned by `BulkRecord::set_value`
#[derive(Debug, Clone, PartialEq)]
pub enum SetValueError {
    /// No flat field with this name
    UnknownField { field: String },
    /// The field is marked `#[read_only]`
    ReadOnly { field: String },
    /// The value cannot be converted into the field's type
    TypeMismatch { field: String, value: Value },
}

impl fmt::Display for SetValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetValueError::UnknownField { field } => {
                write!(f, "no writable field named '{field}'")
            }
            SetValueError::ReadOnly { field } => {
                write!(f, "field '{field}' is read-only")
            }
            SetValueError::TypeMismatch { field, value } => {
                write!(f, "value {value:?} cannot be assigned to field '{field}'")
            }
        }
    }
}

impl std::error::Error for SetValueError {}

/// A record type that can be staged into a bulk-loaded table
///
/// Implemented by `#[derive(BulkRecord)]`; hand-written implementations must
/// keep `fields()` stable across calls since column order follows it.
pub trait BulkRecord {
    /// Type name used in error messages
    fn record_name() -> &'static str;

    /// Descriptors for every listed field, in declaration order
    fn fields() -> &'static [FieldDescriptor];

    /// Read a flat field as a value. `None` for unknown or unsupported fields.
    fn get_value(&self, field: &str) -> Option<Value>;

    /// Write a value into a flat field
    fn set_value(&mut self, field: &str, value: Value) -> Result<(), SetValueError>;

    /// Look up a descriptor by field name
    fn field(name: &str) -> Option<&'static FieldDescriptor> {
        Self::fields().iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BulkRecord;

    #[derive(BulkRecord, Default)]
    struct Shelf {
        id: i64,
        #[column_name = "ShelfLabel"]
        label: Option<String>,
        books: Vec<String>,
    }

    #[test]
    fn test_field_lookup() {
        let label = Shelf::field("label").unwrap();
        assert_eq!(label.column, "ShelfLabel");
        assert!(label.nullable);
        assert!(label.kind.is_flat());
        assert!(Shelf::field("missing").is_none());
    }

    #[test]
    fn test_unsupported_field_kind() {
        let books = Shelf::field("books").unwrap();
        assert_eq!(books.kind, FieldKind::Unsupported("Vec<String>"));
        assert_eq!(books.kind.sql_type(), None);
        assert!(!books.writable);
    }

    #[test]
    fn test_descriptor_table_is_cached() {
        assert!(std::ptr::eq(Shelf::fields(), Shelf::fields()));
    }

    #[test]
    fn test_set_value_error_display() {
        let err = SetValueError::ReadOnly { field: "id".to_string() };
        assert_eq!(err.to_string(), "field 'id' is read-only");
    }
}
