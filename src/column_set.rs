//! Column selection and destination naming
//!
//! A `ColumnSet` is the ordered list of record fields an operation stages.
//! Order is insertion order and drives the order of every column list in the
//! generated SQL. `CustomColumnMapping` renames fields to destination columns
//! when the record's own column names do not match the table.

use crate::error::ConfigError;
use crate::record::{BulkRecord, FieldDescriptor, FieldKind};
use crate::value::SqlDbType;
use std::collections::HashMap;

/// Name of the row-sequence pseudo-column
pub const INTERNAL_ID: &str = "InternalId";

/// Ordered set of unique record-field names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSet {
    fields: Vec<&'static str>,
}

/// Look up a field and check it can be staged
pub fn flat_field<R: BulkRecord>(
    field: &str,
) -> Result<(&'static FieldDescriptor, SqlDbType), ConfigError> {
    let descriptor = R::field(field).ok_or_else(|| ConfigError::InvalidColumn {
        field: field.to_string(),
        record: R::record_name(),
    })?;
    match descriptor.kind {
        FieldKind::Flat(sql_type) => Ok((descriptor, sql_type)),
        FieldKind::Unsupported(type_name) => Err(ConfigError::UnsupportedColumnType {
            field: field.to_string(),
            record: R::record_name(),
            type_name,
        }),
    }
}

impl ColumnSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a flat field. Adding a field twice keeps its first position.
    pub fn add<R: BulkRecord>(&mut self, field: &str) -> Result<(), ConfigError> {
        let (descriptor, _) = flat_field::<R>(field)?;
        self.push(descriptor.name);
        Ok(())
    }

    /// Add every flat field in declaration order, skipping unsupported ones
    pub fn add_all<R: BulkRecord>(&mut self) {
        for descriptor in R::fields().iter().filter(|f| f.kind.is_flat()) {
            self.push(descriptor.name);
        }
    }

    pub fn remove(&mut self, field: &str) -> Result<(), ConfigError> {
        match self.fields.iter().position(|f| *f == field) {
            Some(index) => {
                self.fields.remove(index);
                Ok(())
            }
            None => Err(ConfigError::ColumnNotIncluded {
                field: field.to_string(),
            }),
        }
    }

    fn push(&mut self, field: &'static str) {
        if field != INTERNAL_ID && !self.fields.contains(&field) {
            self.fields.push(field);
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|f| *f == field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Resolve every field to its destination column
    pub fn resolve<R: BulkRecord>(
        &self,
        mapping: &CustomColumnMapping,
    ) -> Result<Vec<ResolvedColumn>, ConfigError> {
        self.iter()
            .map(|field| ResolvedColumn::resolve::<R>(field, mapping))
            .collect()
    }
}

/// Record-field name to destination column overrides
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomColumnMapping {
    columns: HashMap<String, String>,
}

impl CustomColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `field` to `column`, replacing any earlier mapping of `field`
    pub fn insert(&mut self, field: impl Into<String>, column: impl Into<String>) {
        self.columns.insert(field.into(), column.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.columns.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Destination column of a field: custom mapping first, then the
    /// record's declared column name, then the field name itself
    pub fn destination<R: BulkRecord>(&self, field: &str) -> String {
        if let Some(column) = self.get(field) {
            return column.to_string();
        }
        R::field(field)
            .map(|f| f.column.to_string())
            .unwrap_or_else(|| field.to_string())
    }
}

/// A staged field with its destination column and type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    pub field: &'static str,
    pub column: String,
    pub sql_type: SqlDbType,
    pub nullable: bool,
}

impl ResolvedColumn {
    pub fn resolve<R: BulkRecord>(
        field: &str,
        mapping: &CustomColumnMapping,
    ) -> Result<Self, ConfigError> {
        let (descriptor, sql_type) = flat_field::<R>(field)?;
        Ok(Self {
            field: descriptor.name,
            column: mapping.destination::<R>(descriptor.name),
            sql_type,
            nullable: descriptor.nullable,
        })
    }
}
