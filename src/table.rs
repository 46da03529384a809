//! In-memory row buffer handed to the bulk transport

use crate::column_set::{ResolvedColumn, INTERNAL_ID};
use crate::error::BulkError;
use crate::record::BulkRecord;
use crate::statement::OperationKind;
use crate::value::SqlDbType;
use sea_query::Value;

/// A column of a `DataTable`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataColumn {
    /// Source record field, `None` for the row-sequence column
    pub field: Option<&'static str>,
    /// Destination column name
    pub name: String,
    pub sql_type: SqlDbType,
    pub nullable: bool,
}

/// Source-to-destination column pairing for the bulk transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub source: String,
    pub destination: String,
}

/// Rows staged for one bulk load
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    pub columns: Vec<DataColumn>,
    pub rows: Vec<Vec<Value>>,
}

impl DataTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// One-to-one name mappings, one per column
    pub fn column_mappings(&self) -> Vec<ColumnMapping> {
        self.columns
            .iter()
            .map(|c| ColumnMapping {
                source: c.name.clone(),
                destination: c.name.clone(),
            })
            .collect()
    }

    /// All values of a column, in row order
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|row| row.get(index)).collect())
    }
}

/// Read `records` into a `DataTable` with one column per resolved column.
///
/// With `with_sequence`, an `[InternalId] int` column holding each record's
/// position in `records` is appended last.
pub fn materialize<R: BulkRecord>(
    records: &[R],
    columns: &[ResolvedColumn],
    with_sequence: bool,
    operation: OperationKind,
) -> Result<DataTable, BulkError> {
    let mut table = DataTable {
        columns: columns
            .iter()
            .map(|c| DataColumn {
                field: Some(c.field),
                name: c.column.clone(),
                sql_type: c.sql_type,
                nullable: c.nullable,
            })
            .collect(),
        rows: Vec::with_capacity(records.len()),
    };
    if with_sequence {
        table.columns.push(DataColumn {
            field: None,
            name: INTERNAL_ID.to_string(),
            sql_type: SqlDbType::Int,
            nullable: false,
        });
    }

    for (ordinal, record) in records.iter().enumerate() {
        let mut row = Vec::with_capacity(table.columns.len());
        for column in columns {
            let value = record.get_value(column.field).ok_or_else(|| BulkError::Mapping {
                column: column.column.clone(),
                operation,
                message: format!(
                    "field '{}' of {} could not be read",
                    column.field,
                    R::record_name()
                ),
            })?;
            row.push(value);
        }
        if with_sequence {
            let sequence = i32::try_from(ordinal).map_err(|_| {
                BulkError::Other(format!(
                    "row {ordinal} exceeds the range of the {INTERNAL_ID} column"
                ))
            })?;
            row.push(Value::Int(Some(sequence)));
        }
        table.rows.push(row);
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_set::{ColumnSet, CustomColumnMapping};
    use crate::BulkRecord;

    #[derive(BulkRecord, Default)]
    #[rename_all = "PascalCase"]
    struct Book {
        id: i32,
        title: String,
        description: Option<String>,
    }

    fn columns() -> Vec<ResolvedColumn> {
        let mut set = ColumnSet::new();
        set.add::<Book>("title").unwrap();
        set.add::<Book>("description").unwrap();
        set.resolve::<Book>(&CustomColumnMapping::new()).unwrap()
    }

    fn books() -> Vec<Book> {
        vec![
            Book {
                id: 1,
                title: "Dune".into(),
                description: None,
            },
            Book {
                id: 2,
                title: "Emma".into(),
                description: Some("novel".into()),
            },
        ]
    }

    #[test]
    fn test_materialize_follows_column_order() {
        let table = materialize(&books(), &columns(), false, OperationKind::Insert).unwrap();
        let names: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Title", "Description"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows[0], vec![Value::String(Some("Dune".into())), Value::String(None)]);
        assert!(table.columns[1].nullable);
    }

    #[test]
    fn test_materialize_with_sequence() {
        let table = materialize(&books(), &columns(), true, OperationKind::Update).unwrap();
        assert_eq!(table.columns.last().unwrap().name, "InternalId");
        assert_eq!(
            table.column_values("InternalId").unwrap(),
            vec![&Value::Int(Some(0)), &Value::Int(Some(1))]
        );
    }

    #[test]
    fn test_column_mappings_are_one_to_one() {
        let table = materialize(&books(), &columns(), true, OperationKind::Update).unwrap();
        let mappings = table.column_mappings();
        assert_eq!(mappings.len(), 3);
        assert!(mappings.iter().all(|m| m.source == m.destination));
    }

    #[test]
    fn test_unreadable_column_is_mapping_error() {
        let bogus = vec![ResolvedColumn {
            field: "isbn",
            column: "Isbn".into(),
            sql_type: SqlDbType::NVarChar,
            nullable: false,
        }];
        let err = materialize(&books(), &bogus, false, OperationKind::Insert).unwrap_err();
        assert!(matches!(err, BulkError::Mapping { ref column, .. } if column == "Isbn"));
    }

    #[test]
    fn test_empty_input() {
        let table = materialize::<Book>(&[], &columns(), false, OperationKind::Insert).unwrap();
        assert_eq!(table.row_count(), 0);
        assert_eq!(table.columns.len(), 2);
    }
}
