//! Target table metadata and temp table DDL
//!
//! The temp table must carry the target's real column types, otherwise the
//! MERGE would compare and assign through implicit conversions. Types are read
//! from `INFORMATION_SCHEMA.COLUMNS` on every commit and rendered back into
//! column declarations with their length, precision and scale qualifiers.

use crate::column_set::INTERNAL_ID;
use crate::error::BulkError;
use crate::predicate::SqlParameter;
use crate::value::SqlDbType;
use sea_query::Value;
use std::fmt;

/// Staging table every update, delete, upsert and round-tripping insert loads into
pub const TMP_TABLE: &str = "#TmpTable";

/// Bracket-quote an identifier, escaping `]`
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Escape a value for use inside a single-quoted SQL string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// A possibly database-qualified `schema.table` name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub database: Option<String>,
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub const DEFAULT_SCHEMA: &'static str = "dbo";

    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: None,
            schema: schema.into(),
            table: table.into(),
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// `[db].[schema].[table]` or `[schema].[table]`
    pub fn qualified(&self) -> String {
        match &self.database {
            Some(db) => format!(
                "{}.{}.{}",
                quote_identifier(db),
                quote_identifier(&self.schema),
                quote_identifier(&self.table)
            ),
            None => format!(
                "{}.{}",
                quote_identifier(&self.schema),
                quote_identifier(&self.table)
            ),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

/// One row of `INFORMATION_SCHEMA.COLUMNS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    pub name: String,
    pub data_type: String,
    /// `CHARACTER_MAXIMUM_LENGTH`, -1 for `max`
    pub max_length: Option<i32>,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
    pub datetime_precision: Option<i32>,
    pub is_nullable: bool,
}

impl CatalogColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            max_length: None,
            numeric_precision: None,
            numeric_scale: None,
            datetime_precision: None,
            is_nullable: true,
        }
    }

    pub fn with_max_length(mut self, length: i32) -> Self {
        self.max_length = Some(length);
        self
    }

    pub fn with_precision(mut self, precision: i32, scale: i32) -> Self {
        self.numeric_precision = Some(precision);
        self.numeric_scale = Some(scale);
        self
    }

    pub fn with_datetime_precision(mut self, precision: i32) -> Self {
        self.datetime_precision = Some(precision);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    pub fn sql_type(&self) -> Option<SqlDbType> {
        SqlDbType::from_catalog(&self.data_type)
    }

    /// Column type as written in a `CREATE TABLE` column declaration
    pub fn type_declaration(&self) -> String {
        let data_type = self.data_type.to_ascii_lowercase();
        match self.sql_type() {
            Some(
                SqlDbType::VarChar
                | SqlDbType::NVarChar
                | SqlDbType::VarBinary
                | SqlDbType::Char
                | SqlDbType::NChar
                | SqlDbType::Binary,
            ) => match self.max_length {
                Some(-1) => format!("{data_type}(max)"),
                Some(len) => format!("{data_type}({len})"),
                None => data_type,
            },
            Some(SqlDbType::Decimal | SqlDbType::Numeric) => {
                match (self.numeric_precision, self.numeric_scale) {
                    (Some(p), Some(s)) => format!("{data_type}({p}, {s})"),
                    _ => data_type,
                }
            }
            Some(SqlDbType::DateTime2 | SqlDbType::Time | SqlDbType::DateTimeOffset) => {
                match self.datetime_precision {
                    Some(p) => format!("{data_type}({p})"),
                    None => data_type,
                }
            }
            _ => data_type,
        }
    }

    /// Build from a catalog row in `catalog_query` column order
    pub fn from_row(row: &[Value]) -> Result<Self, BulkError> {
        let text = |index: usize| -> Result<String, BulkError> {
            match row.get(index) {
                Some(Value::String(Some(s))) => Ok(s.clone()),
                other => Err(BulkError::Other(format!(
                    "unexpected catalog value {other:?} at position {index}"
                ))),
            }
        };
        let number = |index: usize| -> Option<i32> {
            row.get(index)
                .cloned()
                .and_then(<i32 as crate::value::ValueType>::from_value)
        };
        Ok(Self {
            name: text(0)?,
            data_type: text(1)?,
            max_length: number(2),
            numeric_precision: number(3),
            numeric_scale: number(4),
            datetime_precision: number(5),
            is_nullable: text(6)?.eq_ignore_ascii_case("YES"),
        })
    }
}

/// Column metadata of a target table, in ordinal order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: TableRef,
    pub columns: Vec<CatalogColumn>,
}

impl TableSchema {
    /// Fails with `TableNotFound` when the catalog returned nothing
    pub fn new(table: TableRef, columns: Vec<CatalogColumn>) -> Result<Self, BulkError> {
        if columns.is_empty() {
            return Err(BulkError::TableNotFound {
                table: table.qualified(),
            });
        }
        Ok(Self { table, columns })
    }

    pub fn from_rows(table: TableRef, rows: &[Vec<Value>]) -> Result<Self, BulkError> {
        let columns = rows
            .iter()
            .map(|row| CatalogColumn::from_row(row))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(table, columns)
    }

    /// Catalog lookup; identifiers compare case-insensitively like the server's default collation
    pub fn column(&self, name: &str) -> Option<&CatalogColumn> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Like `column`, failing with `ColumnNotInTable`
    pub fn require(&self, name: &str) -> Result<&CatalogColumn, BulkError> {
        self.column(name).ok_or_else(|| BulkError::ColumnNotInTable {
            column: name.to_string(),
            table: self.table.qualified(),
        })
    }

    /// `CREATE TABLE #TmpTable(...)` for the given destination columns
    pub fn create_temp_table_cmd(
        &self,
        columns: &[String],
        with_sequence: bool,
    ) -> Result<String, BulkError> {
        let mut declarations = Vec::with_capacity(columns.len() + 1);
        for name in columns {
            let column = self.require(name)?;
            declarations.push(format!(
                "{} {}",
                quote_identifier(name),
                column.type_declaration()
            ));
        }
        if with_sequence {
            declarations.push(format!("{} int", quote_identifier(INTERNAL_ID)));
        }
        Ok(format!(
            "CREATE TABLE {TMP_TABLE}({});",
            declarations.join(", ")
        ))
    }
}

/// Catalog query for a table's columns, with its bound parameters
pub fn catalog_query(table: &TableRef) -> (String, Vec<SqlParameter>) {
    let source = match &table.database {
        Some(db) => format!("{}.INFORMATION_SCHEMA.COLUMNS", quote_identifier(db)),
        None => "INFORMATION_SCHEMA.COLUMNS".to_string(),
    };
    let sql = format!(
        "SELECT COLUMN_NAME, DATA_TYPE, CHARACTER_MAXIMUM_LENGTH, NUMERIC_PRECISION, \
         NUMERIC_SCALE, DATETIME_PRECISION, IS_NULLABLE FROM {source} \
         WHERE TABLE_SCHEMA = @TableSchema AND TABLE_NAME = @TableName \
         ORDER BY ORDINAL_POSITION;"
    );
    let params = vec![
        SqlParameter::new("@TableSchema", SqlDbType::NVarChar, table.schema.clone()),
        SqlParameter::new("@TableName", SqlDbType::NVarChar, table.table.clone()),
    ];
    (sql, params)
}
