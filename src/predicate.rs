//! Row-level guards for `WHEN MATCHED` and `WHEN NOT MATCHED BY SOURCE`
//!
//! A `Condition` compares one target column against a literal. Conditions
//! compile to `AND [Target].[col] <op> @Param ` fragments, each with a
//! trailing space, joined in the order they were added. Only conjunctions of
//! single comparisons exist, so there is no predicate shape that cannot be
//! rendered.
//!
//! ```rust
//! use bulkguard::predicate::{Condition, Comparison};
//!
//! let guard = Condition::le("price", rust_decimal::Decimal::new(1000, 2));
//! assert_eq!(guard.comparison(), Comparison::LessOrEqual);
//! ```

use crate::column_set::{flat_field, CustomColumnMapping};
use crate::error::ConfigError;
use crate::record::BulkRecord;
use crate::schema::quote_identifier;
use crate::value::{is_null, sql_type_of, SqlDbType};
use sea_query::Value;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
}

impl Comparison {
    pub fn operator(&self) -> &'static str {
        match self {
            Comparison::Equal => "=",
            Comparison::NotEqual => "<>",
            Comparison::LessThan => "<",
            Comparison::LessOrEqual => "<=",
            Comparison::GreaterThan => ">",
            Comparison::GreaterOrEqual => ">=",
        }
    }
}

/// `field <comparison> value`, where a null value means SQL `NULL`
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    field: String,
    comparison: Comparison,
    value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, comparison: Comparison, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            comparison,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Comparison::Equal, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Comparison::NotEqual, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Comparison::LessThan, value)
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Comparison::LessOrEqual, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Comparison::GreaterThan, value)
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Comparison::GreaterOrEqual, value)
    }

    /// `field IS NULL`
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, Comparison::Equal, Value::String(None))
    }

    /// `field IS NOT NULL`
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::new(field, Comparison::NotEqual, Value::String(None))
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn comparison(&self) -> Comparison {
        self.comparison
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// A bound command parameter
#[derive(Debug, Clone, PartialEq)]
pub struct SqlParameter {
    /// Name including the leading `@`
    pub name: String,
    pub sql_type: SqlDbType,
    pub value: Value,
}

impl SqlParameter {
    pub fn new(name: impl Into<String>, sql_type: SqlDbType, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            sql_type,
            value: value.into(),
        }
    }
}

/// Hands out unique parameter names within one statement
#[derive(Debug, Default)]
pub struct ParameterNamer {
    used: HashMap<String, usize>,
    // Lowercased, since T-SQL variable names are case-insensitive
    emitted: HashSet<String>,
}

impl ParameterNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `@` + column with non-alphanumerics replaced by `_`; repeats get `_2`, `_3`, ...
    ///
    /// A suffixed name that another column already produced is skipped.
    pub fn next(&mut self, column: &str) -> String {
        let base: String = column
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        let count = self.used.entry(base.clone()).or_insert(0);
        loop {
            *count += 1;
            let name = if *count == 1 {
                format!("@{base}")
            } else {
                format!("@{base}_{count}")
            };
            if self.emitted.insert(name.to_lowercase()) {
                return name;
            }
        }
    }
}

/// Compile conditions against the `target` alias.
///
/// Returns the concatenated fragments (empty for no conditions) and the
/// parameters they reference.
pub fn build_predicate_query<R: BulkRecord>(
    conditions: &[Condition],
    target: &str,
    mapping: &CustomColumnMapping,
    namer: &mut ParameterNamer,
) -> Result<(String, Vec<SqlParameter>), ConfigError> {
    let mut sql = String::new();
    let mut params = Vec::new();

    for condition in conditions {
        let (descriptor, field_type) = flat_field::<R>(&condition.field)?;
        let column = mapping.destination::<R>(descriptor.name);
        let subject = format!("{}.{}", quote_identifier(target), quote_identifier(&column));

        if is_null(&condition.value) {
            let test = match condition.comparison {
                Comparison::Equal => "IS NULL",
                Comparison::NotEqual => "IS NOT NULL",
                other => {
                    return Err(ConfigError::InvalidPredicate {
                        field: condition.field.clone(),
                        reason: format!("NULL cannot be compared with '{}'", other.operator()),
                    });
                }
            };
            sql.push_str(&format!("AND {subject} {test} "));
            continue;
        }

        let name = namer.next(&column);
        sql.push_str(&format!(
            "AND {subject} {} {name} ",
            condition.comparison.operator()
        ));
        params.push(SqlParameter {
            name,
            sql_type: sql_type_of(&condition.value).unwrap_or(field_type),
            value: condition.value.clone(),
        });
    }

    Ok((sql, params))
}
