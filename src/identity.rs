//! Identity column policy and write-back of generated values
//!
//! With `ColumnDirection::InputOutput`, the database-generated identity of
//! every affected row is captured into `#TmpOutput` and assigned back onto
//! the in-memory record it came from. Update, delete and upsert correlate
//! through the `[InternalId]` row-sequence column; insert has no join, so the
//! captured identities are matched to records by read order.

use crate::error::BulkError;
use crate::record::{BulkRecord, SetValueError};
use crate::statement::OperationKind;
use crate::value::{is_null, ValueType};
use sea_query::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColumnDirection {
    /// Values flow to the database only
    #[default]
    Input,
    /// Generated values are written back onto the records
    InputOutput,
}

/// The designated identity field of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityColumn {
    pub field: String,
    pub direction: ColumnDirection,
}

impl IdentityColumn {
    pub fn new(field: impl Into<String>, direction: ColumnDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn is_output(&self) -> bool {
        self.direction == ColumnDirection::InputOutput
    }
}

/// Reject an output identity whose field cannot be written
pub fn validate_writable<R: BulkRecord>(
    field: &str,
    column: &str,
    operation: OperationKind,
) -> Result<(), BulkError> {
    match R::field(field) {
        Some(descriptor) if descriptor.writable => Ok(()),
        _ => Err(BulkError::Mapping {
            column: column.to_string(),
            operation,
            message: format!(
                "identity field '{field}' of {} has no setter; mark it writable or use ColumnDirection::Input",
                R::record_name()
            ),
        }),
    }
}

fn write_back<R: BulkRecord>(
    record: &mut R,
    field: &str,
    column: &str,
    value: Value,
    operation: OperationKind,
) -> Result<(), BulkError> {
    record.set_value(field, value).map_err(|err| {
        let message = match &err {
            SetValueError::ReadOnly { .. } | SetValueError::UnknownField { .. } => format!(
                "{err}; use ColumnDirection::Input for identity field '{field}' of {}",
                R::record_name()
            ),
            SetValueError::TypeMismatch { .. } => err.to_string(),
        };
        BulkError::Mapping {
            column: column.to_string(),
            operation,
            message,
        }
    })
}

/// Assign captured identities onto `records`, returning how many were written.
///
/// With `by_sequence`, each row is `[InternalId, identity]` and rows whose
/// sequence is null (target rows deleted by `WHEN NOT MATCHED BY SOURCE`) are
/// skipped. Otherwise each row is `[identity]` and row `i` belongs to record `i`.
pub fn load_output_identities<R: BulkRecord>(
    records: &mut [R],
    field: &str,
    column: &str,
    rows: &[Vec<Value>],
    by_sequence: bool,
    operation: OperationKind,
) -> Result<usize, BulkError> {
    let mapping_error = |message: String| BulkError::Mapping {
        column: column.to_string(),
        operation,
        message,
    };

    if !by_sequence && rows.len() != records.len() {
        return Err(mapping_error(format!(
            "{} identities were returned for {} records",
            rows.len(),
            records.len()
        )));
    }

    let mut written = 0;
    for (position, row) in rows.iter().enumerate() {
        let (index, identity) = if by_sequence {
            let (Some(sequence), Some(identity)) = (row.first(), row.get(1)) else {
                return Err(mapping_error(format!("output row {position} is incomplete")));
            };
            if is_null(sequence) {
                continue;
            }
            let index = sequence_index(sequence).ok_or_else(|| {
                mapping_error(format!("invalid row sequence {sequence:?}"))
            })?;
            (index, identity)
        } else {
            let Some(identity) = row.first() else {
                return Err(mapping_error(format!("output row {position} is empty")));
            };
            (position, identity)
        };

        let record = records.get_mut(index).ok_or_else(|| {
            mapping_error(format!("row sequence {index} does not match any record"))
        })?;
        write_back(record, field, column, identity.clone(), operation)?;
        written += 1;
    }

    log::debug!("wrote back {written} identities for {operation}");
    Ok(written)
}

fn sequence_index(value: &Value) -> Option<usize> {
    <i64 as ValueType>::from_value(value.clone()).and_then(|v| usize::try_from(v).ok())
}
