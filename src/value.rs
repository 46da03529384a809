//! Value conversions and dialect column types
//!
//! The `ValueType` trait maps Rust field types to their corresponding
//! `sea_query::Value` variant and to the `SqlDbType` a bulk-loaded column or a
//! bound parameter carries. Staged cells, predicate parameters and identity
//! values read back from `#TmpOutput` are all `sea_query::Value`s.
//!
//! ## Usage
//!
//! ```rust
//! use bulkguard::{SqlDbType, ValueType};
//! use sea_query::Value;
//!
//! let value: Value = ValueType::into_value(42i32);
//! assert!(matches!(value, Value::Int(Some(42))));
//! assert_eq!(<Option<i32> as ValueType>::sql_type(), SqlDbType::Int);
//! ```
//!
//! ## Implementation
//!
//! The trait is implemented for:
//!
//! - Integer types: `i8`, `i16`, `i32`, `i64`, `u8`, `u16`, `u32`, `u64`
//! - Floating point: `f32`, `f64`
//! - Boolean: `bool`
//! - Text: `String`, `char`
//! - Binary: `Vec<u8>`
//! - Decimal: `rust_decimal::Decimal`
//! - chrono: `NaiveDate`, `NaiveTime`, `NaiveDateTime`, `DateTime<Utc>`, `DateTime<FixedOffset>`
//! - `uuid::Uuid`
//! - JSON documents: `serde_json::Value`
//! - Option<T> for all above types
//!
//! Integer conversions out of a `Value` accept any integer variant that fits
//! the target type, since identity columns come back in the database's
//! declared width rather than the field's.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_query::Value;
use std::fmt;
use uuid::Uuid;

/// Column and parameter types of the SQL Server dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlDbType {
    BigInt,
    Int,
    SmallInt,
    TinyInt,
    Bit,
    Float,
    Real,
    Decimal,
    Numeric,
    Money,
    NVarChar,
    VarChar,
    NChar,
    Char,
    NText,
    Text,
    VarBinary,
    Binary,
    Date,
    Time,
    DateTime,
    SmallDateTime,
    DateTime2,
    DateTimeOffset,
    UniqueIdentifier,
    Xml,
}

impl SqlDbType {
    /// The type name as it appears in `INFORMATION_SCHEMA.COLUMNS.DATA_TYPE`
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlDbType::BigInt => "bigint",
            SqlDbType::Int => "int",
            SqlDbType::SmallInt => "smallint",
            SqlDbType::TinyInt => "tinyint",
            SqlDbType::Bit => "bit",
            SqlDbType::Float => "float",
            SqlDbType::Real => "real",
            SqlDbType::Decimal => "decimal",
            SqlDbType::Numeric => "numeric",
            SqlDbType::Money => "money",
            SqlDbType::NVarChar => "nvarchar",
            SqlDbType::VarChar => "varchar",
            SqlDbType::NChar => "nchar",
            SqlDbType::Char => "char",
            SqlDbType::NText => "ntext",
            SqlDbType::Text => "text",
            SqlDbType::VarBinary => "varbinary",
            SqlDbType::Binary => "binary",
            SqlDbType::Date => "date",
            SqlDbType::Time => "time",
            SqlDbType::DateTime => "datetime",
            SqlDbType::SmallDateTime => "smalldatetime",
            SqlDbType::DateTime2 => "datetime2",
            SqlDbType::DateTimeOffset => "datetimeoffset",
            SqlDbType::UniqueIdentifier => "uniqueidentifier",
            SqlDbType::Xml => "xml",
        }
    }

    /// Parse a catalog `DATA_TYPE` name (case-insensitive)
    pub fn from_catalog(data_type: &str) -> Option<Self> {
        let ty = match data_type.to_ascii_lowercase().as_str() {
            "bigint" => SqlDbType::BigInt,
            "int" => SqlDbType::Int,
            "smallint" => SqlDbType::SmallInt,
            "tinyint" => SqlDbType::TinyInt,
            "bit" => SqlDbType::Bit,
            "float" => SqlDbType::Float,
            "real" => SqlDbType::Real,
            "decimal" => SqlDbType::Decimal,
            "numeric" => SqlDbType::Numeric,
            "money" => SqlDbType::Money,
            "nvarchar" => SqlDbType::NVarChar,
            "varchar" => SqlDbType::VarChar,
            "nchar" => SqlDbType::NChar,
            "char" => SqlDbType::Char,
            "ntext" => SqlDbType::NText,
            "text" => SqlDbType::Text,
            "varbinary" => SqlDbType::VarBinary,
            "binary" => SqlDbType::Binary,
            "date" => SqlDbType::Date,
            "time" => SqlDbType::Time,
            "datetime" => SqlDbType::DateTime,
            "smalldatetime" => SqlDbType::SmallDateTime,
            "datetime2" => SqlDbType::DateTime2,
            "datetimeoffset" => SqlDbType::DateTimeOffset,
            "uniqueidentifier" => SqlDbType::UniqueIdentifier,
            "xml" => SqlDbType::Xml,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for SqlDbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for mapping Rust types to their corresponding `sea_query::Value` variant.
///
/// ## Example
///
/// ```rust
/// use bulkguard::ValueType;
/// use sea_query::Value;
///
/// let value = ValueType::into_value(Some(42i32));
/// assert!(matches!(value, Value::Int(Some(42))));
///
/// let value = ValueType::into_value(None::<i32>);
/// assert!(matches!(value, Value::Int(None)));
///
/// assert_eq!(<Option<i32> as ValueType>::from_value(Value::Int(None)), Some(None));
/// ```
pub trait ValueType: Sized {
    /// Convert this value into a `sea_query::Value`.
    fn into_value(self) -> Value;

    /// Convert a `sea_query::Value` into this type, if possible.
    ///
    /// Returns `None` if the value doesn't match the expected variant. A null
    /// value only converts into `Option<T>`.
    fn from_value(value: Value) -> Option<Self>;

    /// Return the null variant for this type.
    fn null_value() -> Value;

    /// The dialect type a column or parameter of this type is declared as
    fn sql_type() -> SqlDbType;

    /// Whether `None` is representable, i.e. the type is an `Option<T>`
    fn is_nullable() -> bool {
        false
    }
}

/// Widen any integer variant to `i128` for range-checked narrowing
fn integer_of(value: &Value) -> Option<i128> {
    match value {
        Value::TinyInt(Some(v)) => Some(i128::from(*v)),
        Value::SmallInt(Some(v)) => Some(i128::from(*v)),
        Value::Int(Some(v)) => Some(i128::from(*v)),
        Value::BigInt(Some(v)) => Some(i128::from(*v)),
        Value::TinyUnsigned(Some(v)) => Some(i128::from(*v)),
        Value::SmallUnsigned(Some(v)) => Some(i128::from(*v)),
        Value::Unsigned(Some(v)) => Some(i128::from(*v)),
        Value::BigUnsigned(Some(v)) => Some(i128::from(*v)),
        _ => None,
    }
}

macro_rules! impl_integer_value_type {
    ($($ty:ty => $variant:ident, $sql:expr;)*) => {
        $(
            impl ValueType for $ty {
                fn into_value(self) -> Value {
                    Value::$variant(Some(self))
                }

                fn from_value(value: Value) -> Option<Self> {
                    integer_of(&value).and_then(|v| <$ty>::try_from(v).ok())
                }

                fn null_value() -> Value {
                    Value::$variant(None)
                }

                fn sql_type() -> SqlDbType {
                    $sql
                }
            }
        )*
    };
}

impl_integer_value_type! {
    i8 => TinyInt, SqlDbType::SmallInt;
    i16 => SmallInt, SqlDbType::SmallInt;
    i32 => Int, SqlDbType::Int;
    i64 => BigInt, SqlDbType::BigInt;
    u8 => TinyUnsigned, SqlDbType::TinyInt;
    u16 => SmallUnsigned, SqlDbType::Int;
    u32 => Unsigned, SqlDbType::BigInt;
    u64 => BigUnsigned, SqlDbType::Decimal;
}

impl ValueType for f32 {
    fn into_value(self) -> Value {
        Value::Float(Some(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float(Some(v)) => Some(v),
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::Float(None)
    }

    fn sql_type() -> SqlDbType {
        SqlDbType::Real
    }
}

impl ValueType for f64 {
    fn into_value(self) -> Value {
        Value::Double(Some(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Double(Some(v)) => Some(v),
            Value::Float(Some(v)) => Some(f64::from(v)),
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::Double(None)
    }

    fn sql_type() -> SqlDbType {
        SqlDbType::Float
    }
}

impl ValueType for bool {
    fn into_value(self) -> Value {
        Value::Bool(Some(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(Some(v)) => Some(v),
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::Bool(None)
    }

    fn sql_type() -> SqlDbType {
        SqlDbType::Bit
    }
}

impl ValueType for String {
    fn into_value(self) -> Value {
        Value::String(Some(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(Some(v)) => Some(v),
            Value::Char(Some(c)) => Some(c.to_string()),
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::String(None)
    }

    fn sql_type() -> SqlDbType {
        SqlDbType::NVarChar
    }
}

impl ValueType for char {
    fn into_value(self) -> Value {
        Value::Char(Some(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Char(Some(c)) => Some(c),
            Value::String(Some(s)) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(c),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::Char(None)
    }

    fn sql_type() -> SqlDbType {
        SqlDbType::NChar
    }
}

impl ValueType for Vec<u8> {
    fn into_value(self) -> Value {
        Value::Bytes(Some(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bytes(Some(v)) => Some(v),
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::Bytes(None)
    }

    fn sql_type() -> SqlDbType {
        SqlDbType::VarBinary
    }
}

impl ValueType for serde_json::Value {
    fn into_value(self) -> Value {
        Value::Json(Some(Box::new(self)))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Json(Some(v)) => Some(*v),
            Value::String(Some(s)) => serde_json::from_str(&s).ok(),
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::Json(None)
    }

    fn sql_type() -> SqlDbType {
        SqlDbType::NVarChar
    }
}

// Library types convert through sea-query's own `From` / `ValueType` impls,
// which keeps us independent of how each variant stores its payload.
macro_rules! impl_library_value_type {
    ($($ty:ty => $variant:ident, $sql:expr;)*) => {
        $(
            impl ValueType for $ty {
                fn into_value(self) -> Value {
                    Value::from(self)
                }

                fn from_value(value: Value) -> Option<Self> {
                    if is_null(&value) {
                        return None;
                    }
                    <$ty as sea_query::ValueType>::try_from(value).ok()
                }

                fn null_value() -> Value {
                    Value::$variant(None)
                }

                fn sql_type() -> SqlDbType {
                    $sql
                }
            }
        )*
    };
}

impl_library_value_type! {
    Decimal => Decimal, SqlDbType::Decimal;
    NaiveDate => ChronoDate, SqlDbType::Date;
    NaiveTime => ChronoTime, SqlDbType::Time;
    NaiveDateTime => ChronoDateTime, SqlDbType::DateTime2;
    DateTime<Utc> => ChronoDateTimeUtc, SqlDbType::DateTimeOffset;
    DateTime<FixedOffset> => ChronoDateTimeWithTimeZone, SqlDbType::DateTimeOffset;
    Uuid => Uuid, SqlDbType::UniqueIdentifier;
}

impl<T: ValueType> ValueType for Option<T> {
    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => T::null_value(),
        }
    }

    fn from_value(value: Value) -> Option<Self> {
        if is_null(&value) {
            Some(None)
        } else {
            T::from_value(value).map(Some)
        }
    }

    fn null_value() -> Value {
        T::null_value()
    }

    fn sql_type() -> SqlDbType {
        T::sql_type()
    }

    fn is_nullable() -> bool {
        true
    }
}

/// Check if a value is a null of any variant
pub fn is_null(value: &Value) -> bool {
    matches!(
        value,
        Value::Bool(None)
            | Value::TinyInt(None)
            | Value::SmallInt(None)
            | Value::Int(None)
            | Value::BigInt(None)
            | Value::TinyUnsigned(None)
            | Value::SmallUnsigned(None)
            | Value::Unsigned(None)
            | Value::BigUnsigned(None)
            | Value::Float(None)
            | Value::Double(None)
            | Value::String(None)
            | Value::Char(None)
            | Value::Bytes(None)
            | Value::Json(None)
            | Value::Decimal(None)
            | Value::ChronoDate(None)
            | Value::ChronoTime(None)
            | Value::ChronoDateTime(None)
            | Value::ChronoDateTimeUtc(None)
            | Value::ChronoDateTimeLocal(None)
            | Value::ChronoDateTimeWithTimeZone(None)
            | Value::Uuid(None)
    )
}

/// The dialect type a bound value is sent as, `None` for unmapped variants
pub fn sql_type_of(value: &Value) -> Option<SqlDbType> {
    let ty = match value {
        Value::Bool(_) => SqlDbType::Bit,
        Value::TinyInt(_) | Value::SmallInt(_) => SqlDbType::SmallInt,
        Value::Int(_) => SqlDbType::Int,
        Value::BigInt(_) => SqlDbType::BigInt,
        Value::TinyUnsigned(_) => SqlDbType::TinyInt,
        Value::SmallUnsigned(_) => SqlDbType::Int,
        Value::Unsigned(_) => SqlDbType::BigInt,
        Value::BigUnsigned(_) => SqlDbType::Decimal,
        Value::Float(_) => SqlDbType::Real,
        Value::Double(_) => SqlDbType::Float,
        Value::String(_) | Value::Json(_) => SqlDbType::NVarChar,
        Value::Char(_) => SqlDbType::NChar,
        Value::Bytes(_) => SqlDbType::VarBinary,
        Value::Decimal(_) => SqlDbType::Decimal,
        Value::ChronoDate(_) => SqlDbType::Date,
        Value::ChronoTime(_) => SqlDbType::Time,
        Value::ChronoDateTime(_) => SqlDbType::DateTime2,
        Value::ChronoDateTimeUtc(_)
        | Value::ChronoDateTimeLocal(_)
        | Value::ChronoDateTimeWithTimeZone(_) => SqlDbType::DateTimeOffset,
        Value::Uuid(_) => SqlDbType::UniqueIdentifier,
        _ => return None,
    };
    Some(ty)
}
