//! Procedural macros for bulkguard
//!
//! This crate provides the `BulkRecord` derive, which generates the field
//! accessor table bulk operations use to read staged values out of a record
//! and to write generated identity values back into it.

mod attributes;
mod macros;
mod type_conversion;
mod utils;

use proc_macro::TokenStream;

/// Derive macro for `BulkRecord` - generates the per-type field accessor table
///
/// This macro generates:
/// - `fields()` - one `FieldDescriptor` per named field, built once and cached
/// - `get_value()` - reads a flat field into a `sea_query::Value`
/// - `set_value()` - writes a `sea_query::Value` back into a flat field
///
/// Fields whose type is not a flat column type (scalars, `String`, `Vec<u8>`,
/// decimals, chrono types, `Uuid`, `serde_json::Value`, or `Option` of those)
/// are listed as unsupported and have no accessor.
///
/// # Attributes
///
/// - `#[rename_all = "PascalCase"]` on the struct: default column naming rule
/// - `#[column_name = "Name"]` on a field: explicit destination column
/// - `#[read_only]` on a field: no setter, identity write-back is refused
/// - `#[skip]` on a field: the field is not listed at all
///
/// # Example
///
/// ```ignore
/// use bulkguard::BulkRecord;
///
/// #[derive(BulkRecord)]
/// #[rename_all = "PascalCase"]
/// pub struct Book {
///     pub id: i32,
///     pub title: String,
///     pub price: rust_decimal::Decimal,
///     pub description: Option<String>,
/// }
/// ```
#[proc_macro_derive(BulkRecord, attributes(rename_all, column_name, read_only, skip))]
pub fn derive_bulk_record(input: TokenStream) -> TokenStream {
    macros::derive_bulk_record(input)
}
