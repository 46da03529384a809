//! Field type classification for code generation
//!
//! Bulk transport can only carry flat column values. This module decides,
//! from the field's written type alone, whether a field is flat and therefore
//! gets an accessor, or is listed as unsupported.
//!
//! Flat types:
//! - Integer types: i8, i16, i32, i64, u8, u16, u32, u64
//! - Floating point: f32, f64
//! - Boolean: bool
//! - Text: String, char
//! - Binary: Vec<u8>
//! - Decimal: `rust_decimal::Decimal`
//! - Dates and times: `NaiveDate`, `NaiveTime`, `NaiveDateTime`, `DateTime<Tz>`
//! - `uuid::Uuid`
//! - Documents: `serde_json::Value`
//! - Option<T> for all above types
//!
//! The SQL type of a flat field is not decided here; the generated code asks
//! the runtime `ValueType` implementation so that there is a single mapping.

use syn::{GenericArgument, PathArguments, Type, TypePath};

const FLAT_IDENTS: &[&str] = &[
    "i8", "i16", "i32", "i64", "u8", "u16", "u32", "u64", "f32", "f64", "bool", "String",
    "char", "Decimal", "NaiveDate", "NaiveTime", "NaiveDateTime", "DateTime", "Uuid",
];

/// Return the `T` of an `Option<T>`
pub fn option_inner_type(ty: &Type) -> Option<&Type> {
    if let Type::Path(TypePath { path, .. }) = ty {
        if let Some(segment) = path.segments.last() {
            if segment.ident == "Option" {
                if let PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(GenericArgument::Type(inner_type)) = args.args.first() {
                        return Some(inner_type);
                    }
                }
            }
        }
    }
    None
}

/// Check if a type is `serde_json::Value`
pub fn is_json_value_type(ty: &Type) -> bool {
    if let Type::Path(TypePath { path, .. }) = ty {
        let segments: Vec<_> = path.segments.iter().collect();
        segments.len() == 2
            && segments[0].ident == "serde_json"
            && segments[1].ident == "Value"
    } else {
        false
    }
}

/// Check if a type is `Vec<u8>` (binary data)
pub fn is_vec_u8_type(ty: &Type) -> bool {
    if let Type::Path(TypePath { path, .. }) = ty {
        if let Some(segment) = path.segments.last() {
            if segment.ident == "Vec" {
                if let PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(GenericArgument::Type(Type::Path(TypePath { path: inner_path, .. }))) = args.args.first() {
                        if let Some(inner_segment) = inner_path.segments.last() {
                            return inner_segment.ident == "u8";
                        }
                    }
                }
            }
        }
    }
    false
}

/// Check if a type can be carried as a single column value
pub fn is_flat_type(ty: &Type) -> bool {
    if let Some(inner) = option_inner_type(ty) {
        // Option<Option<T>> has no single column representation
        return option_inner_type(inner).is_none() && is_flat_type(inner);
    }
    if is_vec_u8_type(ty) || is_json_value_type(ty) {
        return true;
    }
    if let Type::Path(TypePath { path, .. }) = ty {
        if let Some(segment) = path.segments.last() {
            let ident = segment.ident.to_string();
            return FLAT_IDENTS.contains(&ident.as_str());
        }
    }
    false
}

/// Convert a Rust Type to its string representation
///
/// Used for the type name carried by unsupported field descriptors, so that
/// configuration errors can say which type was rejected.
pub fn type_to_string(ty: &Type) -> String {
    match ty {
        Type::Path(type_path) => {
            let path = &type_path.path;
            let segments: Vec<String> = path.segments.iter()
                .map(|seg| {
                    let mut result = seg.ident.to_string();
                    if let PathArguments::AngleBracketed(args) = &seg.arguments {
                        let generic_args: Vec<String> = args.args.iter()
                            .filter_map(|arg| {
                                if let GenericArgument::Type(inner_ty) = arg {
                                    Some(type_to_string(inner_ty))
                                } else {
                                    None
                                }
                            })
                            .collect();
                        if !generic_args.is_empty() {
                            result.push('<');
                            result.push_str(&generic_args.join(", "));
                            result.push('>');
                        }
                    }
                    result
                })
                .collect();
            segments.join("::")
        }
        Type::Array(_) => "array".to_string(),
        Type::Slice(_) => "slice".to_string(),
        Type::Tuple(tuple) => {
            let elems: Vec<String> = tuple.elems.iter()
                .map(type_to_string)
                .collect();
            format!("({})", elems.join(", "))
        }
        Type::Reference(_) => "reference".to_string(),
        Type::Ptr(_) => "pointer".to_string(),
        _ => "unknown".to_string(),
    }
}
