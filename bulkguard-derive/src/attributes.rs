//! Attribute parsing utilities

use syn::{Attribute, ExprLit, Field, Lit};

/// Read a `#[name = "value"]` string attribute from a list of attributes
fn extract_str_attribute(attrs: &[Attribute], name: &str) -> Option<String> {
    for attr in attrs {
        if attr.path().is_ident(name) {
            if let Ok(meta) = attr.meta.require_name_value() {
                if let syn::Expr::Lit(ExprLit {
                    lit: Lit::Str(s),
                    ..
                }) = &meta.value {
                    return Some(s.value());
                }
            }
        }
    }
    None
}

/// Extract the column naming rule from struct attributes
pub fn extract_rename_all(attrs: &[Attribute]) -> Option<String> {
    extract_str_attribute(attrs, "rename_all")
}

/// Extract column name from field attributes
pub fn extract_column_name(field: &Field) -> Option<String> {
    extract_str_attribute(&field.attrs, "column_name")
}

/// Check if field has a specific attribute
pub fn has_attribute(field: &Field, attr_name: &str) -> bool {
    field.attrs.iter().any(|attr| attr.path().is_ident(attr_name))
}

/// Naming rule applied to field identifiers that carry no `#[column_name]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameRule {
    /// Keep the field identifier as written
    Verbatim,
    PascalCase,
    CamelCase,
    SnakeCase,
}

impl RenameRule {
    /// Parse a `#[rename_all = ".."]` value
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PascalCase" => Some(RenameRule::PascalCase),
            "camelCase" => Some(RenameRule::CamelCase),
            "snake_case" => Some(RenameRule::SnakeCase),
            _ => None,
        }
    }

    /// Apply the rule to a field identifier
    pub fn apply(&self, field_name: &str) -> String {
        match self {
            RenameRule::Verbatim => field_name.to_string(),
            RenameRule::PascalCase => crate::utils::pascal_case(field_name),
            RenameRule::CamelCase => crate::utils::camel_case(field_name),
            RenameRule::SnakeCase => crate::utils::snake_case(field_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rename_rule_parse() {
        assert_eq!(RenameRule::parse("PascalCase"), Some(RenameRule::PascalCase));
        assert_eq!(RenameRule::parse("camelCase"), Some(RenameRule::CamelCase));
        assert_eq!(RenameRule::parse("snake_case"), Some(RenameRule::SnakeCase));
        assert_eq!(RenameRule::parse("SCREAMING"), None);
    }

    #[test]
    fn test_rename_rule_apply() {
        assert_eq!(RenameRule::PascalCase.apply("unit_price"), "UnitPrice");
        assert_eq!(RenameRule::CamelCase.apply("unit_price"), "unitPrice");
        assert_eq!(RenameRule::Verbatim.apply("unit_price"), "unit_price");
    }

    #[test]
    fn test_extract_column_name() {
        let field: syn::Field = syn::parse_quote! {
            #[column_name = "ISBN"]
            pub isbn: String
        };
        assert_eq!(extract_column_name(&field), Some("ISBN".to_string()));
        assert!(!has_attribute(&field, "read_only"));
    }
}
