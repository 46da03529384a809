//! `BulkRecord` derive macro implementation
//!
//! Generates the field accessor table for a struct: one `FieldDescriptor` per
//! field plus `get_value` / `set_value` dispatch over flat fields.

use proc_macro::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::{parse_macro_input, Data, DataStruct, DeriveInput, Fields};

use crate::attributes::{self, RenameRule};
use crate::type_conversion;

/// Derive macro for `BulkRecord`
pub fn derive_bulk_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let struct_name = &input.ident;
    let record_name = struct_name.to_string();

    // The descriptor table is cached in a function-local static, which is
    // shared by every instantiation of a generic type.
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "BulkRecord cannot be derived for generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(DataStruct {
            fields: Fields::Named(named),
            ..
        }) => &named.named,
        _ => {
            return Err(syn::Error::new_spanned(
                struct_name,
                "BulkRecord can only be derived for structs with named fields",
            ));
        }
    };

    let rename_rule = match attributes::extract_rename_all(&input.attrs) {
        Some(value) => RenameRule::parse(&value).ok_or_else(|| {
            syn::Error::new_spanned(
                struct_name,
                format!(
                    "unsupported rename_all value `{value}`, expected \"PascalCase\", \"camelCase\" or \"snake_case\""
                ),
            )
        })?,
        None => RenameRule::Verbatim,
    };

    let mut descriptors = Vec::new();
    let mut get_arms = Vec::new();
    let mut set_arms = Vec::new();

    for field in fields {
        if attributes::has_attribute(field, "skip") {
            continue;
        }
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let field_name = ident.unraw().to_string();
        let column_name = attributes::extract_column_name(field)
            .unwrap_or_else(|| rename_rule.apply(&field_name));
        let field_type = &field.ty;

        if !type_conversion::is_flat_type(field_type) {
            let type_name = type_conversion::type_to_string(field_type);
            descriptors.push(quote! {
                ::bulkguard::FieldDescriptor {
                    name: #field_name,
                    column: #column_name,
                    kind: ::bulkguard::FieldKind::Unsupported(#type_name),
                    nullable: false,
                    writable: false,
                }
            });
            continue;
        }

        let writable = !attributes::has_attribute(field, "read_only");
        descriptors.push(quote! {
            ::bulkguard::FieldDescriptor {
                name: #field_name,
                column: #column_name,
                kind: ::bulkguard::FieldKind::Flat(
                    <#field_type as ::bulkguard::ValueType>::sql_type()
                ),
                nullable: <#field_type as ::bulkguard::ValueType>::is_nullable(),
                writable: #writable,
            }
        });

        get_arms.push(quote! {
            #field_name => ::core::option::Option::Some(
                ::bulkguard::ValueType::into_value(::core::clone::Clone::clone(&self.#ident))
            ),
        });

        if writable {
            set_arms.push(quote! {
                #field_name => {
                    match <#field_type as ::bulkguard::ValueType>::from_value(::core::clone::Clone::clone(&value)) {
                        ::core::option::Option::Some(converted) => {
                            self.#ident = converted;
                            ::core::result::Result::Ok(())
                        }
                        ::core::option::Option::None => ::core::result::Result::Err(
                            ::bulkguard::SetValueError::TypeMismatch {
                                field: #field_name.to_string(),
                                value,
                            }
                        ),
                    }
                }
            });
        } else {
            set_arms.push(quote! {
                #field_name => ::core::result::Result::Err(
                    ::bulkguard::SetValueError::ReadOnly { field: #field_name.to_string() }
                ),
            });
        }
    }

    Ok(quote! {
        impl ::bulkguard::BulkRecord for #struct_name {
            fn record_name() -> &'static str {
                #record_name
            }

            fn fields() -> &'static [::bulkguard::FieldDescriptor] {
                static FIELDS: ::std::sync::OnceLock<::std::vec::Vec<::bulkguard::FieldDescriptor>> =
                    ::std::sync::OnceLock::new();
                FIELDS
                    .get_or_init(|| ::std::vec![#(#descriptors),*])
                    .as_slice()
            }

            fn get_value(&self, field: &str) -> ::core::option::Option<::bulkguard::sea_query::Value> {
                match field {
                    #(#get_arms)*
                    _ => ::core::option::Option::None,
                }
            }

            #[allow(unused_variables)]
            fn set_value(
                &mut self,
                field: &str,
                value: ::bulkguard::sea_query::Value,
            ) -> ::core::result::Result<(), ::bulkguard::SetValueError> {
                match field {
                    #(#set_arms)*
                    _ => ::core::result::Result::Err(
                        ::bulkguard::SetValueError::UnknownField { field: field.to_string() }
                    ),
                }
            }
        }
    })
}
