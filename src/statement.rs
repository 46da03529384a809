//! SQL text assembly for the four bulk operations
//!
//! Every function here is pure: column lists come in already resolved to
//! destination names, and the output is statement text. The fixed names are
//! the staging table `#TmpTable`, the identity capture table `#TmpOutput`,
//! the MERGE aliases `Source` and `Target`, and the row-sequence column
//! `[InternalId]`.
//!
//! Column-list builders skip the identity column (the database assigns it)
//! and the row-sequence column (it only exists in the staging table).

use crate::column_set::INTERNAL_ID;
use crate::schema::{quote_identifier, TableRef, TMP_TABLE};
use std::fmt;

/// Identity capture table
pub const TMP_OUTPUT: &str = "#TmpOutput";
pub const SOURCE_ALIAS: &str = "Source";
pub const TARGET_ALIAS: &str = "Target";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
    Upsert,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Insert => "BulkInsert",
            OperationKind::Update => "BulkUpdate",
            OperationKind::Delete => "BulkDelete",
            OperationKind::Upsert => "BulkInsertOrUpdate",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_excluded(column: &str, identity: Option<&str>) -> bool {
    column == INTERNAL_ID || identity.is_some_and(|id| id == column)
}

fn included<'a>(columns: &'a [String], identity: Option<&'a str>) -> impl Iterator<Item = &'a String> {
    columns.iter().filter(move |c| !is_excluded(c, identity))
}

/// `ON [Target].[k1] = [Source].[k1] AND ... `
pub fn build_join_conditions_for_update_or_insert(
    keys: &[String],
    source: &str,
    target: &str,
) -> String {
    let conditions: Vec<String> = keys
        .iter()
        .map(|key| {
            let key = quote_identifier(key);
            format!(
                "{}.{key} = {}.{key}",
                quote_identifier(target),
                quote_identifier(source)
            )
        })
        .collect();
    format!("ON {} ", conditions.join(" AND "))
}

/// `SET [Target].[a] = [Source].[a], ... `
pub fn build_update_set(
    columns: &[String],
    source: &str,
    target: &str,
    identity: Option<&str>,
) -> String {
    let assignments: Vec<String> = included(columns, identity)
        .map(|column| {
            let column = quote_identifier(column);
            format!(
                "{}.{column} = {}.{column}",
                quote_identifier(target),
                quote_identifier(source)
            )
        })
        .collect();
    format!("SET {} ", assignments.join(", "))
}

/// `INSERT ([a], [b]) values ([Source].[a], [Source].[b])`
pub fn build_insert_set(columns: &[String], source: &str, identity: Option<&str>) -> String {
    let names: Vec<String> = included(columns, identity)
        .map(|c| quote_identifier(c))
        .collect();
    let values: Vec<String> = included(columns, identity)
        .map(|c| format!("{}.{}", quote_identifier(source), quote_identifier(c)))
        .collect();
    format!("INSERT ({}) values ({})", names.join(", "), values.join(", "))
}

/// `INSERT INTO [dbo].[t] ([a], [b]) `
pub fn build_insert_into_set(columns: &[String], identity: Option<&str>, table: &TableRef) -> String {
    let names: Vec<String> = included(columns, identity)
        .map(|c| quote_identifier(c))
        .collect();
    format!("INSERT INTO {} ({}) ", table.qualified(), names.join(", "))
}

/// `SELECT [Source].[a], [Source].[b]`
pub fn build_select_set(columns: &[String], source: &str, identity: Option<&str>) -> String {
    let values: Vec<String> = included(columns, identity)
        .map(|c| format!("{}.{}", quote_identifier(source), quote_identifier(c)))
        .collect();
    format!("SELECT {}", values.join(", "))
}

/// The OUTPUT clause that ends a MERGE, or `; ` when nothing is captured
pub fn output_identity_cmd(output_identity: Option<&str>, operation: OperationKind) -> String {
    match output_identity {
        None => "; ".to_string(),
        Some(identity) => {
            let pseudo = if operation == OperationKind::Delete {
                "DELETED"
            } else {
                "INSERTED"
            };
            let identity = quote_identifier(identity);
            let sequence = quote_identifier(INTERNAL_ID);
            format!(
                "OUTPUT {SOURCE_ALIAS}.{sequence}, {pseudo}.{identity} INTO {TMP_OUTPUT}({sequence}, {identity}); "
            )
        }
    }
}

/// `CREATE TABLE #TmpOutput(...)` with the identity column's declared type
pub fn output_create_table_cmd(identity: &str, identity_type: &str, with_sequence: bool) -> String {
    let identity = format!("{} {identity_type}", quote_identifier(identity));
    if with_sequence {
        format!(
            "CREATE TABLE {TMP_OUTPUT}({} int, {identity});",
            quote_identifier(INTERNAL_ID)
        )
    } else {
        format!("CREATE TABLE {TMP_OUTPUT}({identity});")
    }
}

pub fn drop_table_cmd(table: &str) -> String {
    format!("DROP TABLE {table};")
}

/// Read back captured identities; insert output is ordered by identity
pub fn select_output_cmd(identity: &str, with_sequence: bool) -> String {
    let identity = quote_identifier(identity);
    if with_sequence {
        format!(
            "SELECT {}, {identity} FROM {TMP_OUTPUT};",
            quote_identifier(INTERNAL_ID)
        )
    } else {
        format!("SELECT {identity} FROM {TMP_OUTPUT} ORDER BY {identity};")
    }
}

/// Inputs of a data statement, with every column already a destination name
#[derive(Debug, Clone)]
pub struct StatementParts<'a> {
    pub table: &'a TableRef,
    pub columns: &'a [String],
    pub match_on: &'a [String],
    pub identity: Option<&'a str>,
    /// Identity column to capture into `#TmpOutput`
    pub output_identity: Option<&'a str>,
    /// Compiled `WHEN MATCHED` guard fragments
    pub matched_predicates: &'a str,
    /// Compiled `WHEN NOT MATCHED BY SOURCE` guard fragments
    pub unmatched_source_predicates: &'a str,
    pub delete_when_not_matched: bool,
}

fn merge_head(parts: &StatementParts<'_>) -> String {
    format!(
        "MERGE INTO {} WITH (HOLDLOCK) AS {TARGET_ALIAS} USING {TMP_TABLE} AS {SOURCE_ALIAS} {}WHEN MATCHED {}",
        parts.table.qualified(),
        build_join_conditions_for_update_or_insert(parts.match_on, SOURCE_ALIAS, TARGET_ALIAS),
        parts.matched_predicates,
    )
}

/// `INSERT INTO ... OUTPUT ... SELECT ... FROM #TmpTable AS Source; DROP TABLE #TmpTable;`
pub fn build_insert_statement(parts: &StatementParts<'_>) -> String {
    let output = match parts.output_identity {
        Some(identity) => {
            let identity = quote_identifier(identity);
            format!("OUTPUT INSERTED.{identity} INTO {TMP_OUTPUT}({identity}) ")
        }
        None => String::new(),
    };
    format!(
        "{}{output}{} FROM {TMP_TABLE} AS {SOURCE_ALIAS}; {}",
        build_insert_into_set(parts.columns, parts.identity, parts.table),
        build_select_set(parts.columns, SOURCE_ALIAS, parts.identity),
        drop_table_cmd(TMP_TABLE),
    )
}

pub fn build_update_statement(parts: &StatementParts<'_>) -> String {
    format!(
        "{}THEN UPDATE {}{}{}",
        merge_head(parts),
        build_update_set(parts.columns, SOURCE_ALIAS, TARGET_ALIAS, parts.identity),
        output_identity_cmd(parts.output_identity, OperationKind::Update),
        drop_table_cmd(TMP_TABLE),
    )
}

pub fn build_delete_statement(parts: &StatementParts<'_>) -> String {
    format!(
        "{}THEN DELETE {}{}",
        merge_head(parts),
        output_identity_cmd(parts.output_identity, OperationKind::Delete),
        drop_table_cmd(TMP_TABLE),
    )
}

pub fn build_upsert_statement(parts: &StatementParts<'_>) -> String {
    let not_matched_by_source = if parts.delete_when_not_matched {
        format!(
            " WHEN NOT MATCHED BY SOURCE {}THEN DELETE ",
            parts.unmatched_source_predicates
        )
    } else {
        " ".to_string()
    };
    format!(
        "{}THEN UPDATE {}WHEN NOT MATCHED BY TARGET THEN {}{}{}{}",
        merge_head(parts),
        build_update_set(parts.columns, SOURCE_ALIAS, TARGET_ALIAS, parts.identity),
        build_insert_set(parts.columns, SOURCE_ALIAS, parts.identity),
        not_matched_by_source,
        output_identity_cmd(parts.output_identity, OperationKind::Upsert),
        drop_table_cmd(TMP_TABLE),
    )
}

/// Data statement for `operation`
pub fn build_statement(operation: OperationKind, parts: &StatementParts<'_>) -> String {
    match operation {
        OperationKind::Insert => build_insert_statement(parts),
        OperationKind::Update => build_update_statement(parts),
        OperationKind::Delete => build_delete_statement(parts),
        OperationKind::Upsert => build_upsert_statement(parts),
    }
}
