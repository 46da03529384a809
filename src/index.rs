//! Non-clustered index disable / rebuild around the data statement
//!
//! Large merges run faster when secondary indexes are rebuilt once at the end
//! instead of maintained row by row. Indexes are disabled right before the
//! data statement and rebuilt right after, inside the same transaction; a
//! failed statement rolls the disable back with everything else.

use crate::error::ConfigError;
use crate::schema::{quote_literal, TableRef};
use std::collections::BTreeSet;

/// Which non-clustered indexes to disable for one operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IndexHints {
    #[default]
    None,
    AllNonClustered,
    /// Sorted so generated commands are stable
    Named(BTreeSet<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexAction {
    Disable,
    Rebuild,
}

impl IndexAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexAction::Disable => "DISABLE",
            IndexAction::Rebuild => "REBUILD",
        }
    }
}

impl IndexHints {
    pub fn disable_all_non_clustered(&mut self) -> Result<(), ConfigError> {
        match self {
            IndexHints::Named(_) => Err(ConfigError::ConflictingIndexHints),
            _ => {
                *self = IndexHints::AllNonClustered;
                Ok(())
            }
        }
    }

    pub fn disable_non_clustered(&mut self, name: impl Into<String>) -> Result<(), ConfigError> {
        match self {
            IndexHints::AllNonClustered => Err(ConfigError::ConflictingIndexHints),
            IndexHints::Named(names) => {
                names.insert(name.into());
                Ok(())
            }
            IndexHints::None => {
                *self = IndexHints::Named(BTreeSet::from([name.into()]));
                Ok(())
            }
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, IndexHints::None)
    }
}

/// Command that applies `action` to the hinted indexes of `table`.
///
/// `None` when no index is hinted. The command resolves index names from
/// `sys.indexes` at run time so unknown names are ignored by the server.
pub fn index_management_cmd(
    action: IndexAction,
    table: &TableRef,
    hints: &IndexHints,
) -> Option<String> {
    let name_filter = match hints {
        IndexHints::None => return None,
        IndexHints::AllNonClustered => String::new(),
        IndexHints::Named(names) => {
            let names: Vec<String> = names.iter().map(|n| quote_literal(n)).collect();
            format!(" AND sys.indexes.name IN ({})", names.join(", "))
        }
    };
    // The table name sits inside a string literal of the dynamic SQL
    let target = table.qualified().replace('\'', "''");
    Some(format!(
        "DECLARE @sql AS VARCHAR(MAX)=''; \
         SELECT @sql = @sql + 'ALTER INDEX [' + sys.indexes.name + '] ON {target} {action};' \
         FROM sys.indexes \
         JOIN sys.objects ON sys.indexes.object_id = sys.objects.object_id \
         JOIN sys.schemas ON sys.objects.schema_id = sys.schemas.schema_id \
         WHERE sys.indexes.type_desc = 'NONCLUSTERED' \
         AND sys.objects.type_desc = 'USER_TABLE' \
         AND sys.schemas.name = {schema} \
         AND sys.objects.name = {table}{name_filter}; \
         EXEC(@sql);",
        action = action.as_str(),
        schema = quote_literal(&table.schema),
        table = quote_literal(&table.table),
    ))
}
