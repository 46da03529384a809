//! In-memory executor for tests
//!
//! `MockConnection` implements the sync and async executor and connection
//! traits without a database. It records every call, keeps every bulk-loaded
//! `DataTable`, answers catalog queries from tables registered with
//! `add_table`, and serves scripted query results and failures.
//!
//! Statement semantics are shallow: `MERGE` and `INSERT INTO` statements
//! report the row count of the most recent bulk load as affected rows unless
//! `script_affected` says otherwise. Rows bulk-loaded straight into a target
//! are kept per table, and unguarded data statements are applied to them from
//! the last `#TmpTable` load. Rollback does not undo applied rows.
//!
//! `MockConnector` hands out connections that share one state, so a test can
//! inspect what an operation did after the operation dropped its connection.

use crate::error::BulkError;
use crate::executor::{
    AsyncBulkConnection, AsyncBulkExecutor, AsyncConnector, BulkConnection, BulkExecutor, Connector,
    Row,
};
use crate::predicate::SqlParameter;
use crate::schema::{CatalogColumn, TableRef};
use crate::settings::BulkCopySettings;
use crate::table::{ColumnMapping, DataTable};
use async_trait::async_trait;
use sea_query::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// One round trip, in call order
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Execute(String),
    Query(String),
    BulkLoad { destination: String, rows: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatement {
    pub sql: String,
    pub params: Vec<SqlParameter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedLoad {
    pub destination: String,
    pub table: DataTable,
    pub mappings: Vec<ColumnMapping>,
    pub settings: BulkCopySettings,
}

/// A target row held by the mock, keyed by column name
pub type StoredRow = BTreeMap<String, Value>;

#[derive(Debug, Clone)]
struct ScriptedFailure {
    pattern: String,
    code: Option<u32>,
    message: String,
}

/// Everything a mock connection saw and will answer
#[derive(Debug, Clone, Default)]
pub struct MockState {
    pub calls: Vec<MockCall>,
    /// Executed statements and queries with their parameters
    pub statements: Vec<RecordedStatement>,
    pub loads: Vec<RecordedLoad>,
    pub connections_opened: usize,
    pub connection_strings: Vec<String>,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub command_timeout: Option<Duration>,
    tables: Vec<(TableRef, Vec<CatalogColumn>)>,
    query_results: Vec<(String, Vec<Row>)>,
    affected: Vec<(String, u64)>,
    failures: Vec<ScriptedFailure>,
    fail_rollback: bool,
    targets: Vec<(String, Vec<StoredRow>)>,
}

impl MockState {
    /// Rows bulk-loaded into `destination` across all loads
    pub fn rows_loaded(&self, destination: &str) -> usize {
        self.loads
            .iter()
            .filter(|l| l.destination == destination)
            .map(|l| l.table.row_count())
            .sum()
    }

    /// The most recent load into `destination`
    pub fn last_load(&self, destination: &str) -> Option<&RecordedLoad> {
        self.loads.iter().rev().find(|l| l.destination == destination)
    }

    /// Current rows of a target table, e.g. `[dbo].[Books]`
    pub fn table_rows(&self, table: &str) -> &[StoredRow] {
        self.targets
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, rows)| rows.as_slice())
            .unwrap_or(&[])
    }

    /// Text of every executed statement, excluding queries
    pub fn executed(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                MockCall::Execute(sql) => Some(sql.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn round_trips(&self) -> usize {
        self.calls.len()
    }

    fn check_failure(&self, sql: &str) -> Result<(), BulkError> {
        match self.failures.iter().find(|f| sql.contains(&f.pattern)) {
            Some(failure) => Err(BulkError::Database {
                code: failure.code,
                message: failure.message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn execute(&mut self, sql: &str, params: &[SqlParameter]) -> Result<u64, BulkError> {
        self.calls.push(MockCall::Execute(sql.to_string()));
        self.statements.push(RecordedStatement {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        self.check_failure(sql)?;
        self.apply_data_statement(sql);

        if let Some(index) = self.affected.iter().position(|(p, _)| sql.contains(p.as_str())) {
            return Ok(self.affected.remove(index).1);
        }
        if sql.starts_with("MERGE") || sql.starts_with("INSERT INTO") {
            return Ok(self.loads.last().map_or(0, |l| l.table.row_count() as u64));
        }
        Ok(0)
    }

    fn query_all(&mut self, sql: &str, params: &[SqlParameter]) -> Result<Vec<Row>, BulkError> {
        self.calls.push(MockCall::Query(sql.to_string()));
        self.statements.push(RecordedStatement {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        self.check_failure(sql)?;

        if sql.contains("INFORMATION_SCHEMA.COLUMNS") {
            return Ok(self.catalog_rows(params));
        }
        match self.query_results.iter().position(|(p, _)| sql.contains(p.as_str())) {
            Some(index) => Ok(self.query_results.remove(index).1),
            None => Ok(Vec::new()),
        }
    }

    fn catalog_rows(&self, params: &[SqlParameter]) -> Vec<Row> {
        let param = |name: &str| {
            params
                .iter()
                .find(|p| p.name == name)
                .and_then(|p| match &p.value {
                    Value::String(Some(s)) => Some(s.clone()),
                    _ => None,
                })
        };
        let (Some(schema), Some(table)) = (param("@TableSchema"), param("@TableName")) else {
            return Vec::new();
        };
        self.tables
            .iter()
            .find(|(t, _)| t.schema.eq_ignore_ascii_case(&schema) && t.table.eq_ignore_ascii_case(&table))
            .map(|(_, columns)| columns.iter().map(catalog_row).collect())
            .unwrap_or_default()
    }

    fn bulk_load(
        &mut self,
        destination: &str,
        table: &DataTable,
        mappings: &[ColumnMapping],
        settings: &BulkCopySettings,
    ) -> Result<u64, BulkError> {
        self.calls.push(MockCall::BulkLoad {
            destination: destination.to_string(),
            rows: table.row_count(),
        });
        self.check_failure(destination)?;
        self.loads.push(RecordedLoad {
            destination: destination.to_string(),
            table: table.clone(),
            mappings: mappings.to_vec(),
            settings: settings.clone(),
        });
        if !destination.starts_with('#') {
            let rows = stored_rows(table, mappings);
            self.target_rows_mut(destination).extend(rows);
        }
        Ok(table.row_count() as u64)
    }

    fn target_rows_mut(&mut self, table: &str) -> &mut Vec<StoredRow> {
        let index = match self.targets.iter().position(|(name, _)| name == table) {
            Some(index) => index,
            None => {
                self.targets.push((table.to_string(), Vec::new()));
                self.targets.len() - 1
            }
        };
        &mut self.targets[index].1
    }

    fn apply_data_statement(&mut self, sql: &str) {
        let Some(staged) = self
            .last_load("#TmpTable")
            .map(|l| stored_rows(&l.table, &l.table.column_mappings()))
        else {
            return;
        };
        if let Some(rest) = sql.strip_prefix("INSERT INTO ") {
            let Some((table, rest)) = rest.split_once(" (") else {
                return;
            };
            let columns = identifiers(rest.split_once(')').map_or("", |(list, _)| list));
            let inserted: Vec<StoredRow> = staged.iter().map(|row| project(row, &columns)).collect();
            self.target_rows_mut(table).extend(inserted);
        } else if let Some(rest) = sql.strip_prefix("MERGE INTO ") {
            // Guards are not evaluated, so guarded statements leave the target alone
            if sql.contains("WHEN MATCHED AND") || sql.contains("NOT MATCHED BY SOURCE AND") {
                return;
            }
            let Some(merge) = MergeClauses::parse(rest) else {
                return;
            };
            let rows = self.target_rows_mut(&merge.table);
            merge.apply(rows, &staged);
        }
    }

    fn rollback(&mut self) -> Result<(), BulkError> {
        self.rollbacks += 1;
        if self.fail_rollback {
            return Err(BulkError::Transaction("connection lost".to_string()));
        }
        Ok(())
    }
}

/// The clauses of a generated `MERGE` the mock knows how to apply
struct MergeClauses {
    table: String,
    keys: Vec<String>,
    update: Option<Vec<String>>,
    delete_matched: bool,
    insert: Option<Vec<String>>,
    delete_not_matched: bool,
}

impl MergeClauses {
    fn parse(rest: &str) -> Option<Self> {
        let (table, rest) = rest.split_once(" WITH (HOLDLOCK)")?;
        let (_, rest) = rest.split_once(" ON ")?;
        let (on, matched) = rest.split_once("WHEN MATCHED THEN ")?;
        let (matched, not_matched) = match matched.split_once("WHEN NOT MATCHED BY TARGET THEN ") {
            Some((matched, not_matched)) => (matched, Some(not_matched)),
            None => (matched, None),
        };
        let update = matched
            .strip_prefix("UPDATE SET ")
            .map(|set| assigned_columns(set.split(" OUTPUT ").next().unwrap_or(set)));
        let insert = not_matched.and_then(|clause| {
            let list = clause.strip_prefix("INSERT (")?.split_once(") values")?.0;
            Some(identifiers(list))
        });
        Some(Self {
            table: table.to_string(),
            keys: assigned_columns(on),
            update,
            delete_matched: matched.starts_with("DELETE"),
            insert,
            delete_not_matched: rest.contains("WHEN NOT MATCHED BY SOURCE THEN DELETE"),
        })
    }

    fn apply(&self, rows: &mut Vec<StoredRow>, staged: &[StoredRow]) {
        let mut matched = vec![false; rows.len()];
        let mut deleted = vec![false; rows.len()];
        for source in staged {
            let hit = rows[..matched.len()]
                .iter()
                .position(|row| self.keys.iter().all(|k| row.get(k) == source.get(k)));
            match hit {
                Some(i) => {
                    matched[i] = true;
                    if let Some(columns) = &self.update {
                        for column in columns {
                            if let Some(value) = source.get(column) {
                                rows[i].insert(column.clone(), value.clone());
                            }
                        }
                    } else if self.delete_matched {
                        deleted[i] = true;
                    }
                }
                None => {
                    if let Some(columns) = &self.insert {
                        rows.push(project(source, columns));
                    }
                }
            }
        }
        if self.delete_not_matched {
            for (flag, hit) in deleted.iter_mut().zip(&matched) {
                *flag |= !hit;
            }
        }
        let mut index = 0;
        rows.retain(|_| {
            let keep = !deleted.get(index).copied().unwrap_or(false);
            index += 1;
            keep
        });
    }
}

/// Names inside `[...]` in order, skipping the `Target` and `Source` aliases
fn identifiers(text: &str) -> Vec<String> {
    text.split('[')
        .skip(1)
        .filter_map(|part| part.split_once(']').map(|(name, _)| name.to_string()))
        .filter(|name| name != "Target" && name != "Source")
        .collect()
}

/// Left-hand columns of `[Target].[a] = [Source].[a]` pairs
fn assigned_columns(text: &str) -> Vec<String> {
    identifiers(text).into_iter().step_by(2).collect()
}

fn project(row: &StoredRow, columns: &[String]) -> StoredRow {
    columns
        .iter()
        .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
        .collect()
}

fn stored_rows(table: &DataTable, mappings: &[ColumnMapping]) -> Vec<StoredRow> {
    table
        .rows
        .iter()
        .map(|row| {
            mappings
                .iter()
                .filter_map(|m| {
                    let value = row.get(table.column_index(&m.source)?)?;
                    Some((m.destination.clone(), value.clone()))
                })
                .collect()
        })
        .collect()
}

fn catalog_row(column: &CatalogColumn) -> Row {
    vec![
        Value::String(Some(column.name.clone())),
        Value::String(Some(column.data_type.clone())),
        Value::Int(column.max_length),
        Value::Int(column.numeric_precision),
        Value::Int(column.numeric_scale),
        Value::Int(column.datetime_precision),
        Value::String(Some(if column.is_nullable { "YES" } else { "NO" }.to_string())),
    ]
}

/// Handle to mock state shared by a connector and its connections
#[derive(Debug, Clone, Default)]
struct SharedState(Arc<Mutex<MockState>>);

impl SharedState {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockConnection {
    state: SharedState,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn state(&self) -> MockState {
        self.state.lock().clone()
    }

    /// Register catalog columns for a table
    pub fn add_table(&self, table: TableRef, columns: Vec<CatalogColumn>) {
        self.state.lock().tables.push((table, columns));
    }

    /// Answer the next query containing `pattern` with `rows`
    pub fn script_query(&self, pattern: &str, rows: Vec<Row>) {
        self.state.lock().query_results.push((pattern.to_string(), rows));
    }

    /// Report `affected` for the next statement containing `pattern`
    pub fn script_affected(&self, pattern: &str, affected: u64) {
        self.state.lock().affected.push((pattern.to_string(), affected));
    }

    /// Fail every statement, query or load destination containing `pattern`
    pub fn fail_on(&self, pattern: &str, code: Option<u32>, message: &str) {
        self.state.lock().failures.push(ScriptedFailure {
            pattern: pattern.to_string(),
            code,
            message: message.to_string(),
        });
    }

    pub fn fail_rollback(&self) {
        self.state.lock().fail_rollback = true;
    }
}

impl BulkExecutor for MockConnection {
    fn execute(&mut self, sql: &str, params: &[SqlParameter]) -> Result<u64, BulkError> {
        self.state.lock().execute(sql, params)
    }

    fn query_all(&mut self, sql: &str, params: &[SqlParameter]) -> Result<Vec<Row>, BulkError> {
        self.state.lock().query_all(sql, params)
    }

    fn bulk_load(
        &mut self,
        destination: &str,
        table: &DataTable,
        mappings: &[ColumnMapping],
        settings: &BulkCopySettings,
    ) -> Result<u64, BulkError> {
        self.state.lock().bulk_load(destination, table, mappings, settings)
    }

    fn set_command_timeout(&mut self, timeout: Duration) {
        self.state.lock().command_timeout = Some(timeout);
    }
}

impl BulkConnection for MockConnection {
    fn begin(&mut self) -> Result<(), BulkError> {
        self.state.lock().begins += 1;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), BulkError> {
        self.state.lock().commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), BulkError> {
        self.state.lock().rollback()
    }
}

#[async_trait]
impl AsyncBulkExecutor for MockConnection {
    async fn execute(&mut self, sql: &str, params: &[SqlParameter]) -> Result<u64, BulkError> {
        self.state.lock().execute(sql, params)
    }

    async fn query_all(&mut self, sql: &str, params: &[SqlParameter]) -> Result<Vec<Row>, BulkError> {
        self.state.lock().query_all(sql, params)
    }

    async fn bulk_load(
        &mut self,
        destination: &str,
        table: &DataTable,
        mappings: &[ColumnMapping],
        settings: &BulkCopySettings,
    ) -> Result<u64, BulkError> {
        self.state.lock().bulk_load(destination, table, mappings, settings)
    }

    fn set_command_timeout(&mut self, timeout: Duration) {
        self.state.lock().command_timeout = Some(timeout);
    }
}

#[async_trait]
impl AsyncBulkConnection for MockConnection {
    async fn begin(&mut self) -> Result<(), BulkError> {
        self.state.lock().begins += 1;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), BulkError> {
        self.state.lock().commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), BulkError> {
        self.state.lock().rollback()
    }
}

/// Opens `MockConnection`s that all share the connector's state
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    connection: MockConnection,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The connection every `connect` call clones; scripting it scripts them all
    pub fn connection(&self) -> &MockConnection {
        &self.connection
    }

    pub fn state(&self) -> MockState {
        self.connection.state()
    }

    pub fn add_table(&self, table: TableRef, columns: Vec<CatalogColumn>) {
        self.connection.add_table(table, columns);
    }

    pub fn script_query(&self, pattern: &str, rows: Vec<Row>) {
        self.connection.script_query(pattern, rows);
    }

    pub fn fail_on(&self, pattern: &str, code: Option<u32>, message: &str) {
        self.connection.fail_on(pattern, code, message);
    }

    pub fn fail_rollback(&self) {
        self.connection.fail_rollback();
    }

    fn open(&self, connection_string: &str) -> MockConnection {
        let mut state = self.connection.state.lock();
        state.connections_opened += 1;
        state.connection_strings.push(connection_string.to_string());
        self.connection.clone()
    }
}

impl Connector for MockConnector {
    type Connection = MockConnection;

    fn connect(&self, connection_string: &str) -> Result<MockConnection, BulkError> {
        Ok(self.open(connection_string))
    }
}

#[async_trait]
impl AsyncConnector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self, connection_string: &str) -> Result<MockConnection, BulkError> {
        Ok(self.open(connection_string))
    }
}
