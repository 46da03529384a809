//! Fluent bulk operations
//!
//! ```no_run
//! use bulkguard::{BulkOperations, BulkRecord, BulkguardConfig, Connector};
//!
//! #[derive(BulkRecord, Default)]
//! #[rename_all = "PascalCase"]
//! struct Book {
//!     id: i32,
//!     isbn: String,
//!     title: String,
//! }
//!
//! # fn example(connector: &impl Connector, books: &mut [Book]) -> Result<(), bulkguard::BulkError> {
//! let affected = BulkOperations::new(BulkguardConfig::with_url("Server=db;Database=Books"))
//!     .setup::<Book>()
//!     .for_collection(books)
//!     .with_table("Books")
//!     .add_all_columns()
//!     .bulk_insert_or_update()
//!     .match_target_on("isbn")
//!     .set_identity_column("id")
//!     .commit(connector)?;
//! println!("{affected} rows merged");
//! # Ok(())
//! # }
//! ```
//!
//! Builder methods never fail: the first configuration error is kept and
//! returned by `commit`, before any connection is opened. Each operation is
//! consumed by its commit.

mod delete;
mod insert;
mod update;
mod upsert;

#[cfg(test)]
mod tests;

pub use delete::BulkDelete;
pub use insert::BulkInsert;
pub use update::BulkUpdate;
pub use upsert::BulkInsertOrUpdate;

use crate::column_set::{flat_field, ColumnSet, CustomColumnMapping, ResolvedColumn};
use crate::config::BulkguardConfig;
use crate::error::{BulkError, ConfigError};
use crate::executor::{
    AsyncBulkConnection, AsyncBulkExecutor, AsyncConnector, BulkConnection, BulkExecutor, Connector,
    TransactionScope,
};
use crate::identity::{load_output_identities, validate_writable, ColumnDirection, IdentityColumn};
use crate::index::{index_management_cmd, IndexAction, IndexHints};
use crate::plan::{ExecutionPlan, PlanOutcome, StepRole};
use crate::predicate::{build_predicate_query, Condition, ParameterNamer, SqlParameter};
use crate::record::BulkRecord;
use crate::schema::{TableRef, TableSchema, TMP_TABLE};
use crate::settings::{BulkCopyOption, BulkCopySettings};
use crate::statement::{
    build_statement, drop_table_cmd, output_create_table_cmd, select_output_cmd, OperationKind,
    StatementParts, TARGET_ALIAS, TMP_OUTPUT,
};
use crate::table::materialize;
use std::marker::PhantomData;
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "tracing")]
use tracing::Instrument;

/// Entry point of the fluent surface
#[derive(Debug, Clone, Default)]
pub struct BulkOperations {
    config: BulkguardConfig,
}

impl BulkOperations {
    pub fn new(config: BulkguardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BulkguardConfig {
        &self.config
    }

    /// Start configuring an operation over records of type `R`
    pub fn setup<R: BulkRecord>(&self) -> CollectionSetup<R> {
        CollectionSetup {
            config: self.config.clone(),
            _record: PhantomData,
        }
    }
}

pub struct CollectionSetup<R> {
    config: BulkguardConfig,
    _record: PhantomData<R>,
}

impl<R: BulkRecord> CollectionSetup<R> {
    /// The records to stage. Output identities are written back into this slice.
    pub fn for_collection(self, records: &mut [R]) -> TableSetup<'_, R> {
        TableSetup {
            core: OperationCore {
                settings: BulkCopySettings::from(&self.config),
                config: self.config,
                records,
                table: None,
                schema: TableRef::DEFAULT_SCHEMA.to_string(),
                database: None,
                columns: ColumnSet::new(),
                mapping: CustomColumnMapping::new(),
                index_hints: IndexHints::None,
                identity: None,
                error: None,
            },
        }
    }
}

/// Target, columns and tuning shared by every operation kind
pub(crate) struct OperationCore<'r, R> {
    config: BulkguardConfig,
    records: &'r mut [R],
    table: Option<String>,
    schema: String,
    database: Option<String>,
    columns: ColumnSet,
    mapping: CustomColumnMapping,
    settings: BulkCopySettings,
    index_hints: IndexHints,
    identity: Option<IdentityColumn>,
    error: Option<ConfigError>,
}

impl<'r, R: BulkRecord> OperationCore<'r, R> {
    fn record(&mut self, result: Result<(), ConfigError>) {
        if let Err(err) = result {
            if self.error.is_none() {
                self.error = Some(err);
            }
        }
    }

    fn set_identity(&mut self, field: &str, direction: ColumnDirection) {
        if let Some(existing) = &self.identity {
            let err = ConfigError::DuplicateIdentityColumn {
                existing: existing.field.clone(),
                requested: field.to_string(),
            };
            self.record(Err(err));
            return;
        }
        let added = self.columns.add::<R>(field);
        match (added, R::field(field)) {
            (Ok(()), Some(descriptor)) => {
                self.identity = Some(IdentityColumn::new(descriptor.name, direction));
            }
            (added, _) => self.record(added),
        }
    }

    fn table_ref(&self) -> Result<TableRef, ConfigError> {
        let table = match self.table.as_deref().map(str::trim) {
            Some(table) if !table.is_empty() => table,
            _ => return Err(ConfigError::MissingTableName),
        };
        let table_ref = TableRef::new(self.schema.clone(), table);
        Ok(match &self.database {
            Some(database) => table_ref.with_database(database.clone()),
            None => table_ref,
        })
    }
}

/// Table, column and tuning configuration before an operation kind is chosen
pub struct TableSetup<'r, R> {
    core: OperationCore<'r, R>,
}

fn strip_brackets(name: &str) -> &str {
    let name = name.trim();
    name.strip_prefix('[')
        .and_then(|n| n.strip_suffix(']'))
        .unwrap_or(name)
}

impl<'r, R: BulkRecord> TableSetup<'r, R> {
    /// Target table. A `schema.table` name also sets the schema.
    pub fn with_table(mut self, name: &str) -> Self {
        match name.rsplit_once('.') {
            Some((schema, table)) => {
                self.core.schema = strip_brackets(schema).to_string();
                self.core.table = Some(strip_brackets(table).to_string());
            }
            None => self.core.table = Some(strip_brackets(name).to_string()),
        }
        self
    }

    /// Target schema, `dbo` unless set
    pub fn with_schema(mut self, schema: &str) -> Self {
        self.core.schema = strip_brackets(schema).to_string();
        self
    }

    /// Read the catalog of, and write into, another database on the same server
    pub fn with_database(mut self, database: &str) -> Self {
        self.core.database = Some(strip_brackets(database).to_string());
        self
    }

    pub fn with_column(mut self, field: &str) -> Self {
        let result = self.core.columns.add::<R>(field);
        self.core.record(result);
        self
    }

    /// Stage every field with a flat column type, in declaration order
    pub fn add_all_columns(mut self) -> Self {
        self.core.columns.add_all::<R>();
        self
    }

    pub fn remove_column(mut self, field: &str) -> Self {
        let result = self.core.columns.remove(field);
        self.core.record(result);
        self
    }

    /// Write `field` to `column` instead of its declared column name
    pub fn with_custom_column_mapping(mut self, field: &str, column: &str) -> Self {
        self.core.mapping.insert(field, column);
        self
    }

    pub fn with_bulk_copy_batch_size(mut self, rows: u32) -> Self {
        self.core.settings.batch_size = rows;
        self
    }

    pub fn with_bulk_copy_timeout(mut self, timeout: Duration) -> Self {
        self.core.settings.bulk_copy_timeout = timeout;
        self
    }

    pub fn with_bulk_copy_enable_streaming(mut self, enable: bool) -> Self {
        self.core.settings.enable_streaming = enable;
        self
    }

    pub fn with_bulk_copy_notify_after(mut self, rows: u32) -> Self {
        self.core.settings.notify_after = rows;
        self
    }

    pub fn with_bulk_copy_options(mut self, options: BulkCopyOption) -> Self {
        self.core.settings.options = options;
        self
    }

    pub fn with_sql_command_timeout(mut self, timeout: Duration) -> Self {
        self.core.settings.command_timeout = timeout;
        self
    }

    /// Disable every non-clustered index of the target for the data statement
    pub fn tmp_disable_all_non_clustered_indexes(mut self) -> Self {
        let result = self.core.index_hints.disable_all_non_clustered();
        self.core.record(result);
        self
    }

    /// Disable one named non-clustered index of the target for the data statement
    pub fn tmp_disable_non_clustered_index(mut self, name: &str) -> Self {
        let result = self.core.index_hints.disable_non_clustered(name);
        self.core.record(result);
        self
    }

    pub fn bulk_insert(self) -> BulkInsert<'r, R> {
        BulkInsert::new(Operation::new(OperationKind::Insert, self.core))
    }

    pub fn bulk_update(self) -> BulkUpdate<'r, R> {
        BulkUpdate::new(Operation::new(OperationKind::Update, self.core))
    }

    pub fn bulk_delete(self) -> BulkDelete<'r, R> {
        BulkDelete::new(Operation::new(OperationKind::Delete, self.core))
    }

    pub fn bulk_insert_or_update(self) -> BulkInsertOrUpdate<'r, R> {
        BulkInsertOrUpdate::new(Operation::new(OperationKind::Upsert, self.core))
    }
}

/// Everything that can be worked out before connecting
struct Prepared {
    table: TableRef,
    columns: Vec<ResolvedColumn>,
    column_names: Vec<String>,
    match_on: Vec<String>,
    /// Identity field and its destination column
    identity: Option<(String, String)>,
    output_identity: bool,
    matched_predicates: String,
    unmatched_source_predicates: String,
    params: Vec<SqlParameter>,
}

impl Prepared {
    fn identity_column(&self) -> Option<&str> {
        self.identity.as_ref().map(|(_, column)| column.as_str())
    }

    fn output_identity_column(&self) -> Option<&str> {
        self.identity_column().filter(|_| self.output_identity)
    }
}

/// One configured operation of any kind; the public operation types wrap it
pub(crate) struct Operation<'r, R> {
    kind: OperationKind,
    core: OperationCore<'r, R>,
    match_on: Vec<&'static str>,
    matched_predicates: Vec<Condition>,
    unmatched_source_predicates: Vec<Condition>,
    delete_when_not_matched: bool,
}

impl<'r, R: BulkRecord> Operation<'r, R> {
    fn new(kind: OperationKind, core: OperationCore<'r, R>) -> Self {
        Self {
            kind,
            core,
            match_on: Vec::new(),
            matched_predicates: Vec::new(),
            unmatched_source_predicates: Vec::new(),
            delete_when_not_matched: false,
        }
    }

    fn match_target_on(&mut self, field: &str) {
        match flat_field::<R>(field) {
            Ok((descriptor, _)) => {
                if !self.match_on.contains(&descriptor.name) {
                    self.match_on.push(descriptor.name);
                }
            }
            Err(err) => self.core.record(Err(err)),
        }
    }

    fn set_identity_column(&mut self, field: &str, direction: ColumnDirection) {
        self.core.set_identity(field, direction);
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(err) = &self.core.error {
            return Err(err.clone());
        }
        if self.kind != OperationKind::Insert && self.match_on.is_empty() {
            return Err(ConfigError::MissingMatchTargetOn {
                operation: self.kind,
            });
        }
        if let Some(field) = self.match_on.iter().find(|f| !self.core.columns.contains(f)) {
            return Err(ConfigError::MatchColumnNotSelected {
                field: field.to_string(),
            });
        }
        if !self.unmatched_source_predicates.is_empty() && !self.delete_when_not_matched {
            return Err(ConfigError::DeletePredicatesWithoutDeleteWhenNotMatched);
        }
        if !self.writes_columns() {
            return Err(ConfigError::NoColumnsSelected { operation: self.kind });
        }
        Ok(())
    }

    /// Every statement but a delete lists the columns other than the identity,
    /// which only a direct `KeepIdentity` load writes
    fn writes_columns(&self) -> bool {
        let identity = self.core.identity.as_ref().map(|id| id.field.as_str());
        let writes_identity = match self.kind {
            OperationKind::Delete => true,
            OperationKind::Insert => {
                self.core.settings.options == BulkCopyOption::KeepIdentity
                    && !self.core.identity.as_ref().is_some_and(|id| id.is_output())
            }
            OperationKind::Update | OperationKind::Upsert => false,
        };
        self.core
            .columns
            .iter()
            .any(|field| writes_identity || Some(field) != identity)
    }

    /// Validate and resolve everything that needs no round trip
    fn prepare(&self) -> Result<Prepared, BulkError> {
        self.validate()?;
        let table = self.core.table_ref()?;
        let mapping = &self.core.mapping;

        let columns = self.core.columns.resolve::<R>(mapping)?;
        let column_names = columns.iter().map(|c| c.column.clone()).collect();
        let match_on = self
            .match_on
            .iter()
            .map(|f| mapping.destination::<R>(f))
            .collect();

        let identity = self
            .core
            .identity
            .as_ref()
            .map(|id| (id.field.clone(), mapping.destination::<R>(&id.field)));
        let output_identity = self.core.identity.as_ref().is_some_and(|id| id.is_output());
        if let (Some((field, column)), true) = (&identity, output_identity) {
            validate_writable::<R>(field, column, self.kind)?;
        }

        let mut namer = ParameterNamer::new();
        let (matched_predicates, mut params) =
            build_predicate_query::<R>(&self.matched_predicates, TARGET_ALIAS, mapping, &mut namer)?;
        let (unmatched_source_predicates, unmatched_params) = build_predicate_query::<R>(
            &self.unmatched_source_predicates,
            TARGET_ALIAS,
            mapping,
            &mut namer,
        )?;
        params.extend(unmatched_params);

        Ok(Prepared {
            table,
            columns,
            column_names,
            match_on,
            identity,
            output_identity,
            matched_predicates,
            unmatched_source_predicates,
            params,
        })
    }

    /// Insert without identity capture loads straight into the target
    fn loads_directly(&self, prepared: &Prepared) -> bool {
        self.kind == OperationKind::Insert && !prepared.output_identity
    }

    fn build_plan(&self, prepared: &Prepared, schema: &TableSchema) -> Result<ExecutionPlan, BulkError> {
        let records: &[R] = &*self.core.records;
        let table = &prepared.table;
        let mut plan = ExecutionPlan::new(self.core.settings.clone());
        let disable = index_management_cmd(IndexAction::Disable, table, &self.core.index_hints);
        let rebuild = index_management_cmd(IndexAction::Rebuild, table, &self.core.index_hints);

        if self.loads_directly(prepared) {
            let keep_identity = self.core.settings.options == BulkCopyOption::KeepIdentity;
            let columns: Vec<ResolvedColumn> = prepared
                .columns
                .iter()
                .filter(|c| keep_identity || prepared.identity_column() != Some(c.column.as_str()))
                .cloned()
                .collect();
            for column in &columns {
                schema.require(&column.column)?;
            }
            plan.load_is_data_step = true;
            if let Some(sql) = disable {
                plan.execute(sql, Vec::new(), StepRole::DisableIndexes);
            }
            plan.bulk_load(table.qualified(), materialize(records, &columns, false, self.kind)?);
            if let Some(sql) = rebuild {
                plan.execute(sql, Vec::new(), StepRole::RebuildIndexes);
            }
            return Ok(plan);
        }

        let with_sequence = prepared.output_identity && self.kind != OperationKind::Insert;
        plan.execute(
            schema.create_temp_table_cmd(&prepared.column_names, with_sequence)?,
            Vec::new(),
            StepRole::Setup,
        );
        plan.bulk_load(
            TMP_TABLE,
            materialize(records, &prepared.columns, with_sequence, self.kind)?,
        );

        let output_identity = prepared.output_identity_column();
        if let Some(identity) = output_identity {
            let identity_type = schema.require(identity)?.type_declaration();
            plan.execute(
                output_create_table_cmd(identity, &identity_type, with_sequence),
                Vec::new(),
                StepRole::Setup,
            );
        }

        if let Some(sql) = disable {
            plan.execute(sql, Vec::new(), StepRole::DisableIndexes);
        }
        let parts = StatementParts {
            table,
            columns: &prepared.column_names,
            match_on: &prepared.match_on,
            identity: prepared.identity_column(),
            output_identity,
            matched_predicates: &prepared.matched_predicates,
            unmatched_source_predicates: &prepared.unmatched_source_predicates,
            delete_when_not_matched: self.delete_when_not_matched,
        };
        plan.execute(
            build_statement(self.kind, &parts),
            prepared.params.clone(),
            StepRole::Data,
        );
        if let Some(sql) = rebuild {
            plan.execute(sql, Vec::new(), StepRole::RebuildIndexes);
        }

        if let Some(identity) = output_identity {
            plan.read_identities(select_output_cmd(identity, with_sequence));
            plan.execute(drop_table_cmd(TMP_OUTPUT), Vec::new(), StepRole::Cleanup);
        }

        Ok(plan)
    }

    fn write_back(&mut self, prepared: &Prepared, outcome: &PlanOutcome) -> Result<(), BulkError> {
        let (Some((field, column)), true) = (&prepared.identity, prepared.output_identity) else {
            return Ok(());
        };
        load_output_identities(
            self.core.records,
            field,
            column,
            &outcome.identity_rows,
            self.kind != OperationKind::Insert,
            self.kind,
        )?;
        Ok(())
    }

    fn run<E: BulkExecutor + ?Sized>(mut self, prepared: &Prepared, executor: &mut E) -> Result<u64, BulkError> {
        let schema = executor.table_columns(&prepared.table)?;
        let plan = self.build_plan(prepared, &schema)?;
        let outcome = plan.run(executor)?;
        self.write_back(prepared, &outcome)?;
        Ok(outcome.affected)
    }

    async fn run_async<E: AsyncBulkExecutor + ?Sized>(
        mut self,
        prepared: &Prepared,
        executor: &mut E,
    ) -> Result<u64, BulkError> {
        let schema = executor.table_columns(&prepared.table).await?;
        let plan = self.build_plan(prepared, &schema)?;
        let outcome = plan.run_async(executor).await?;
        self.write_back(prepared, &outcome)?;
        Ok(outcome.affected)
    }

    /// Validate, or report that there is nothing to do
    fn begin(&self) -> Result<Option<Prepared>, BulkError> {
        let prepared = self.prepare().map_err(|err| {
            log::error!("{} rejected: {err}", self.kind);
            err
        })?;
        if self.core.records.is_empty() {
            log::debug!("{}: empty collection, nothing to do", self.kind);
            return Ok(None);
        }
        Ok(Some(prepared))
    }

    pub(crate) fn commit<K: Connector>(self, connector: &K) -> Result<u64, BulkError> {
        let Some(prepared) = self.begin()? else {
            return Ok(0);
        };
        let (kind, rows, started) = (self.kind, self.core.records.len(), Instant::now());
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::operation_span(kind, &prepared.table.qualified(), rows).entered();

        let url = self.core.config.url.clone();
        let result = match TransactionScope::open(connector, &url) {
            Ok(mut scope) => {
                let result = self.run(&prepared, scope.connection());
                scope.finish(result)
            }
            Err(err) => Err(err),
        };
        report(kind, &prepared.table, rows, started, result)
    }

    pub(crate) fn commit_in<C: BulkConnection>(self, connection: &mut C) -> Result<u64, BulkError> {
        let Some(prepared) = self.begin()? else {
            return Ok(0);
        };
        let (kind, rows, started) = (self.kind, self.core.records.len(), Instant::now());
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::operation_span(kind, &prepared.table.qualified(), rows).entered();

        let mut scope = TransactionScope::Enlisted(connection);
        let result = self.run(&prepared, scope.connection());
        report(kind, &prepared.table, rows, started, scope.finish(result))
    }

    pub(crate) async fn commit_async<K: AsyncConnector>(self, connector: &K) -> Result<u64, BulkError> {
        let Some(prepared) = self.begin()? else {
            return Ok(0);
        };
        let (kind, rows, started) = (self.kind, self.core.records.len(), Instant::now());
        let url = self.core.config.url.clone();

        let fut = async {
            match TransactionScope::open_async(connector, &url).await {
                Ok(mut scope) => {
                    let result = self.run_async(&prepared, scope.connection()).await;
                    scope.finish_async(result).await
                }
                Err(err) => Err(err),
            }
        };
        #[cfg(feature = "tracing")]
        let fut = fut.instrument(tracing_helpers::operation_span(kind, &prepared.table.qualified(), rows));

        let result = fut.await;
        report(kind, &prepared.table, rows, started, result)
    }

    pub(crate) async fn commit_in_async<C: AsyncBulkConnection>(
        self,
        connection: &mut C,
    ) -> Result<u64, BulkError> {
        let Some(prepared) = self.begin()? else {
            return Ok(0);
        };
        let (kind, rows, started) = (self.kind, self.core.records.len(), Instant::now());

        let fut = async {
            let mut scope = TransactionScope::Enlisted(connection);
            let result = self.run_async(&prepared, scope.connection()).await;
            scope.finish_async(result).await
        };
        #[cfg(feature = "tracing")]
        let fut = fut.instrument(tracing_helpers::operation_span(kind, &prepared.table.qualified(), rows));

        let result = fut.await;
        report(kind, &prepared.table, rows, started, result)
    }
}

fn report(
    kind: OperationKind,
    table: &TableRef,
    rows: usize,
    started: Instant,
    result: Result<u64, BulkError>,
) -> Result<u64, BulkError> {
    let elapsed = started.elapsed();
    match &result {
        Ok(affected) => {
            #[cfg(feature = "metrics")]
            METRICS.record_operation(kind, elapsed);
            log::info!("{kind} on {table}: {rows} records staged, {affected} rows affected in {elapsed:?}");
        }
        Err(err) => {
            #[cfg(feature = "metrics")]
            METRICS.record_operation_error(kind);
            log::error!("{kind} on {table} failed after {elapsed:?}: {err}");
        }
    }
    result
}
