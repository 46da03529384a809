//! Ordered round trips of one bulk operation
//!
//! An operation compiles into an `ExecutionPlan` before anything is sent:
//! temp table DDL, the bulk load, capture table DDL, index disable, the data
//! statement, index rebuild, the capture read and the capture drop. The sync
//! and async runners walk the same plan, so both paths issue identical
//! statements in identical order.

use crate::error::BulkError;
use crate::executor::{translate_sql_error, AsyncBulkExecutor, BulkExecutor, Row};
use crate::predicate::SqlParameter;
use crate::settings::BulkCopySettings;
use crate::table::DataTable;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "tracing")]
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRole {
    /// Temp and capture table DDL
    Setup,
    DisableIndexes,
    /// The statement whose affected-row count is reported
    Data,
    RebuildIndexes,
    /// Capture table drop
    Cleanup,
}

#[derive(Debug, Clone)]
pub enum Step {
    Execute {
        sql: String,
        params: Vec<SqlParameter>,
        role: StepRole,
    },
    BulkLoad {
        destination: String,
        table: DataTable,
    },
    ReadIdentities {
        sql: String,
    },
}

/// What running a plan produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanOutcome {
    /// Rows affected by the data statement, or rows loaded when the load is the data step
    pub affected: u64,
    pub identity_rows: Vec<Row>,
}

#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub steps: Vec<Step>,
    pub settings: BulkCopySettings,
    /// The bulk load writes straight into the target table
    pub load_is_data_step: bool,
}

impl ExecutionPlan {
    pub fn new(settings: BulkCopySettings) -> Self {
        Self {
            steps: Vec::new(),
            settings,
            load_is_data_step: false,
        }
    }

    pub fn execute(&mut self, sql: impl Into<String>, params: Vec<SqlParameter>, role: StepRole) {
        self.steps.push(Step::Execute {
            sql: sql.into(),
            params,
            role,
        });
    }

    pub fn bulk_load(&mut self, destination: impl Into<String>, table: DataTable) {
        self.steps.push(Step::BulkLoad {
            destination: destination.into(),
            table,
        });
    }

    pub fn read_identities(&mut self, sql: impl Into<String>) {
        self.steps.push(Step::ReadIdentities { sql: sql.into() });
    }

    /// Statement text of every `Execute` step, in order
    pub fn statements(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                Step::Execute { sql, .. } | Step::ReadIdentities { sql } => Some(sql.as_str()),
                Step::BulkLoad { .. } => None,
            })
            .collect()
    }

    fn record_load(&self, outcome: &mut PlanOutcome, loaded: u64) {
        #[cfg(feature = "metrics")]
        METRICS.record_rows_staged(loaded as usize);
        if self.load_is_data_step {
            outcome.affected = loaded;
        }
    }

    /// Run every step in order on `executor`
    pub fn run<E: BulkExecutor + ?Sized>(&self, executor: &mut E) -> Result<PlanOutcome, BulkError> {
        executor.set_command_timeout(self.settings.command_timeout);
        let mut outcome = PlanOutcome::default();

        for step in &self.steps {
            match step {
                Step::Execute { sql, params, role } => {
                    #[cfg(feature = "tracing")]
                    let _span = tracing_helpers::execute_step_span(*role, sql).entered();
                    log::debug!("{role:?}: {sql}");

                    let affected = executor.execute(sql, params).map_err(translate_sql_error)?;
                    if *role == StepRole::Data {
                        outcome.affected = affected;
                    }
                }
                Step::BulkLoad { destination, table } => {
                    #[cfg(feature = "tracing")]
                    let _span = tracing_helpers::bulk_load_span(destination, table.row_count()).entered();
                    log::debug!("bulk loading {} rows into {destination}", table.row_count());

                    let loaded = executor
                        .bulk_load(destination, table, &table.column_mappings(), &self.settings)
                        .map_err(translate_sql_error)?;
                    self.record_load(&mut outcome, loaded);
                }
                Step::ReadIdentities { sql } => {
                    #[cfg(feature = "tracing")]
                    let _span = tracing_helpers::read_identities_span().entered();
                    log::debug!("{sql}");

                    outcome.identity_rows = executor.query_all(sql, &[])?;
                }
            }
        }

        Ok(outcome)
    }

    /// Async twin of `run`, awaiting each round trip before the next
    pub async fn run_async<E: AsyncBulkExecutor + ?Sized>(
        &self,
        executor: &mut E,
    ) -> Result<PlanOutcome, BulkError> {
        executor.set_command_timeout(self.settings.command_timeout);
        let mut outcome = PlanOutcome::default();

        for step in &self.steps {
            match step {
                Step::Execute { sql, params, role } => {
                    log::debug!("{role:?}: {sql}");
                    let fut = executor.execute(sql, params);
                    #[cfg(feature = "tracing")]
                    let fut = fut.instrument(tracing_helpers::execute_step_span(*role, sql));

                    let affected = fut.await.map_err(translate_sql_error)?;
                    if *role == StepRole::Data {
                        outcome.affected = affected;
                    }
                }
                Step::BulkLoad { destination, table } => {
                    log::debug!("bulk loading {} rows into {destination}", table.row_count());
                    let mappings = table.column_mappings();
                    let fut = executor.bulk_load(destination, table, &mappings, &self.settings);
                    #[cfg(feature = "tracing")]
                    let fut = fut.instrument(tracing_helpers::bulk_load_span(destination, table.row_count()));

                    let loaded = fut.await.map_err(translate_sql_error)?;
                    self.record_load(&mut outcome, loaded);
                }
                Step::ReadIdentities { sql } => {
                    log::debug!("{sql}");
                    let fut = executor.query_all(sql, &[]);
                    #[cfg(feature = "tracing")]
                    let fut = fut.instrument(tracing_helpers::read_identities_span());

                    outcome.identity_rows = fut.await?;
                }
            }
        }

        Ok(outcome)
    }
}
