//! Operation metrics and tracing spans
//!
//! With the `metrics` feature, operation counts, staged row counts, failures
//! and durations are recorded through OpenTelemetry and exported in
//! Prometheus format from `METRICS.registry`. With the `tracing` feature,
//! `tracing_helpers` opens one span per operation and one per plan step.

#[cfg(feature = "metrics")]
pub use otel::{BulkguardMetrics, METRICS};

#[cfg(feature = "metrics")]
mod otel {
    use crate::statement::OperationKind;
    use once_cell::sync::Lazy;
    use opentelemetry::{
        global,
        metrics::{Counter, Histogram, MeterProvider},
        KeyValue,
    };
    use opentelemetry_sdk::metrics::SdkMeterProvider;

    pub static METRICS: Lazy<BulkguardMetrics> = Lazy::new(BulkguardMetrics::init);

    pub struct BulkguardMetrics {
        /// Provider reading into `registry`; `None` when the exporter could not be
        /// built, in which case instruments come from the global provider
        pub provider: Option<SdkMeterProvider>,
        pub registry: prometheus::Registry,
        pub operations_total: Counter<u64>,
        pub rows_staged_total: Counter<u64>,
        pub operation_errors_total: Counter<u64>,
        pub operation_duration: Histogram<f64>,
    }

    impl BulkguardMetrics {
        pub fn init() -> Self {
            let registry = prometheus::Registry::new();
            let provider = match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => Some(SdkMeterProvider::builder().with_reader(exporter).build()),
                Err(e) => {
                    log::error!("failed to build prometheus exporter: {e}");
                    None
                }
            };
            let meter = match &provider {
                Some(provider) => provider.meter("bulkguard"),
                None => global::meter("bulkguard"),
            };

            let operations_total = meter
                .u64_counter("bulkguard_operations_total")
                .with_description("Bulk operations committed")
                .build();

            let rows_staged_total = meter
                .u64_counter("bulkguard_rows_staged_total")
                .with_description("Rows sent through the bulk transport")
                .build();

            let operation_errors_total = meter
                .u64_counter("bulkguard_operation_errors_total")
                .with_description("Bulk operations that failed")
                .build();

            let operation_duration = meter
                .f64_histogram("bulkguard_operation_duration_seconds")
                .with_description("Duration of bulk operations, catalog read to write-back")
                .build();

            Self {
                provider,
                registry,
                operations_total,
                rows_staged_total,
                operation_errors_total,
                operation_duration,
            }
        }

        pub fn record_operation(&self, operation: OperationKind, elapsed: std::time::Duration) {
            let attrs = [KeyValue::new("operation", operation.as_str())];
            self.operations_total.add(1, &attrs);
            self.operation_duration.record(elapsed.as_secs_f64(), &attrs);
        }

        pub fn record_rows_staged(&self, rows: usize) {
            self.rows_staged_total.add(rows as u64, &[]);
        }

        pub fn record_operation_error(&self, operation: OperationKind) {
            self.operation_errors_total
                .add(1, &[KeyValue::new("operation", operation.as_str())]);
        }
    }

}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use crate::plan::StepRole;
    use crate::statement::OperationKind;
    use tracing::{info_span, Span};

    pub fn operation_span(operation: OperationKind, table: &str, rows: usize) -> Span {
        info_span!("bulkguard.operation", operation = operation.as_str(), table = table, rows = rows)
    }

    pub fn catalog_span(table: &str) -> Span {
        info_span!("bulkguard.catalog", table = table)
    }

    pub fn execute_step_span(role: StepRole, sql: &str) -> Span {
        info_span!("bulkguard.execute", role = ?role, sql = sql)
    }

    pub fn bulk_load_span(destination: &str, rows: usize) -> Span {
        info_span!("bulkguard.bulk_load", destination = destination, rows = rows)
    }

    pub fn read_identities_span() -> Span {
        info_span!("bulkguard.read_identities")
    }

    pub fn begin_transaction_span() -> Span {
        info_span!("bulkguard.begin_transaction")
    }

    pub fn commit_transaction_span() -> Span {
        info_span!("bulkguard.commit_transaction")
    }

    pub fn rollback_transaction_span() -> Span {
        info_span!("bulkguard.rollback_transaction")
    }
}
