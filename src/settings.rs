//! Bulk-copy and command tuning for one operation

use crate::config::BulkguardConfig;
use std::time::Duration;

/// Standard bulk-copy option flags; one is passed per load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BulkCopyOption {
    #[default]
    Default,
    /// Preserve source identity values
    KeepIdentity,
    CheckConstraints,
    /// Hold a bulk-update table lock for the duration of the load
    TableLock,
    /// Preserve nulls instead of applying column defaults
    KeepNulls,
    FireTriggers,
    UseInternalTransaction,
}

/// Tuning handed to the bulk transport and the command executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkCopySettings {
    /// Rows per batch, 0 sends all rows in one batch
    pub batch_size: u32,
    pub bulk_copy_timeout: Duration,
    pub enable_streaming: bool,
    /// Rows between progress notifications, 0 disables them
    pub notify_after: u32,
    pub options: BulkCopyOption,
    pub command_timeout: Duration,
}

impl Default for BulkCopySettings {
    fn default() -> Self {
        Self::from(&BulkguardConfig::default())
    }
}

impl From<&BulkguardConfig> for BulkCopySettings {
    fn from(config: &BulkguardConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            bulk_copy_timeout: config.bulk_copy_timeout(),
            enable_streaming: config.enable_streaming,
            notify_after: config.notify_after,
            options: BulkCopyOption::Default,
            command_timeout: config.command_timeout(),
        }
    }
}
