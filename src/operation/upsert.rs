use super::Operation;
use crate::error::BulkError;
use crate::executor::{AsyncBulkConnection, AsyncConnector, BulkConnection, Connector};
use crate::identity::ColumnDirection;
use crate::predicate::Condition;
use crate::record::BulkRecord;

/// Bulk insert-or-update through one `MERGE`.
///
/// Matched rows are updated, unmatched records inserted. With
/// `delete_when_not_matched`, target rows no record matched are deleted,
/// optionally narrowed by `delete_when`.
pub struct BulkInsertOrUpdate<'r, R> {
    op: Operation<'r, R>,
}

impl<'r, R: BulkRecord> BulkInsertOrUpdate<'r, R> {
    pub(crate) fn new(op: Operation<'r, R>) -> Self {
        Self { op }
    }

    pub fn match_target_on(mut self, field: &str) -> Self {
        self.op.match_target_on(field);
        self
    }

    /// Only update matched target rows that also satisfy `condition`
    pub fn update_when(mut self, condition: Condition) -> Self {
        self.op.matched_predicates.push(condition);
        self
    }

    /// Only delete unmatched target rows that satisfy `condition`.
    /// Requires `delete_when_not_matched(true)`.
    pub fn delete_when(mut self, condition: Condition) -> Self {
        self.op.unmatched_source_predicates.push(condition);
        self
    }

    /// Delete target rows that match no record
    pub fn delete_when_not_matched(mut self, delete: bool) -> Self {
        self.op.delete_when_not_matched = delete;
        self
    }

    pub fn set_identity_column(self, field: &str) -> Self {
        self.set_identity_column_with_direction(field, ColumnDirection::Input)
    }

    /// With `InputOutput`, identities of inserted and updated rows are assigned back onto the records
    pub fn set_identity_column_with_direction(mut self, field: &str, direction: ColumnDirection) -> Self {
        self.op.set_identity_column(field, direction);
        self
    }

    /// Run in a new connection and transaction, returning the rows inserted, updated and deleted
    pub fn commit<K: Connector>(self, connector: &K) -> Result<u64, BulkError> {
        self.op.commit(connector)
    }

    pub fn commit_in<C: BulkConnection>(self, connection: &mut C) -> Result<u64, BulkError> {
        self.op.commit_in(connection)
    }

    pub async fn commit_async<K: AsyncConnector>(self, connector: &K) -> Result<u64, BulkError> {
        self.op.commit_async(connector).await
    }

    pub async fn commit_in_async<C: AsyncBulkConnection>(self, connection: &mut C) -> Result<u64, BulkError> {
        self.op.commit_in_async(connection).await
    }
}
