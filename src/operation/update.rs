use super::Operation;
use crate::error::BulkError;
use crate::executor::{AsyncBulkConnection, AsyncConnector, BulkConnection, Connector};
use crate::identity::ColumnDirection;
use crate::predicate::Condition;
use crate::record::BulkRecord;

/// Bulk update of matched target rows through `MERGE ... WHEN MATCHED THEN UPDATE`
pub struct BulkUpdate<'r, R> {
    op: Operation<'r, R>,
}

impl<'r, R: BulkRecord> BulkUpdate<'r, R> {
    pub(crate) fn new(op: Operation<'r, R>) -> Self {
        Self { op }
    }

    /// Join target rows on `field`; call once per key column
    pub fn match_target_on(mut self, field: &str) -> Self {
        self.op.match_target_on(field);
        self
    }

    /// Only update target rows that also satisfy `condition`
    pub fn update_when(mut self, condition: Condition) -> Self {
        self.op.matched_predicates.push(condition);
        self
    }

    /// Exclude the identity column from the SET list
    pub fn set_identity_column(self, field: &str) -> Self {
        self.set_identity_column_with_direction(field, ColumnDirection::Input)
    }

    pub fn set_identity_column_with_direction(mut self, field: &str, direction: ColumnDirection) -> Self {
        self.op.set_identity_column(field, direction);
        self
    }

    /// Run in a new connection and transaction, returning the rows updated
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
