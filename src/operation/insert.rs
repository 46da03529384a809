use super::Operation;
use crate::error::BulkError;
use crate::executor::{AsyncBulkConnection, AsyncConnector, BulkConnection, Connector};
use crate::identity::ColumnDirection;
use crate::record::BulkRecord;

/// Bulk insert.
///
/// Without an output identity the records are bulk loaded straight into the
/// target. With `ColumnDirection::InputOutput` they are staged in `#TmpTable`
/// and inserted with `INSERT ... OUTPUT`, and the generated identities are
/// assigned back onto the records in order.
pub struct BulkInsert<'r, R> {
    op: Operation<'r, R>,
}

impl<'r, R: BulkRecord> BulkInsert<'r, R> {
    pub(crate) fn new(op: Operation<'r, R>) -> Self {
        Self { op }
    }

    /// Designate the identity column; the database assigns its values
    pub fn set_identity_column(self, field: &str) -> Self {
        self.set_identity_column_with_direction(field, ColumnDirection::Input)
    }

    pub fn set_identity_column_with_direction(mut self, field: &str, direction: ColumnDirection) -> Self {
        self.op.set_identity_column(field, direction);
        self
    }

    /// Run in a new connection and transaction
    pub fn commit<K: Connector>(self, connector: &K) -> Result<(), BulkError> {
        self.op.commit(connector).map(|_| ())
    }

    /// Run inside the caller's open transaction
    pub fn commit_in<C: BulkConnection>(self, connection: &mut C) -> Result<(), BulkError> {
        self.op.commit_in(connection).map(|_| ())
    }

    pub async fn commit_async<K: AsyncConnector>(self, connector: &K) -> Result<(), BulkError> {
        self.op.commit_async(connector).await.map(|_| ())
    }

    pub async fn commit_in_async<C: AsyncBulkConnection>(self, connection: &mut C) -> Result<(), BulkError> {
        self.op.commit_in_async(connection).await.map(|_| ())
    }
}
