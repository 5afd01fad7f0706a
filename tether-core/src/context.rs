use crate::{Connection, Driver, Error, PooledConnection, Result};
use std::{
    fmt::{self, Display},
    sync::atomic::{AtomicU64, Ordering},
};

/// Process unique identity of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

/// Handle returned by [`TransactionCoordinator::begin`](crate::TransactionCoordinator::begin),
/// to be passed back to exactly one `commit` or `rollback`.
#[must_use = "a transaction status must be committed or rolled back"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionStatus {
    pub(crate) id: TransactionId,
    pub(crate) new_transaction: bool,
}

impl TransactionStatus {
    pub fn id(&self) -> TransactionId {
        self.id
    }
    /// `false` when `begin` joined a transaction already bound to the scope.
    pub fn is_new_transaction(&self) -> bool {
        self.new_transaction
    }
}

/// A transaction in progress and the connection it runs on.
///
/// The connection is released exactly once, by `commit`, by `rollback` or, if
/// the context is dropped while still active, by `Drop`. The last case hands
/// the connection back to the pool which rolls it back before reuse.
pub struct TransactionContext<D: Driver> {
    id: TransactionId,
    connection: Option<PooledConnection<D>>,
    state: TransactionState,
    auto_commit_suspended: bool,
    rollback_only: bool,
}

impl<D: Driver> TransactionContext<D> {
    pub(crate) fn new(connection: PooledConnection<D>) -> Self {
        Self {
            id: TransactionId::next(),
            connection: Some(connection),
            state: TransactionState::Active,
            auto_commit_suspended: true,
            rollback_only: false,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    pub(crate) fn set_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    pub fn connection(&mut self) -> Option<&mut PooledConnection<D>> {
        self.connection.as_mut()
    }

    /// Commit, restore auto-commit and release the connection.
    ///
    /// If the commit itself fails the connection is released without restoring
    /// auto-commit, the pool rolls it back.
    pub(crate) async fn commit(mut self) -> Result<()> {
        let Some(mut connection) = self.connection.take() else {
            return Err(Error::InvalidState(format!(
                "Transaction {} has no connection to commit",
                self.id
            )));
        };
        let pool = connection.pool().clone();
        if let Err(e) = connection.commit().await {
            let error = Error::Storage(pool.translator().translate("commit", "COMMIT", e));
            log::error!("{:#}", error);
            self.state = TransactionState::RolledBack;
            pool.release(connection).await;
            return Err(error);
        }
        self.state = TransactionState::Committed;
        log::debug!("Committed {} on {}", self.id, connection.id());
        self.restore_auto_commit(&mut connection).await;
        pool.release(connection).await;
        Ok(())
    }

    /// Best effort rollback, failures are logged and the connection is
    /// released in any case.
    ///
    /// Turning auto-commit back on would commit a transaction the rollback
    /// failed to end, so after a failure the connection goes back with
    /// auto-commit off and the pool resets or discards it.
    pub(crate) async fn rollback(mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        let pool = connection.pool().clone();
        self.state = TransactionState::RolledBack;
        match connection.rollback().await {
            Ok(()) => {
                log::debug!("Rolled back {} on {}", self.id, connection.id());
                self.restore_auto_commit(&mut connection).await;
            }
            Err(e) => log::error!(
                "{:#}",
                Error::Storage(pool.translator().translate("rollback", "ROLLBACK", e))
            ),
        }
        pool.release(connection).await;
    }

    async fn restore_auto_commit(&mut self, connection: &mut PooledConnection<D>) {
        if !self.auto_commit_suspended {
            return;
        }
        match connection.set_auto_commit(true).await {
            Ok(()) => self.auto_commit_suspended = false,
            Err(e) => log::error!(
                "{:#}",
                Error::Storage(connection.pool().translator().translate(
                    "set_auto_commit",
                    "",
                    e
                ))
            ),
        }
    }
}

impl<D: Driver> Drop for TransactionContext<D> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            log::warn!(
                "Transaction {} on {} dropped while {:?}, rolling back",
                self.id,
                connection.id(),
                self.state
            );
            self.state = TransactionState::RolledBack;
            let pool = connection.pool().clone();
            pool.release_detached(connection);
        }
    }
}

impl<D: Driver> fmt::Debug for TransactionContext<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("id", &self.id)
            .field("connection", &self.connection.as_ref().map(|c| c.id()))
            .field("state", &self.state)
            .field("auto_commit_suspended", &self.auto_commit_suspended)
            .field("rollback_only", &self.rollback_only)
            .finish()
    }
}
