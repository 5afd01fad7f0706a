use crate::{
    Connection, ConnectionPool, Driver, Error, PooledConnection, Result, Scope, TransactionContext,
    TransactionStatus,
};

/// Begins, commits and rolls back transactions bound to a [`Scope`].
///
/// A `begin` on a scope that already has an active transaction joins it, the
/// returned status is not new and its `commit` is a no-op while its `rollback`
/// marks the transaction rollback-only. Only the owner finishes the
/// transaction and releases the connection.
pub struct TransactionCoordinator<D: Driver> {
    pool: ConnectionPool<D>,
}

impl<D: Driver> Clone for TransactionCoordinator<D> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

impl<D: Driver> TransactionCoordinator<D> {
    pub fn new(pool: ConnectionPool<D>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &ConnectionPool<D> {
        &self.pool
    }

    pub async fn begin(&self, scope: &mut Scope<D>) -> Result<TransactionStatus> {
        if let Some(id) = scope.transaction_id().filter(|_| scope.is_in_transaction()) {
            log::debug!("Joining {} in {}", id, scope.key());
            return Ok(TransactionStatus {
                id,
                new_transaction: false,
            });
        }
        let mut connection = self.pool.acquire().await?;
        if let Err(e) = connection.set_auto_commit(false).await {
            let error = Error::Storage(self.pool.translator().translate("begin", "BEGIN", e));
            log::error!("{:#}", error);
            self.pool.release(connection).await;
            return Err(error);
        }
        let context = TransactionContext::new(connection);
        let status = TransactionStatus {
            id: context.id(),
            new_transaction: true,
        };
        log::debug!("Began {} in {}", status.id, scope.key());
        scope.bind(context);
        Ok(status)
    }

    /// Commit the transaction of `status`.
    ///
    /// A transaction marked rollback-only is rolled back instead and the call
    /// fails with [`Error::InvalidState`].
    pub async fn commit(&self, scope: &mut Scope<D>, status: TransactionStatus) -> Result<()> {
        self.check(scope, &status, "commit")?;
        if !status.is_new_transaction() {
            log::debug!("{} joined, the owner commits", status.id);
            return Ok(());
        }
        let Some(context) = scope.unbind() else {
            return Err(self.invalid(scope, &status, "commit"));
        };
        if context.is_rollback_only() {
            log::warn!(
                "{} was marked rollback-only, rolling back instead of committing",
                status.id
            );
            context.rollback().await;
            return Err(Error::InvalidState(format!(
                "Transaction {} is rollback-only and was rolled back",
                status.id
            )));
        }
        context.commit().await
    }

    /// Roll back the transaction of `status`.
    ///
    /// Failures of the underlying rollback are logged, the connection is
    /// released regardless. A joined participant only marks the transaction
    /// rollback-only.
    pub async fn rollback(&self, scope: &mut Scope<D>, status: TransactionStatus) -> Result<()> {
        self.check(scope, &status, "roll back")?;
        if !status.is_new_transaction() {
            if let Some(context) = scope.transaction_mut() {
                log::debug!("Marking {} rollback-only", status.id);
                context.set_rollback_only();
            }
            return Ok(());
        }
        if let Some(context) = scope.unbind() {
            context.rollback().await;
        }
        Ok(())
    }

    /// Connection of the transaction bound to `scope`, if any.
    pub fn current_connection<'s>(
        &self,
        scope: &'s mut Scope<D>,
    ) -> Option<&'s mut PooledConnection<D>> {
        scope.current_connection()
    }

    fn check(&self, scope: &Scope<D>, status: &TransactionStatus, action: &str) -> Result<()> {
        if scope.is_in_transaction() && scope.transaction_id() == Some(status.id) {
            return Ok(());
        }
        Err(self.invalid(scope, status, action))
    }

    fn invalid(&self, scope: &Scope<D>, status: &TransactionStatus, action: &str) -> Error {
        let error = Error::InvalidState(format!(
            "Cannot {} {}: it is not the active transaction of {}",
            action,
            status.id,
            scope.key()
        ));
        log::error!("{:#}", error);
        error
    }
}
