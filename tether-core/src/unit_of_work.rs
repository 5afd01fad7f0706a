use crate::{ConnectionPool, Driver, Error, Result, Scope, SqlTemplate, TransactionCoordinator};

/// Runs a piece of work inside one transaction.
///
/// The work commits when it returns `Ok` and rolls back when it returns `Err`,
/// the failure then comes back as [`Error::OperationFailed`] with the original
/// error as its cause. Nested runs on the same scope join the outer
/// transaction, a failing inner run makes the outer one rollback-only.
///
/// ```rust,ignore
/// let mut scope = Scope::new();
/// unit_of_work
///     .run(&mut scope, async |scope| {
///         members.update(scope, "memberA", 8000).await?;
///         members.update(scope, "memberB", 12000).await
///     })
///     .await?;
/// ```
pub struct UnitOfWork<D: Driver> {
    coordinator: TransactionCoordinator<D>,
}

impl<D: Driver> Clone for UnitOfWork<D> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<D: Driver> UnitOfWork<D> {
    pub fn new(coordinator: TransactionCoordinator<D>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &TransactionCoordinator<D> {
        &self.coordinator
    }

    pub fn pool(&self) -> &ConnectionPool<D> {
        self.coordinator.pool()
    }

    /// Repository adapter sharing this unit of work's coordinator.
    pub fn template(&self) -> SqlTemplate<D> {
        SqlTemplate::new(self.coordinator.clone())
    }

    pub async fn run<T, E, F>(&self, scope: &mut Scope<D>, work: F) -> Result<T>
    where
        F: AsyncFnOnce(&mut Scope<D>) -> std::result::Result<T, E>,
        E: Into<anyhow::Error>,
    {
        let status = self.coordinator.begin(scope).await?;
        if !status.is_new_transaction() {
            return match work(scope).await {
                Ok(value) => {
                    self.coordinator.commit(scope, status).await?;
                    Ok(value)
                }
                Err(e) => {
                    self.coordinator.rollback(scope, status).await?;
                    Err(Error::OperationFailed(e.into()))
                }
            };
        }
        // Owned by this future, dropping it mid-work rolls the transaction back.
        let mut scope = scope.detach();
        match work(&mut scope).await {
            Ok(value) => {
                self.coordinator.commit(&mut scope, status).await?;
                Ok(value)
            }
            Err(e) => {
                let cause = e.into();
                log::debug!("{} failed: {:#}, rolling back", status.id(), cause);
                self.coordinator.rollback(&mut scope, status).await?;
                Err(Error::OperationFailed(cause))
            }
        }
    }
}

/// A service whose methods run in transactions.
///
/// Implemented by services using the `#[transactional]` attribute, which wraps
/// the method body in [`UnitOfWork::run`] on the returned unit of work.
pub trait TransactionalService {
    type Driver: Driver;

    fn unit_of_work(&self) -> &UnitOfWork<Self::Driver>;
}
