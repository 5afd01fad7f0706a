use crate::{
    Connection, ConnectionPool, Driver, Error, Result, RowLabeled, RowsAffected, Scope, Statement,
    TransactionCoordinator, truncate_long,
};

/// Runs repository statements on the right connection.
///
/// Inside a transaction every call uses the transaction's connection, outside
/// of one a connection is borrowed from the pool for the single statement and
/// released right after. Driver errors always come out translated as
/// [`Error::Storage`].
pub struct SqlTemplate<D: Driver> {
    coordinator: TransactionCoordinator<D>,
}

impl<D: Driver> Clone for SqlTemplate<D> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<D: Driver> SqlTemplate<D> {
    pub fn new(coordinator: TransactionCoordinator<D>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &TransactionCoordinator<D> {
        &self.coordinator
    }

    pub fn pool(&self) -> &ConnectionPool<D> {
        self.coordinator.pool()
    }

    pub async fn execute(
        &self,
        scope: &mut Scope<D>,
        operation: &str,
        statement: &Statement,
    ) -> Result<RowsAffected> {
        if let Some(connection) = self.coordinator.current_connection(scope) {
            return self.execute_on(connection, operation, statement).await;
        }
        let mut connection = self.pool().acquire().await?;
        let result = self.execute_on(&mut connection, operation, statement).await;
        self.pool().release(connection).await;
        result
    }

    pub async fn fetch(
        &self,
        scope: &mut Scope<D>,
        operation: &str,
        statement: &Statement,
    ) -> Result<Vec<RowLabeled>> {
        if let Some(connection) = self.coordinator.current_connection(scope) {
            return self.fetch_on(connection, operation, statement).await;
        }
        let mut connection = self.pool().acquire().await?;
        let result = self.fetch_on(&mut connection, operation, statement).await;
        self.pool().release(connection).await;
        result
    }

    /// Exactly the first row, [`Error::EmptyResult`] when there is none.
    pub async fn fetch_one(
        &self,
        scope: &mut Scope<D>,
        operation: &str,
        statement: &Statement,
    ) -> Result<RowLabeled> {
        self.fetch_optional(scope, operation, statement)
            .await?
            .ok_or_else(|| Error::EmptyResult {
                operation: operation.to_owned(),
            })
    }

    pub async fn fetch_optional(
        &self,
        scope: &mut Scope<D>,
        operation: &str,
        statement: &Statement,
    ) -> Result<Option<RowLabeled>> {
        Ok(self
            .fetch(scope, operation, statement)
            .await?
            .into_iter()
            .next())
    }

    /// Run a statement on a connection the caller manages.
    pub async fn execute_on(
        &self,
        connection: &mut D::Connection,
        operation: &str,
        statement: &Statement,
    ) -> Result<RowsAffected> {
        log::debug!(
            "{} `{}` {}",
            connection.id(),
            operation,
            truncate_long!(statement.sql)
        );
        connection
            .execute(statement)
            .await
            .map_err(|e| self.storage_error(operation, statement, e))
    }

    /// Run a query on a connection the caller manages.
    pub async fn fetch_on(
        &self,
        connection: &mut D::Connection,
        operation: &str,
        statement: &Statement,
    ) -> Result<Vec<RowLabeled>> {
        log::debug!(
            "{} `{}` {}",
            connection.id(),
            operation,
            truncate_long!(statement.sql)
        );
        connection
            .fetch(statement)
            .await
            .map_err(|e| self.storage_error(operation, statement, e))
    }

    fn storage_error(
        &self,
        operation: &str,
        statement: &Statement,
        error: <D::Connection as Connection>::Error,
    ) -> Error {
        let error = Error::Storage(self.pool().translator().translate(
            operation,
            &statement.to_string(),
            error,
        ));
        log::error!("{:#}", error);
        error
    }
}
