use crate::{
    SqliteError,
    extract::{bind_value, extract_value},
};
use rusqlite::params_from_iter;
use std::{fmt, sync::Arc};
use tether_core::{Connection, ConnectionId, RowLabeled, RowNames, RowsAffected, Statement, Value};
use tokio::{sync::Mutex, task::spawn_blocking};

/// One SQLite session.
///
/// Statements run on the blocking thread pool. With auto-commit disabled the
/// first statement opens the transaction with `BEGIN IMMEDIATE`, so a writer
/// waits for the database lock up front instead of failing halfway.
///
/// The session lock is taken before a statement is handed to the blocking
/// pool and held until it finishes there. Calls therefore run in issue order
/// even when the future of an earlier one was dropped, a rollback issued after
/// a cancelled statement runs once that statement is done.
pub struct SqliteConnection {
    pub(crate) id: ConnectionId,
    pub(crate) connection: Arc<Mutex<rusqlite::Connection>>,
    pub(crate) auto_commit: bool,
}

impl SqliteConnection {
    async fn blocking<T, F>(&self, work: F) -> Result<T, SqliteError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let connection = self.connection.clone().lock_owned().await;
        Ok(spawn_blocking(move || work(&connection)).await??)
    }

    /// Whether SQLite currently has an open transaction.
    pub async fn in_transaction(&self) -> Result<bool, SqliteError> {
        self.blocking(|connection| Ok(!connection.is_autocommit()))
            .await
    }
}

fn begin_if_needed(connection: &rusqlite::Connection, auto_commit: bool) -> rusqlite::Result<()> {
    if !auto_commit && connection.is_autocommit() {
        connection.execute_batch("BEGIN IMMEDIATE")?;
    }
    Ok(())
}

impl Connection for SqliteConnection {
    type Error = SqliteError;

    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn execute(&mut self, statement: &Statement) -> Result<RowsAffected, SqliteError> {
        let sql = statement.sql().to_owned();
        let params: Vec<_> = statement.params.iter().map(bind_value).collect();
        let auto_commit = self.auto_commit;
        self.blocking(move |connection| {
            begin_if_needed(connection, auto_commit)?;
            let mut prepared = connection.prepare(&sql)?;
            let rows_affected = prepared.execute(params_from_iter(params.iter()))? as u64;
            Ok(RowsAffected {
                rows_affected,
                last_affected_id: Some(connection.last_insert_rowid()).filter(|id| *id != 0),
            })
        })
        .await
    }

    async fn fetch(&mut self, statement: &Statement) -> Result<Vec<RowLabeled>, SqliteError> {
        let sql = statement.sql().to_owned();
        let params: Vec<_> = statement.params.iter().map(bind_value).collect();
        let auto_commit = self.auto_commit;
        self.blocking(move |connection| {
            begin_if_needed(connection, auto_commit)?;
            let mut prepared = connection.prepare(&sql)?;
            let labels: RowNames = prepared
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();
            let mut rows = prepared.query(params_from_iter(params.iter()))?;
            let mut result = Vec::new();
            while let Some(row) = rows.next()? {
                let values = (0..labels.len())
                    .map(|i| row.get_ref(i).map(extract_value))
                    .collect::<rusqlite::Result<Box<[Value]>>>()?;
                result.push(RowLabeled::new(labels.clone(), values));
            }
            Ok(result)
        })
        .await
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    async fn set_auto_commit(&mut self, enabled: bool) -> Result<(), SqliteError> {
        if enabled && !self.auto_commit {
            self.blocking(|connection| {
                if !connection.is_autocommit() {
                    connection.execute_batch("COMMIT")?;
                }
                Ok(())
            })
            .await?;
        }
        self.auto_commit = enabled;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SqliteError> {
        self.blocking(|connection| {
            if !connection.is_autocommit() {
                connection.execute_batch("COMMIT")?;
            }
            Ok(())
        })
        .await
    }

    async fn rollback(&mut self) -> Result<(), SqliteError> {
        self.blocking(|connection| {
            if !connection.is_autocommit() {
                connection.execute_batch("ROLLBACK")?;
            }
            Ok(())
        })
        .await
    }

    async fn close(self) -> Result<(), SqliteError> {
        let Ok(connection) = Arc::try_unwrap(self.connection) else {
            // A detached statement still holds the session, it closes when done.
            return Ok(());
        };
        let connection = connection.into_inner();
        spawn_blocking(move || connection.close().map_err(|(_, e)| e)).await??;
        Ok(())
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("id", &self.id)
            .field("auto_commit", &self.auto_commit)
            .finish()
    }
}
