use crate::{SQLITE_ERROR_CODES, SqliteConnection, SqliteError};
use rusqlite::OpenFlags;
use std::{
    sync::Arc,
    time::Duration,
};
use tether_core::{ConnectionConfig, ConnectionId, Driver, ErrorCodes};
use tokio::{sync::Mutex, task::spawn_blocking};

/// Opens SQLite databases from urls like `sqlite://path/to/file.sqlite?mode=rwc`.
///
/// Query parameters are handed to SQLite as URI parameters.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDriver {}

impl SqliteDriver {
    pub const fn new() -> Self {
        Self {}
    }
}

impl Driver for SqliteDriver {
    type Connection = SqliteConnection;

    const NAME: &'static str = "sqlite";

    async fn connect(&self, config: &ConnectionConfig) -> Result<SqliteConnection, SqliteError> {
        let prefix = format!("{}://", Self::NAME);
        let url = config.url.as_str();
        let Some(location) = url.strip_prefix(&prefix) else {
            let error = SqliteError::Url(url.to_owned());
            log::error!("{}", error);
            return Err(error);
        };
        let uri = format!("file:{}", location);
        let connection = spawn_blocking(move || {
            let connection = rusqlite::Connection::open_with_flags(
                &uri,
                OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            connection.busy_timeout(Duration::from_secs(5))?;
            connection.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok::<_, rusqlite::Error>(connection)
        })
        .await??;
        Ok(SqliteConnection {
            id: ConnectionId::next(),
            connection: Arc::new(Mutex::new(connection)),
            auto_commit: true,
        })
    }

    fn error_codes(&self) -> ErrorCodes {
        SQLITE_ERROR_CODES
    }
}
