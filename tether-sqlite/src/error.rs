use tether_core::{ErrorCodes, VendorError};
use tokio::task::JoinError;

/// Result codes of SQLite, grouped by portable kind.
///
/// Extended codes missing here are looked up by their primary code, the low
/// byte, so `SQLITE_BUSY_TIMEOUT` counts as `SQLITE_BUSY`.
pub const SQLITE_ERROR_CODES: ErrorCodes = ErrorCodes {
    database: "sqlite",
    // SQLITE_CONSTRAINT_PRIMARYKEY, SQLITE_CONSTRAINT_UNIQUE
    duplicate_key: &[1555, 2067],
    // SQLITE_CONSTRAINT and its extended codes, SQLITE_TOOBIG, SQLITE_MISMATCH, SQLITE_RANGE
    constraint_violation: &[19, 275, 531, 787, 1043, 1299, 1811, 2579, 3091, 18, 20, 25],
    // SQLITE_ERROR: syntax errors, unknown tables and columns
    syntax_error: &[1],
    // SQLITE_IOERR, SQLITE_CORRUPT, SQLITE_FULL, SQLITE_CANTOPEN, SQLITE_NOTADB
    connection_failure: &[10, 11, 13, 14, 26],
    // SQLITE_BUSY, SQLITE_LOCKED and their extended codes
    transient: &[5, 6, 261, 262, 517],
};

#[derive(Debug, thiserror::Error)]
pub enum SqliteError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("Expected the sqlite connection url to start with `sqlite://`, got `{0}`")]
    Url(String),
    #[error("The blocking task running the statement did not complete: {0}")]
    Task(#[from] JoinError),
}

impl VendorError for SqliteError {
    fn vendor_code(&self) -> Option<i32> {
        match self {
            SqliteError::Sqlite(rusqlite::Error::SqliteFailure(error, ..)) => {
                Some(error.extended_code)
            }
            SqliteError::Sqlite(rusqlite::Error::SqlInputError { error, .. }) => {
                Some(error.extended_code)
            }
            _ => None,
        }
    }

    fn base_code(&self) -> Option<i32> {
        self.vendor_code().map(|code| code & 0xff)
    }

    fn sql_state(&self) -> Option<&str> {
        match self {
            SqliteError::Url(..) => Some("08001"),
            _ => None,
        }
    }
}
