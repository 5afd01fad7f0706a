use std::{
    error::Error as StdError,
    fmt::{self, Display},
    sync::Arc,
    time::Duration,
};

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while coordinating connections and transactions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No connection became available within the timeout. Retry with backoff.
    #[error("No connection available within {timeout:?}")]
    PoolExhausted { timeout: Duration },
    #[error("The connection pool is closed")]
    PoolClosed,
    /// Transaction API misuse (double commit, foreign status, ...). Not retryable.
    #[error("Invalid transaction state: {0}")]
    InvalidState(String),
    /// Storage layer outcome, already translated from the vendor error.
    #[error(transparent)]
    Storage(#[from] PortableError),
    #[error("Operation `{operation}` returned no rows")]
    EmptyResult { operation: String },
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Configuration error: {0}")]
    Config(String),
    /// The work of a unit of work failed and its transaction was rolled back.
    #[error("Operation failed and was rolled back: {0:#}")]
    OperationFailed(anyhow::Error),
}

impl Error {
    /// The portable storage error carried by this error, looking through
    /// [`Error::OperationFailed`] causes.
    pub fn portable(&self) -> Option<&PortableError> {
        match self {
            Error::Storage(e) => Some(e),
            Error::OperationFailed(cause) => cause.chain().find_map(|e| {
                e.downcast_ref::<PortableError>()
                    .or_else(|| e.downcast_ref::<Error>().and_then(Error::portable))
            }),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.portable().map(PortableError::kind)
    }

    /// The original failure of a rolled back unit of work.
    pub fn cause(&self) -> Option<&anyhow::Error> {
        match self {
            Error::OperationFailed(cause) => Some(cause),
            _ => None,
        }
    }
}

/// Vendor independent classification of a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DuplicateKey,
    ConstraintViolation,
    SyntaxError,
    ConnectionFailure,
    Transient,
    Unknown,
}

impl ErrorKind {
    /// Whether running the same operation again may succeed.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::ConnectionFailure)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::DuplicateKey => "duplicate key",
            ErrorKind::ConstraintViolation => "constraint violation",
            ErrorKind::SyntaxError => "syntax error",
            ErrorKind::ConnectionFailure => "connection failure",
            ErrorKind::Transient => "transient failure",
            ErrorKind::Unknown => "unknown storage error",
        })
    }
}

/// Translated storage error. Immutable once built by the
/// [`ErrorTranslator`](crate::ErrorTranslator).
#[derive(Debug, Clone)]
pub struct PortableError {
    pub(crate) kind: ErrorKind,
    pub(crate) message: String,
    pub(crate) operation: String,
    pub(crate) statement: String,
    pub(crate) vendor_code: Option<i32>,
    pub(crate) sql_state: Option<String>,
    pub(crate) cause: Option<Arc<dyn StdError + Send + Sync>>,
}

impl PortableError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            operation: String::new(),
            statement: String::new(),
            vendor_code: None,
            sql_state: None,
            cause: None,
        }
    }
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
    pub fn message(&self) -> &str {
        &self.message
    }
    pub fn operation(&self) -> &str {
        &self.operation
    }
    pub fn statement(&self) -> &str {
        &self.statement
    }
    pub fn vendor_code(&self) -> Option<i32> {
        self.vendor_code
    }
    pub fn sql_state(&self) -> Option<&str> {
        self.sql_state.as_deref()
    }
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
    /// Same as [`PortableError::is_transient`].
    pub fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

impl Display for PortableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.operation.is_empty() {
            write!(f, " in `{}`", self.operation)?;
        }
        if let Some(code) = self.vendor_code {
            write!(f, " [code {}]", code)?;
        }
        if let Some(state) = &self.sql_state {
            write!(f, " [sqlstate {}]", state)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if !self.statement.is_empty() {
            write!(f, "\nWhile executing:\n{}", self.statement)?;
        }
        Ok(())
    }
}

impl StdError for PortableError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}
