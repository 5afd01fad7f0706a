use crate::{RowLabeled, RowsAffected, Statement, VendorError};
use std::{
    fmt::{self, Display},
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
};

/// Process unique identity of a physical session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// One exclusive database session, as seen by the storage driver.
///
/// Auto-commit follows the usual connection semantics: while it is on every
/// statement commits on its own. Turning it off starts a transaction that
/// lasts until `commit` or `rollback`, after which the next statement opens a
/// new one until auto-commit is turned back on.
pub trait Connection: Send + 'static {
    type Error: VendorError;

    fn id(&self) -> ConnectionId;

    /// Run a statement that does not produce rows.
    fn execute(
        &mut self,
        statement: &Statement,
    ) -> impl Future<Output = Result<RowsAffected, Self::Error>> + Send;

    /// Run a query and collect its rows.
    fn fetch(
        &mut self,
        statement: &Statement,
    ) -> impl Future<Output = Result<Vec<RowLabeled>, Self::Error>> + Send;

    fn auto_commit(&self) -> bool;

    /// Turning auto-commit on while a transaction is open commits it.
    fn set_auto_commit(
        &mut self,
        enabled: bool,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn commit(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn rollback(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Close the underlying session.
    fn close(self) -> impl Future<Output = Result<(), Self::Error>> + Send
    where
        Self: Sized;
}
