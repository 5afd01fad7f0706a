use crate::{Driver, PooledConnection, TransactionContext, TransactionId, TransactionState};
use std::{
    fmt::{self, Display},
    sync::atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeKey(u64);

impl ScopeKey {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

/// Propagation key of one logical operation.
///
/// Passed down the call chain as `&mut Scope<D>`, it holds the transaction the
/// operation is running in, if any. Each concurrent operation creates its own
/// scope, repository calls made with it resolve to the bound transaction's
/// connection.
/// ```rust,ignore
/// let mut scope = Scope::new();
/// unit_of_work
///     .run(&mut scope, async |scope| repository.update(scope, "memberA", 8000).await)
///     .await?;
/// ```
pub struct Scope<D: Driver> {
    key: ScopeKey,
    transaction: Option<TransactionContext<D>>,
}

impl<D: Driver> Scope<D> {
    pub fn new() -> Self {
        Self {
            key: ScopeKey::next(),
            transaction: None,
        }
    }

    pub fn key(&self) -> ScopeKey {
        self.key
    }

    pub fn is_in_transaction(&self) -> bool {
        self.transaction.as_ref().is_some_and(|t| t.is_active())
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction.as_ref().map(TransactionContext::id)
    }

    pub fn transaction_state(&self) -> Option<TransactionState> {
        self.transaction.as_ref().map(TransactionContext::state)
    }

    pub fn is_rollback_only(&self) -> bool {
        self.transaction
            .as_ref()
            .is_some_and(TransactionContext::is_rollback_only)
    }

    /// The connection of the bound transaction.
    pub fn current_connection(&mut self) -> Option<&mut PooledConnection<D>> {
        self.transaction
            .as_mut()
            .filter(|t| t.is_active())
            .and_then(TransactionContext::connection)
    }

    pub(crate) fn transaction_mut(&mut self) -> Option<&mut TransactionContext<D>> {
        self.transaction.as_mut()
    }

    pub(crate) fn bind(&mut self, context: TransactionContext<D>) {
        debug_assert!(self.transaction.is_none());
        self.transaction = Some(context);
    }

    pub(crate) fn unbind(&mut self) -> Option<TransactionContext<D>> {
        self.transaction.take()
    }

    /// Move the bound transaction into a new scope with the same key.
    pub(crate) fn detach(&mut self) -> Self {
        Self {
            key: self.key,
            transaction: self.transaction.take(),
        }
    }
}

impl<D: Driver> Default for Scope<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Driver> fmt::Debug for Scope<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("key", &self.key)
            .field("transaction", &self.transaction)
            .finish()
    }
}
