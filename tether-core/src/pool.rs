use crate::{
    Connection, ConnectionId, Driver, Error, ErrorTranslator, PoolConfig, Result,
};
use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{
    runtime::Handle,
    sync::{OwnedSemaphorePermit, Semaphore},
    time,
};

/// Bounded pool of driver connections.
///
/// Capacity is enforced by a fair semaphore so waiters are served in FIFO
/// order. Sessions are opened lazily and reused through an idle list, the only
/// state shared between concurrent borrowers. Cloning the pool is cheap, all
/// clones share the same sessions.
pub struct ConnectionPool<D: Driver> {
    inner: Arc<PoolInner<D>>,
}

struct PoolInner<D: Driver> {
    driver: D,
    config: PoolConfig,
    translator: ErrorTranslator,
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<IdleConnection<D::Connection>>>,
    closed: AtomicBool,
    opened: AtomicU64,
    acquired: AtomicU64,
    released: AtomicU64,
}

struct IdleConnection<C> {
    connection: C,
    /// Returned without a reset, it may still hold an open transaction.
    needs_reset: bool,
}

/// Point in time view of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub capacity: usize,
    pub idle: usize,
    pub in_use: usize,
    /// Sessions opened since the pool was created.
    pub opened: u64,
    /// Successful acquisitions since the pool was created.
    pub acquired: u64,
    /// Releases since the pool was created.
    pub released: u64,
}

impl<D: Driver> Clone for ConnectionPool<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D: Driver> ConnectionPool<D> {
    /// Fails with [`Error::Config`] when `config` asks for no connections or
    /// for more than [`MAX_CONNECTIONS`](crate::MAX_CONNECTIONS).
    pub fn new(driver: D, config: PoolConfig) -> Result<Self> {
        if let Err(e) = config.validate() {
            log::error!("{:#}", e);
            return Err(e);
        }
        let translator = ErrorTranslator::new(&driver.error_codes());
        let capacity = config.max_connections;
        log::debug!(
            "Creating a {} pool with {} connections to `{}`",
            D::NAME,
            capacity,
            config.connection.url
        );
        Ok(Self {
            inner: Arc::new(PoolInner {
                driver,
                config,
                translator,
                semaphore: Arc::new(Semaphore::new(capacity)),
                idle: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                opened: AtomicU64::new(0),
                acquired: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        })
    }

    pub fn driver(&self) -> &D {
        &self.inner.driver
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn translator(&self) -> &ErrorTranslator {
        &self.inner.translator
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn status(&self) -> PoolStatus {
        let capacity = self.inner.config.max_connections;
        PoolStatus {
            capacity,
            idle: self.lock_idle().len(),
            in_use: capacity.saturating_sub(self.inner.semaphore.available_permits()),
            opened: self.inner.opened.load(Ordering::Relaxed),
            acquired: self.inner.acquired.load(Ordering::Relaxed),
            released: self.inner.released.load(Ordering::Relaxed),
        }
    }

    /// Acquire a connection waiting at most the configured timeout.
    pub async fn acquire(&self) -> Result<PooledConnection<D>> {
        self.acquire_timeout(self.inner.config.acquire_timeout).await
    }

    /// Acquire a connection waiting at most `timeout` for a free slot.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection<D>> {
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }
        let permit = match time::timeout(timeout, self.inner.semaphore.clone().acquire_owned()).await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(..)) => return Err(Error::PoolClosed),
            Err(..) => {
                let error = Error::PoolExhausted { timeout };
                log::warn!("{:#}", error);
                return Err(error);
            }
        };
        loop {
            let idle = self.lock_idle().pop();
            let Some(IdleConnection {
                mut connection,
                needs_reset,
            }) = idle
            else {
                break;
            };
            if needs_reset {
                if let Err(e) = reset(&mut connection).await {
                    log::error!(
                        "Discarding {} because it could not be reset: {:#}",
                        connection.id(),
                        e
                    );
                    close_connection(connection).await;
                    continue;
                }
            }
            return Ok(self.checkout(connection, permit));
        }
        let connection = self
            .inner
            .driver
            .connect(&self.inner.config.connection)
            .await
            .map_err(|e| {
                let error = Error::Storage(self.inner.translator.translate(
                    "connect",
                    self.inner.config.connection.url.as_str(),
                    e,
                ));
                log::error!("{:#}", error);
                error
            })?;
        self.inner.opened.fetch_add(1, Ordering::Relaxed);
        log::debug!("Opened {}", connection.id());
        Ok(self.checkout(connection, permit))
    }

    /// Return a connection to the pool.
    ///
    /// A connection still inside a transaction is rolled back and put back in
    /// auto-commit mode first, a later borrower never inherits uncommitted
    /// work. Once the pool is closed the session is closed instead.
    pub async fn release(&self, connection: PooledConnection<D>) {
        let PooledConnection {
            mut connection,
            permit,
            ..
        } = connection;
        self.inner.released.fetch_add(1, Ordering::Relaxed);
        if self.is_closed() {
            close_connection(connection).await;
            drop(permit);
            return;
        }
        if !connection.auto_commit() {
            log::debug!(
                "{} released inside a transaction, rolling back",
                connection.id()
            );
            if let Err(e) = reset(&mut connection).await {
                log::error!(
                    "Discarding {} because it could not be reset: {:#}",
                    connection.id(),
                    e
                );
                close_connection(connection).await;
                drop(permit);
                return;
            }
        }
        log::debug!("Released {}", connection.id());
        self.lock_idle().push(IdleConnection {
            connection,
            needs_reset: false,
        });
        drop(permit);
    }

    /// Return a connection without awaiting, used from `Drop`.
    ///
    /// Inside a tokio runtime the release runs on a spawned task, otherwise the
    /// connection is parked and reset by the next `acquire`.
    pub(crate) fn release_detached(&self, connection: PooledConnection<D>) {
        match Handle::try_current() {
            Ok(handle) => {
                let pool = self.clone();
                handle.spawn(async move { pool.release(connection).await });
            }
            Err(..) => {
                let PooledConnection {
                    connection, permit, ..
                } = connection;
                self.inner.released.fetch_add(1, Ordering::Relaxed);
                if !self.is_closed() {
                    self.lock_idle().push(IdleConnection {
                        needs_reset: !connection.auto_commit(),
                        connection,
                    });
                }
                drop(permit);
            }
        }
    }

    /// Shut the pool down. Waiters fail with [`Error::PoolClosed`], idle
    /// sessions are closed, connections released later are closed too.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.semaphore.close();
        let idle = std::mem::take(&mut *self.lock_idle());
        log::debug!("Closing the pool and {} idle connections", idle.len());
        for IdleConnection { connection, .. } in idle {
            close_connection(connection).await;
        }
    }

    fn checkout(
        &self,
        connection: D::Connection,
        permit: OwnedSemaphorePermit,
    ) -> PooledConnection<D> {
        self.inner.acquired.fetch_add(1, Ordering::Relaxed);
        log::debug!("Acquired {}", connection.id());
        PooledConnection {
            connection,
            permit,
            pool: self.clone(),
        }
    }

    fn lock_idle(&self) -> MutexGuard<'_, Vec<IdleConnection<D::Connection>>> {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<D: Driver> fmt::Debug for ConnectionPool<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("driver", &D::NAME)
            .field("status", &self.status())
            .finish()
    }
}

/// Connection checked out of a [`ConnectionPool`].
///
/// Give it back with [`ConnectionPool::release`]. Dropping it instead closes
/// the session and frees its slot, the database discards whatever transaction
/// was still open on it.
pub struct PooledConnection<D: Driver> {
    connection: D::Connection,
    permit: OwnedSemaphorePermit,
    pool: ConnectionPool<D>,
}

impl<D: Driver> PooledConnection<D> {
    pub fn id(&self) -> ConnectionId {
        self.connection.id()
    }

    pub fn pool(&self) -> &ConnectionPool<D> {
        &self.pool
    }
}

impl<D: Driver> Deref for PooledConnection<D> {
    type Target = D::Connection;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl<D: Driver> DerefMut for PooledConnection<D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.connection
    }
}

impl<D: Driver> fmt::Debug for PooledConnection<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PooledConnection({})", self.connection.id())
    }
}

/// Roll back whatever is open and go back to auto-commit.
pub(crate) async fn reset<C: Connection>(connection: &mut C) -> std::result::Result<(), C::Error> {
    connection.rollback().await?;
    connection.set_auto_commit(true).await
}

async fn close_connection<C: Connection>(connection: C) {
    let id = connection.id();
    if let Err(e) = connection.close().await {
        log::warn!("Error while closing {}: {}", id, e);
    } else {
        log::debug!("Closed {}", id);
    }
}
