use std::collections::HashSet;
use tether::{ConnectionPool, Driver, Scope, TransactionCoordinator, UnitOfWork, future::join_all};

/// A released session is handed to the next borrower.
pub async fn connection_reuse<D: Driver>(pool: &ConnectionPool<D>) {
    let connection = pool.acquire().await.expect("Failed to acquire a connection");
    let id = connection.id();
    pool.release(connection).await;
    let connection = pool.acquire().await.expect("Failed to acquire a connection");
    assert_eq!(connection.id(), id);
    pool.release(connection).await;
    let status = pool.status();
    assert_eq!(status.in_use, 0);
    assert!(status.idle >= 1);
    assert!(status.opened as usize <= status.capacity);
}

/// Concurrent units of work each get their own connection.
pub async fn concurrent_units_of_work<D: Driver>(pool: &ConnectionPool<D>) {
    let unit_of_work = UnitOfWork::new(TransactionCoordinator::new(pool.clone()));
    let count = pool.config().max_connections.min(4);
    let held = join_all((0..count).map(|_| pool.acquire())).await;
    let mut held = held
        .into_iter()
        .collect::<tether::Result<Vec<_>>>()
        .expect("Failed to fill the pool");
    let expected: HashSet<_> = held.iter().map(|c| c.id()).collect();
    assert_eq!(expected.len(), count);
    for connection in held.drain(..) {
        pool.release(connection).await;
    }
    let barrier = tokio::sync::Barrier::new(count);
    let runs = (0..count).map(|_| {
        let unit_of_work = unit_of_work.clone();
        let barrier = &barrier;
        async move {
            let mut scope = Scope::new();
            unit_of_work
                .run(&mut scope, async |scope| {
                    let id = scope.current_connection().map(|c| c.id());
                    barrier.wait().await;
                    tether::Result::Ok(id)
                })
                .await
                .expect("The unit of work failed")
        }
    });
    let ids: HashSet<_> = join_all(runs).await.into_iter().flatten().collect();
    assert_eq!(ids.len(), count);
    assert_eq!(pool.status().in_use, 0);
}
