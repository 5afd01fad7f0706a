mod support;

#[cfg(test)]
mod tests {
    use crate::support::{Event, FakeDriver, init_logs};
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };
    use tether_core::{Connection, ConnectionPool, Error, ErrorKind, MAX_CONNECTIONS, PoolConfig};
    use tokio::time::{Instant, sleep};

    #[tokio::test]
    async fn reuses_released_connection() {
        init_logs();
        let driver = FakeDriver::new();
        let pool = driver.pool(2, Duration::from_secs(1));
        let first = pool.acquire().await.expect("first acquire");
        let id = first.id();
        pool.release(first).await;
        let second = pool.acquire().await.expect("second acquire");
        assert_eq!(second.id(), id);
        let status = pool.status();
        assert_eq!(status.capacity, 2);
        assert_eq!(status.in_use, 1);
        assert_eq!(status.opened, 1);
        assert_eq!(status.acquired, 2);
        assert_eq!(status.released, 1);
        pool.release(second).await;
        let status = pool.status();
        assert_eq!(status.in_use, 0);
        assert_eq!(status.idle, 1);
    }

    #[test]
    fn rejects_invalid_capacity() {
        init_logs();
        let config = PoolConfig::from_url("fake://memory").unwrap();
        for max_connections in [0, MAX_CONNECTIONS + 1, usize::MAX] {
            let result = ConnectionPool::new(
                FakeDriver::new(),
                config.clone().with_max_connections(max_connections),
            );
            assert!(
                matches!(result, Err(Error::Config(..))),
                "{} connections should be rejected",
                max_connections
            );
        }
    }

    #[tokio::test]
    async fn opens_lazily_up_to_capacity() {
        init_logs();
        let driver = FakeDriver::new();
        let pool = driver.pool(3, Duration::from_secs(1));
        assert_eq!(pool.status().opened, 0);
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(pool.status().opened, 2);
        assert_eq!(driver.count(|e| matches!(e, Event::Connect(..))), 2);
        pool.release(a).await;
        pool.release(b).await;
    }

    #[tokio::test]
    async fn waiter_proceeds_after_release() {
        init_logs();
        let driver = FakeDriver::new();
        let pool = driver.pool(1, Duration::from_secs(2));
        let held = pool.acquire().await.unwrap();
        let held_id = held.id();
        let start = Instant::now();
        let (_, waited) = tokio::join!(
            async {
                sleep(Duration::from_millis(50)).await;
                pool.release(held).await;
            },
            async { pool.acquire().await }
        );
        let waited = waited.expect("the waiter should get the released connection");
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(waited.id(), held_id);
        pool.release(waited).await;
    }

    #[tokio::test]
    async fn exhausted_after_timeout() {
        init_logs();
        let driver = FakeDriver::new();
        let pool = driver.pool(1, Duration::from_millis(30));
        let held = pool.acquire().await.unwrap();
        let start = Instant::now();
        let result = pool.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
        match result {
            Err(Error::PoolExhausted { timeout }) => {
                assert_eq!(timeout, Duration::from_millis(30))
            }
            other => panic!("Expected PoolExhausted, got {:?}", other),
        }
        let result = pool.acquire_timeout(Duration::from_millis(5)).await;
        assert!(matches!(result, Err(Error::PoolExhausted { .. })));
        pool.release(held).await;
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn waiters_are_served_in_order() {
        init_logs();
        let driver = FakeDriver::new();
        let pool = driver.pool(1, Duration::from_secs(2));
        let order = Arc::new(Mutex::new(Vec::new()));
        let held = pool.acquire().await.unwrap();
        let waiter = |n: usize| {
            let pool = pool.clone();
            let order = order.clone();
            async move {
                let connection = pool.acquire().await.unwrap();
                order.lock().unwrap().push(n);
                sleep(Duration::from_millis(5)).await;
                pool.release(connection).await;
            }
        };
        tokio::join!(
            waiter(1),
            waiter(2),
            waiter(3),
            async {
                sleep(Duration::from_millis(20)).await;
                pool.release(held).await;
            }
        );
        assert_eq!(*order.lock().unwrap(), [1, 2, 3]);
        assert_eq!(pool.status().opened, 1);
    }

    #[tokio::test]
    async fn release_inside_transaction_resets_connection() {
        init_logs();
        let driver = FakeDriver::new();
        let pool = driver.pool(1, Duration::from_secs(1));
        let mut connection = pool.acquire().await.unwrap();
        let id = connection.id();
        connection.set_auto_commit(false).await.unwrap();
        pool.release(connection).await;
        let events = driver.events();
        assert!(events.contains(&Event::Rollback(id)));
        assert_eq!(events.last(), Some(&Event::AutoCommit(id, true)));
        let connection = pool.acquire().await.unwrap();
        assert_eq!(connection.id(), id);
        assert!(connection.auto_commit());
        pool.release(connection).await;
        assert_eq!(driver.rollbacks(), 1);
    }

    #[tokio::test]
    async fn dropped_connection_frees_its_slot() {
        init_logs();
        let driver = FakeDriver::new();
        let pool = driver.pool(1, Duration::from_millis(100));
        let connection = pool.acquire().await.unwrap();
        drop(connection);
        assert_eq!(pool.status().in_use, 0);
        let connection = pool.acquire().await.expect("the slot should be free");
        assert_eq!(pool.status().opened, 2);
        pool.release(connection).await;
    }

    #[tokio::test]
    async fn closed_pool() {
        init_logs();
        let driver = FakeDriver::new();
        let pool = driver.pool(2, Duration::from_secs(1));
        let idle = pool.acquire().await.unwrap();
        let idle_id = idle.id();
        pool.release(idle).await;
        let busy = pool.acquire().await.unwrap();
        let busy_id = busy.id();
        assert_eq!(busy_id, idle_id);
        let other = pool.acquire().await.unwrap();
        let other_id = other.id();
        pool.release(other).await;
        pool.close().await;
        assert!(pool.is_closed());
        assert!(driver.events().contains(&Event::Close(other_id)));
        assert!(matches!(pool.acquire().await, Err(Error::PoolClosed)));
        pool.release(busy).await;
        assert!(driver.events().contains(&Event::Close(busy_id)));
        assert_eq!(pool.status().idle, 0);
    }

    #[tokio::test]
    async fn connect_failure_is_translated() {
        init_logs();
        let driver = FakeDriver::new();
        *driver.state.fail_connect.lock().unwrap() = true;
        let pool = driver.pool(1, Duration::from_secs(1));
        let error = pool.acquire().await.expect_err("connect should fail");
        let portable = error.portable().expect("a storage error");
        assert_eq!(portable.kind(), ErrorKind::ConnectionFailure);
        assert_eq!(portable.operation(), "connect");
        assert_eq!(portable.vendor_code(), Some(90046));
        assert!(portable.is_transient());
        assert_eq!(pool.status().in_use, 0);
    }
}
