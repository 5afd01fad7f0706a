use crate::{MEMBER_EX, Member, TransferError, TransferService};
use std::{sync::LazyLock, time::Duration};
use tether::{ConnectionPool, Driver, Error, Scope, TransactionCoordinator, UnitOfWork};
use tokio::{
    sync::Mutex,
    time::{sleep, timeout},
};

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

const MEMBER_A: &str = "memberA";
const MEMBER_B: &str = "memberB";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Manual,
    Coordinated,
    UnitOfWork,
    Declarative,
}

async fn reset<D: Driver>(service: &TransferService<D>, members: &[Member]) {
    let mut scope = Scope::new();
    let repository = service.members();
    for member in [MEMBER_A, MEMBER_B, MEMBER_EX] {
        repository
            .delete(&mut scope, member)
            .await
            .expect("Failed to delete a member");
    }
    for member in members {
        repository
            .save(&mut scope, member)
            .await
            .expect("Failed to save a member");
    }
}

async fn money<D: Driver>(service: &TransferService<D>, member_id: &str) -> i64 {
    service
        .members()
        .find_by_id(&mut Scope::new(), member_id)
        .await
        .expect("Failed to find the member")
        .money
}

async fn transfer<D: Driver>(
    service: &TransferService<D>,
    style: Style,
    from: &str,
    to: &str,
    amount: i64,
) -> Result<(), Error> {
    let mut scope = Scope::new();
    let result = match style {
        Style::Manual => service
            .transfer_manual(from, to, amount)
            .await
            .map_err(|e| Error::OperationFailed(e.into())),
        Style::Coordinated => service
            .transfer_coordinated(&mut scope, from, to, amount)
            .await
            .map_err(|e| Error::OperationFailed(e.into())),
        Style::UnitOfWork => service.transfer(&mut scope, from, to, amount).await,
        Style::Declarative => {
            service
                .transfer_declarative(&mut scope, from, to, amount)
                .await
        }
    };
    assert!(
        !scope.is_in_transaction(),
        "{:?} transfer left a transaction bound to the scope",
        style
    );
    result
}

/// The same transfer in every style: commits on success, rolls back when the
/// receiver is rejected after the sender was debited.
pub async fn transfer_styles<D: Driver>(pool: &ConnectionPool<D>) {
    let _lock = MUTEX.lock().await;
    let service = TransferService::new(UnitOfWork::new(TransactionCoordinator::new(pool.clone())));
    for style in [
        Style::Manual,
        Style::Coordinated,
        Style::UnitOfWork,
        Style::Declarative,
    ] {
        reset(
            &service,
            &[Member::new(MEMBER_A, 10000), Member::new(MEMBER_B, 10000)],
        )
        .await;
        let released = pool.status().released;
        transfer(&service, style, MEMBER_A, MEMBER_B, 2000)
            .await
            .unwrap_or_else(|e| panic!("{:?} transfer failed: {:#}", style, e));
        assert_eq!(pool.status().released, released + 1, "{:?}", style);
        assert_eq!(pool.status().in_use, 0);
        assert_eq!(money(&service, MEMBER_A).await, 8000, "{:?}", style);
        assert_eq!(money(&service, MEMBER_B).await, 12000, "{:?}", style);

        reset(
            &service,
            &[Member::new(MEMBER_A, 10000), Member::new(MEMBER_EX, 10000)],
        )
        .await;
        let released = pool.status().released;
        let error = transfer(&service, style, MEMBER_A, MEMBER_EX, 2000)
            .await
            .expect_err("The transfer to `ex` must fail");
        let rejected = error
            .cause()
            .and_then(|cause| cause.downcast_ref::<TransferError>());
        assert!(
            matches!(rejected, Some(TransferError::Rejected { member_id }) if member_id == MEMBER_EX),
            "{:?} transfer failed with an unexpected error: {:#}",
            style,
            error
        );
        assert_eq!(pool.status().released, released + 1, "{:?}", style);
        assert_eq!(pool.status().in_use, 0);
        assert_eq!(money(&service, MEMBER_A).await, 10000, "{:?}", style);
        assert_eq!(money(&service, MEMBER_EX).await, 10000, "{:?}", style);
    }
    reset(&service, &[]).await;
}

/// Every statement of one unit of work sees the same connection, a storage
/// failure midway undoes the earlier statements.
pub async fn transfer_single_connection<D: Driver>(pool: &ConnectionPool<D>) {
    let _lock = MUTEX.lock().await;
    let unit_of_work = UnitOfWork::new(TransactionCoordinator::new(pool.clone()));
    let service = TransferService::new(unit_of_work.clone());
    let members = service.members();
    reset(
        &service,
        &[Member::new(MEMBER_A, 10000), Member::new(MEMBER_B, 10000)],
    )
    .await;

    let mut scope = Scope::new();
    let connections = unit_of_work
        .run(&mut scope, async |scope| {
            let mut connections = Vec::new();
            for member in [MEMBER_A, MEMBER_B, MEMBER_A] {
                members.find_by_id(scope, member).await?;
                connections.push(scope.current_connection().map(|c| c.id()));
            }
            tether::Result::Ok(connections)
        })
        .await
        .expect("Reading members in one unit of work failed");
    assert!(connections[0].is_some());
    assert!(connections.iter().all(|c| *c == connections[0]));

    let result = unit_of_work
        .run(&mut scope, async |scope| {
            members.update(scope, MEMBER_A, 0).await?;
            members
                .save(scope, &Member::new(MEMBER_B, 1))
                .await?;
            members.update(scope, MEMBER_B, 0).await
        })
        .await;
    let error = result.expect_err("Saving an existing member must fail");
    assert_eq!(error.kind(), Some(tether::ErrorKind::DuplicateKey));
    assert_eq!(money(&service, MEMBER_A).await, 10000);
    assert_eq!(money(&service, MEMBER_B).await, 10000);
    reset(&service, &[]).await;
}

/// A pool of one connection serializes transactions, waiting longer than the
/// acquire timeout fails with `PoolExhausted`.
pub async fn transfer_single_slot<D: Driver>(pool: &ConnectionPool<D>) {
    let _lock = MUTEX.lock().await;
    assert_eq!(pool.config().max_connections, 1);
    let service = TransferService::new(UnitOfWork::new(TransactionCoordinator::new(pool.clone())));
    reset(
        &service,
        &[Member::new(MEMBER_A, 10000), Member::new(MEMBER_B, 10000)],
    )
    .await;

    let (first, second) = tokio::join!(
        async {
            let mut scope = Scope::new();
            service.transfer(&mut scope, MEMBER_A, MEMBER_B, 1000).await
        },
        async {
            let mut scope = Scope::new();
            service
                .transfer_declarative(&mut scope, MEMBER_B, MEMBER_A, 3000)
                .await
        }
    );
    first.expect("The first transfer failed");
    second.expect("The second transfer should wait for the connection");
    assert_eq!(money(&service, MEMBER_A).await, 12000);
    assert_eq!(money(&service, MEMBER_B).await, 8000);
    assert_eq!(pool.status().opened, 1);

    let held = pool.acquire().await.expect("Failed to acquire the connection");
    let mut scope = Scope::new();
    let result = UnitOfWork::new(TransactionCoordinator::new(pool.clone()))
        .run(&mut scope, async |scope| {
            service.members().update(scope, MEMBER_A, 0).await
        })
        .await;
    assert!(
        matches!(result, Err(Error::PoolExhausted { .. })),
        "Expected PoolExhausted, got {:?}",
        result
    );
    pool.release(held).await;
    assert_eq!(money(&service, MEMBER_A).await, 12000);
    reset(&service, &[]).await;
}

/// Dropping a running unit of work rolls its transaction back and gives the
/// connection back to the pool.
pub async fn transfer_cancelled<D: Driver>(pool: &ConnectionPool<D>) {
    let _lock = MUTEX.lock().await;
    let unit_of_work = UnitOfWork::new(TransactionCoordinator::new(pool.clone()));
    let service = TransferService::new(unit_of_work.clone());
    reset(&service, &[Member::new(MEMBER_A, 10000)]).await;

    let mut scope = Scope::new();
    let result = timeout(
        Duration::from_millis(100),
        unit_of_work.run(&mut scope, async |scope| {
            service.members().update(scope, MEMBER_A, 0).await?;
            sleep(Duration::from_secs(10)).await;
            tether::Result::Ok(())
        }),
    )
    .await;
    assert!(result.is_err(), "The unit of work should have been cancelled");
    assert!(!scope.is_in_transaction());
    for _ in 0..100 {
        if pool.status().in_use == 0 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(pool.status().in_use, 0);
    assert_eq!(money(&service, MEMBER_A).await, 10000);
    reset(&service, &[]).await;
}
