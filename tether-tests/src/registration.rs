use crate::{MemberRepository, RegistrationService};
use std::sync::LazyLock;
use tether::{ConnectionPool, Driver, ErrorKind, Scope, SqlTemplate, Statement, TransactionCoordinator};
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// A taken member id is recovered with a generated one, other storage errors
/// reach the caller untouched.
pub async fn registration<D: Driver>(pool: &ConnectionPool<D>) {
    let _lock = MUTEX.lock().await;
    let template = SqlTemplate::new(TransactionCoordinator::new(pool.clone()));
    let members = MemberRepository::new(template.clone());
    let service = RegistrationService::new(members.clone());
    let mut scope = Scope::new();

    let first = service
        .join(&mut scope, "myId")
        .await
        .expect("The first registration failed");
    assert_eq!(first.member_id, "myId");
    let second = service
        .join(&mut scope, "myId")
        .await
        .expect("The second registration should recover");
    assert_ne!(second.member_id, "myId");
    assert!(second.member_id.starts_with("myId"));
    assert_eq!(
        members
            .find_by_id(&mut scope, &second.member_id)
            .await
            .expect("The recovered member was not saved")
            .money,
        0
    );

    let error = template
        .execute(
            &mut scope,
            "save",
            &Statement::new("INSERT INTO member (member_id, money) VALUES (?, ?)")
                .bind("someone")
                .bind(Option::<i64>::None),
        )
        .await
        .expect_err("A null balance must be rejected");
    assert_eq!(error.kind(), Some(ErrorKind::ConstraintViolation));

    let error = template
        .fetch(&mut scope, "typo", &Statement::new("SELEC * FROM member"))
        .await
        .expect_err("A malformed query must fail");
    assert_eq!(error.kind(), Some(ErrorKind::SyntaxError));
    assert!(!error.portable().unwrap().is_transient());

    let error = members
        .find_by_id(&mut scope, "nobody")
        .await
        .expect_err("Nobody is not a member");
    assert!(matches!(error, tether::Error::EmptyResult { .. }));

    for member in [first, second] {
        members
            .delete(&mut scope, &member.member_id)
            .await
            .expect("Failed to delete a member");
    }
    assert_eq!(pool.status().in_use, 0);
}
