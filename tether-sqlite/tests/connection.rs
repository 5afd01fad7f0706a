#[cfg(test)]
mod tests {
    use indoc::indoc;
    use std::{path::Path, time::Duration};
    use tempfile::TempDir;
    use tether_core::{
        Connection, ConnectionConfig, Driver, ErrorKind, ErrorTranslator, PoolConfig, Statement,
        VendorError,
    };
    use tether_sqlite::{SqliteConnection, SqliteDriver, SqliteError};
    use tether_tests::{init_logs, silent_logs};
    use tokio::time::timeout;

    fn config(path: &Path) -> ConnectionConfig {
        PoolConfig::from_url(&format!("sqlite://{}?mode=rwc", path.display()))
            .expect("Invalid connection url")
            .connection
    }

    async fn count(connection: &mut SqliteConnection) -> i64 {
        let rows = connection
            .fetch(&Statement::new("SELECT COUNT(*) AS total FROM account"))
            .await
            .expect("Count failed");
        rows[0].get("total").unwrap()
    }

    async fn setup(path: &Path) -> (SqliteConnection, SqliteConnection) {
        let driver = SqliteDriver::new();
        let mut first = driver
            .connect(&config(path))
            .await
            .expect("Could not open the database");
        first
            .execute(&Statement::new(
                "CREATE TABLE account (id VARCHAR(10) PRIMARY KEY, money INTEGER NOT NULL)",
            ))
            .await
            .expect("Could not create the table");
        let second = driver
            .connect(&config(path))
            .await
            .expect("Could not open the database");
        assert_ne!(first.id(), second.id());
        (first, second)
    }

    #[tokio::test]
    async fn create_database() {
        init_logs();
        let directory = TempDir::new().unwrap();
        let path = directory.path().join("creation.sqlite");
        assert!(!path.exists());
        let connection = SqliteDriver::new()
            .connect(&config(&path))
            .await
            .expect("Could not open the database");
        assert!(path.exists());
        assert!(connection.auto_commit());
        connection.close().await.expect("Could not close");
    }

    #[tokio::test]
    async fn wrong_url() {
        init_logs();
        let config = PoolConfig::from_url("duckdb://some_value").unwrap().connection;
        silent_logs! {
            let error = SqliteDriver::new().connect(&config).await.expect_err("Wrong scheme");
            assert_eq!(error.sql_state(), Some("08001"));
            let translator = ErrorTranslator::new(&SqliteDriver::new().error_codes());
            assert_eq!(
                translator.translate("connect", "", error).kind(),
                ErrorKind::ConnectionFailure
            );
        };
    }

    #[tokio::test]
    async fn auto_commit_statements_are_visible() {
        init_logs();
        let directory = TempDir::new().unwrap();
        let (mut first, mut second) = setup(&directory.path().join("auto.sqlite")).await;
        let result = first
            .execute(&Statement::new("INSERT INTO account VALUES (?, ?)").bind("a").bind(10))
            .await
            .unwrap();
        assert_eq!(result.rows_affected, 1);
        assert!(!first.in_transaction().await.unwrap());
        assert_eq!(count(&mut second).await, 1);
    }

    #[tokio::test]
    async fn commit_publishes_work() {
        init_logs();
        let directory = TempDir::new().unwrap();
        let (mut first, mut second) = setup(&directory.path().join("commit.sqlite")).await;
        first.set_auto_commit(false).await.unwrap();
        assert!(!first.auto_commit());
        first
            .execute(&Statement::new("INSERT INTO account VALUES ('a', 1)"))
            .await
            .unwrap();
        assert!(first.in_transaction().await.unwrap());
        assert_eq!(count(&mut second).await, 0);
        first.commit().await.unwrap();
        assert_eq!(count(&mut second).await, 1);
        first
            .execute(&Statement::new("INSERT INTO account VALUES ('b', 2)"))
            .await
            .unwrap();
        assert!(first.in_transaction().await.unwrap());
        first.set_auto_commit(true).await.unwrap();
        assert!(!first.in_transaction().await.unwrap());
        assert_eq!(count(&mut second).await, 2);
    }

    #[tokio::test]
    async fn rollback_discards_work() {
        init_logs();
        let directory = TempDir::new().unwrap();
        let (mut first, mut second) = setup(&directory.path().join("rollback.sqlite")).await;
        first.set_auto_commit(false).await.unwrap();
        first
            .execute(&Statement::new("INSERT INTO account VALUES ('a', 1)"))
            .await
            .unwrap();
        assert_eq!(count(&mut first).await, 1);
        first.rollback().await.unwrap();
        assert_eq!(count(&mut first).await, 0);
        assert_eq!(count(&mut second).await, 0);
        first.rollback().await.expect("Rolling back twice is harmless");
        first.set_auto_commit(true).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rollback_waits_for_cancelled_statement() {
        init_logs();
        let directory = TempDir::new().unwrap();
        let (mut first, mut second) = setup(&directory.path().join("cancel.sqlite")).await;
        first.set_auto_commit(false).await.unwrap();
        let slow = Statement::new(indoc! {"
            INSERT INTO account
            WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 500000)
            SELECT 'a' || x, x FROM n
        "});
        let cancelled = timeout(Duration::from_millis(5), first.execute(&slow)).await;
        assert!(cancelled.is_err(), "The statement should still be running");
        first.rollback().await.unwrap();
        first.set_auto_commit(true).await.unwrap();
        assert!(!first.in_transaction().await.unwrap());
        assert_eq!(count(&mut second).await, 0);
        assert_eq!(count(&mut first).await, 0);
    }

    #[tokio::test]
    async fn vendor_codes() {
        init_logs();
        let directory = TempDir::new().unwrap();
        let (mut first, _) = setup(&directory.path().join("codes.sqlite")).await;
        let translator = ErrorTranslator::new(&SqliteDriver::new().error_codes());
        assert_eq!(translator.database(), "sqlite");
        first
            .execute(&Statement::new("INSERT INTO account VALUES ('a', 1)"))
            .await
            .unwrap();
        silent_logs! {
            let error = first
                .execute(&Statement::new("INSERT INTO account VALUES ('a', 2)"))
                .await
                .expect_err("Duplicate primary key");
            assert_eq!(error.vendor_code(), Some(1555));
            assert_eq!(
                translator.translate("save", "", error).kind(),
                ErrorKind::DuplicateKey
            );
            let error = first
                .execute(&Statement::new("INSERT INTO account VALUES ('b', NULL)"))
                .await
                .expect_err("Null balance");
            assert_eq!(
                translator.translate("save", "", error).kind(),
                ErrorKind::ConstraintViolation
            );
            let error = first
                .fetch(&Statement::new("SELECT * FROM missing_table"))
                .await
                .expect_err("Missing table");
            assert_eq!(
                translator.translate("find", "", error).kind(),
                ErrorKind::SyntaxError
            );
        };
    }

    #[test]
    fn extended_codes_fall_back_to_primary() {
        let translator = ErrorTranslator::new(&SqliteDriver::new().error_codes());
        let kind = |extended_code: i32| {
            let error = SqliteError::Sqlite(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(extended_code),
                None,
            ));
            assert_eq!(error.vendor_code(), Some(extended_code));
            translator.translate("find", "", error).kind()
        };
        // SQLITE_BUSY_TIMEOUT, SQLITE_IOERR_READ, SQLITE_IOERR_FSYNC, SQLITE_CANTOPEN_ISDIR, SQLITE_FULL
        assert_eq!(kind(773), ErrorKind::Transient);
        assert_eq!(kind(266), ErrorKind::ConnectionFailure);
        assert_eq!(kind(1034), ErrorKind::ConnectionFailure);
        assert_eq!(kind(526), ErrorKind::ConnectionFailure);
        assert_eq!(kind(13), ErrorKind::ConnectionFailure);
        // SQLITE_CONSTRAINT_PRIMARYKEY stays more specific than SQLITE_CONSTRAINT
        assert_eq!(kind(1555), ErrorKind::DuplicateKey);
    }

    #[tokio::test]
    async fn values_round_trip() {
        init_logs();
        let directory = TempDir::new().unwrap();
        let (mut first, _) = setup(&directory.path().join("values.sqlite")).await;
        first
            .execute(&Statement::new(
                "CREATE TABLE sample (i INTEGER, r REAL, t TEXT, b BLOB, n INTEGER)",
            ))
            .await
            .unwrap();
        first
            .execute(
                &Statement::new("INSERT INTO sample VALUES (?, ?, ?, ?, ?)")
                    .bind(42_i64)
                    .bind(1.5)
                    .bind("text")
                    .bind(Box::<[u8]>::from([1_u8, 2]))
                    .bind(Option::<i32>::None),
            )
            .await
            .unwrap();
        let rows = first
            .fetch(&Statement::new("SELECT * FROM sample"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.get::<i64>("i").unwrap(), 42);
        assert_eq!(row.get::<f64>("r").unwrap(), 1.5);
        assert_eq!(row.get::<String>("t").unwrap(), "text");
        assert_eq!(&*row.get::<Box<[u8]>>("b").unwrap(), &[1, 2]);
        assert_eq!(row.get::<Option<i64>>("n").unwrap(), None);
    }
}
