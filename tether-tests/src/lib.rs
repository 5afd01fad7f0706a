mod member;
mod pool;
mod registration;
mod service;
mod transfer;

pub use member::*;
pub use service::*;

use crate::{
    pool::{concurrent_units_of_work, connection_reuse},
    registration::registration,
    transfer::{transfer_cancelled, transfer_single_connection, transfer_single_slot, transfer_styles},
};
use log::LevelFilter;
use std::{env, time::Duration};
use tether::{ConnectionPool, Driver, PoolConfig, Scope, SqlTemplate, TransactionCoordinator};

pub fn init_logs() {
    let mut logger = env_logger::builder();
    logger
        .is_test(true)
        .format_file(true)
        .format_line_number(true);
    if env::var("RUST_LOG").is_err() {
        logger.filter_level(LevelFilter::Warn);
    }
    let _ = logger.try_init();
}

/// Run the whole suite against a driver. `config` is used for a shared pool,
/// a second pool with a single connection is created from it too.
pub async fn execute_tests<D: Driver + Clone>(driver: D, config: PoolConfig) {
    let pool = ConnectionPool::new(driver.clone(), config.clone())
        .expect("Failed to create the connection pool");
    let members = MemberRepository::new(SqlTemplate::new(TransactionCoordinator::new(pool.clone())));
    members
        .create_table(&mut Scope::new())
        .await
        .expect("Failed to create the member table");

    connection_reuse(&pool).await;
    concurrent_units_of_work(&pool).await;
    transfer_styles(&pool).await;
    transfer_single_connection(&pool).await;
    transfer_cancelled(&pool).await;
    registration(&pool).await;

    let single = ConnectionPool::new(
        driver,
        config
            .with_max_connections(1)
            .with_acquire_timeout(Duration::from_secs(1)),
    )
    .expect("Failed to create the single connection pool");
    transfer_single_slot(&single).await;
    single.close().await;

    members
        .drop_table(&mut Scope::new())
        .await
        .expect("Failed to drop the member table");
    pool.close().await;
}

#[macro_export]
macro_rules! silent_logs {
    ($($code:tt)+) => {{
        let level = log::max_level();
        log::set_max_level(log::LevelFilter::Off);
        $($code)+
        log::set_max_level(level);
    }};
}
