mod config;
mod connection;
mod context;
mod coordinator;
mod driver;
mod error;
mod pool;
mod scope;
mod statement;
mod template;
mod translator;
mod unit_of_work;
mod util;
mod value;

pub use ::anyhow;
pub use config::*;
pub use connection::*;
pub use context::*;
pub use coordinator::*;
pub use driver::*;
pub use error::*;
pub use pool::{ConnectionPool, PoolStatus, PooledConnection};
pub use scope::*;
pub use statement::*;
pub use template::*;
pub use translator::*;
pub use unit_of_work::*;
pub use util::*;
pub use value::*;
pub use ::futures::future;
