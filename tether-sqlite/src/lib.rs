mod connection;
mod driver;
mod error;
mod extract;

pub use connection::*;
pub use driver::*;
pub use error::*;
