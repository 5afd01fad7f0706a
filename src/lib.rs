//! Connection and transaction coordination for the Rust data layer.
//!
//! Every statement of a multi-step operation runs on the same connection and
//! ends in one commit or one rollback, without passing connections around by
//! hand. Pick a driver (`tether-sqlite`), build a [`ConnectionPool`], then
//! either run work through a [`UnitOfWork`] or mark service methods with
//! [`transactional`].
pub use ::tether_core::*;
pub use ::tether_macros::*;
