use crate::{Connection, ConnectionConfig, ErrorCodes};
use std::future::Future;

/// Entry point of a backend: opens sessions and knows its vendor error codes.
pub trait Driver: Send + Sync + 'static {
    type Connection: Connection;

    const NAME: &'static str;

    /// Open a new physical session.
    fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> impl Future<Output = Result<Self::Connection, <Self::Connection as Connection>::Error>> + Send;

    /// Vendor code table used to translate the errors of this backend.
    fn error_codes(&self) -> ErrorCodes;
}
