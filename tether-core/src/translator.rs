use crate::{ErrorKind, PortableError};
use std::{collections::HashMap, error::Error as StdError, sync::Arc};

/// Native error raised by a driver.
///
/// Drivers wrap their native error type and expose the numeric vendor code and
/// the SQLSTATE when the backend reports them.
pub trait VendorError: StdError + Send + Sync + 'static {
    fn vendor_code(&self) -> Option<i32>;
    fn sql_state(&self) -> Option<&str> {
        None
    }
    /// Coarser code looked up when the table has no entry for `vendor_code`,
    /// like the primary result code behind an extended one.
    fn base_code(&self) -> Option<i32> {
        None
    }
}

/// Vendor code table of one database, the source of truth for translation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorCodes {
    pub database: &'static str,
    pub duplicate_key: &'static [i32],
    pub constraint_violation: &'static [i32],
    pub syntax_error: &'static [i32],
    pub connection_failure: &'static [i32],
    pub transient: &'static [i32],
}

impl ErrorCodes {
    /// H2 error codes.
    pub const fn h2() -> Self {
        Self {
            database: "h2",
            duplicate_key: &[23001, 23505],
            constraint_violation: &[22001, 22003, 22012, 22018, 22025, 23000, 23002, 23003, 23502, 23503, 23506, 23507, 23513],
            syntax_error: &[42000, 42001, 42101, 42102, 42111, 42112, 42121, 42122, 42132],
            connection_failure: &[90046, 90100, 90117, 90121],
            transient: &[40001, 50200],
        }
    }

    /// MySQL / MariaDB error codes.
    pub const fn mysql() -> Self {
        Self {
            database: "mysql",
            duplicate_key: &[1062],
            constraint_violation: &[630, 839, 840, 893, 1169, 1215, 1216, 1217, 1364, 1451, 1452, 1557, 1048, 3819, 4025],
            syntax_error: &[1054, 1064, 1146],
            connection_failure: &[1040, 1042, 1043, 1047, 1081, 2002, 2003, 2006, 2013],
            transient: &[1205, 1213],
        }
    }
}

/// Maps raw driver errors onto [`PortableError`] kinds.
///
/// The vendor code table decides first, then the standard SQLSTATE class.
/// Anything else is [`ErrorKind::Unknown`]. Translation never fails.
#[derive(Debug, Clone)]
pub struct ErrorTranslator {
    database: &'static str,
    codes: Arc<HashMap<i32, ErrorKind>>,
}

impl ErrorTranslator {
    pub fn new(codes: &ErrorCodes) -> Self {
        let mut table = HashMap::new();
        // Later entries win, duplicate key is the most specific kind.
        for (kind, list) in [
            (ErrorKind::Transient, codes.transient),
            (ErrorKind::ConnectionFailure, codes.connection_failure),
            (ErrorKind::SyntaxError, codes.syntax_error),
            (ErrorKind::ConstraintViolation, codes.constraint_violation),
            (ErrorKind::DuplicateKey, codes.duplicate_key),
        ] {
            for code in list {
                table.insert(*code, kind);
            }
        }
        Self {
            database: codes.database,
            codes: Arc::new(table),
        }
    }

    pub fn database(&self) -> &'static str {
        self.database
    }

    /// Classify a vendor code and SQLSTATE without building the error.
    pub fn classify(&self, vendor_code: Option<i32>, sql_state: Option<&str>) -> ErrorKind {
        self.classify_with_base(vendor_code, None, sql_state)
    }

    /// Like [`ErrorTranslator::classify`], trying `base_code` before the SQLSTATE.
    pub fn classify_with_base(
        &self,
        vendor_code: Option<i32>,
        base_code: Option<i32>,
        sql_state: Option<&str>,
    ) -> ErrorKind {
        [vendor_code, base_code]
            .into_iter()
            .flatten()
            .find_map(|code| self.codes.get(&code).copied())
            .or_else(|| sql_state.map(classify_sql_state))
            .unwrap_or(ErrorKind::Unknown)
    }

    pub fn translate<E: VendorError>(&self, operation: &str, statement: &str, error: E) -> PortableError {
        let vendor_code = error.vendor_code();
        let sql_state = error.sql_state().map(ToOwned::to_owned);
        let kind = self.classify_with_base(vendor_code, error.base_code(), sql_state.as_deref());
        let message = error.to_string();
        log::debug!(
            "Translated {} error (code {:?}, sqlstate {:?}) in `{}` to {:?}",
            self.database,
            vendor_code,
            sql_state,
            operation,
            kind
        );
        PortableError {
            kind,
            message,
            operation: operation.to_owned(),
            statement: statement.to_owned(),
            vendor_code,
            sql_state,
            cause: Some(Arc::new(error)),
        }
    }
}

fn classify_sql_state(sql_state: &str) -> ErrorKind {
    if sql_state == "23505" {
        return ErrorKind::DuplicateKey;
    }
    match sql_state.get(..2) {
        Some("23") | Some("22") | Some("27") | Some("44") => ErrorKind::ConstraintViolation,
        Some("07") | Some("21") | Some("2A") | Some("37") | Some("42") | Some("65") => {
            ErrorKind::SyntaxError
        }
        Some("08") => ErrorKind::ConnectionFailure,
        Some("40") | Some("53") | Some("57") | Some("61") => ErrorKind::Transient,
        _ => ErrorKind::Unknown,
    }
}
