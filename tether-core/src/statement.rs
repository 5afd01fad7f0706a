use crate::{AsValue, Error, Result, Value, truncate_long};
use std::{
    borrow::Cow,
    fmt::{self, Display},
    sync::Arc,
};

/// SQL text plus its positional parameters.
///
/// Parameters are bound in order, the driver decides the placeholder syntax.
/// ```rust
/// use tether_core::Statement;
/// let statement = Statement::new("update member set money=? where member_id=?")
///     .bind(8000)
///     .bind("memberA");
/// assert_eq!(statement.params.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: Cow<'static, str>,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<Cow<'static, str>>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
    /// Append a parameter value.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl From<&'static str> for Statement {
    fn from(value: &'static str) -> Self {
        Statement::new(value)
    }
}

impl From<String> for Statement {
    fn from(value: String) -> Self {
        Statement::new(value)
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", truncate_long!(self.sql))?;
        if !self.params.is_empty() {
            f.write_str("-- params: ")?;
            for (i, param) in self.params.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", param)?;
            }
        }
        Ok(())
    }
}

/// Metadata about modify operations (INSERT/UPDATE/DELETE).
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowsAffected {
    /// Total number of rows impacted.
    pub rows_affected: u64,
    /// Last inserted id, when the backend reports one.
    pub last_affected_id: Option<i64>,
}

pub type RowNames = Arc<[String]>;
pub type Row = Box<[Value]>;

/// A row together with its column labels.
#[derive(Debug, Clone, PartialEq)]
pub struct RowLabeled {
    pub labels: RowNames,
    pub values: Row,
}

impl RowLabeled {
    pub fn new(labels: RowNames, values: Row) -> Self {
        Self { labels, values }
    }

    pub fn get_column(&self, name: &str) -> Option<&Value> {
        self.labels
            .iter()
            .position(|label| label.eq_ignore_ascii_case(name))
            .and_then(|i| self.values.get(i))
    }

    /// Decode the column `name` into `T`.
    pub fn get<T: AsValue>(&self, name: &str) -> Result<T> {
        let value = self
            .get_column(name)
            .ok_or_else(|| Error::Decode(format!("Column `{}` is not part of the row", name)))?;
        T::try_from_value(value.clone())
    }
}
