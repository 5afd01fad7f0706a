use rusqlite::types::{Value as SqliteValue, ValueRef};
use tether_core::Value;

pub(crate) fn extract_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Int64(Some(v)),
        ValueRef::Real(v) => Value::Float64(Some(v)),
        ValueRef::Text(v) => Value::Varchar(Some(String::from_utf8_lossy(v).into_owned())),
        ValueRef::Blob(v) => Value::Blob(Some(v.into())),
    }
}

pub(crate) fn bind_value(value: &Value) -> SqliteValue {
    match value {
        Value::Boolean(Some(v)) => SqliteValue::Integer(*v as i64),
        Value::Int32(Some(v)) => SqliteValue::Integer(*v as i64),
        Value::Int64(Some(v)) => SqliteValue::Integer(*v),
        Value::Float64(Some(v)) => SqliteValue::Real(*v),
        Value::Varchar(Some(v)) => SqliteValue::Text(v.clone()),
        Value::Blob(Some(v)) => SqliteValue::Blob(v.to_vec()),
        _ => SqliteValue::Null,
    }
}
