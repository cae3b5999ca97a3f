//! Row decoding for the sqlx backed engines.
//!
//! Values are decoded by trying the supported Rust types in order, so a
//! column is rendered by its runtime value rather than its declared type.

use serde_json::Value;
use sqlx::mysql::MySqlRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row as _, ValueRef};

use common::models::table::Row;

pub(crate) fn mysql_row(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .map(|col| (col.name().to_string(), mysql_value(row, col.ordinal())))
        .collect()
}

pub(crate) fn sqlite_row(row: &SqliteRow) -> Row {
    row.columns()
        .iter()
        .map(|col| (col.name().to_string(), sqlite_value(row, col.ordinal())))
        .collect()
}

pub(crate) fn column_names<R: sqlx::Row>(rows: &[R]) -> Vec<String> {
    rows.first()
        .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default()
}

fn float(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn mysql_value(row: &MySqlRow, i: usize) -> Value {
    match row.try_get_raw(i) {
        Ok(raw) if !raw.is_null() => {}
        _ => return Value::Null,
    }
    if let Ok(v) = row.try_get::<i64, _>(i) {
        return v.into();
    }
    if let Ok(v) = row.try_get::<u64, _>(i) {
        return v.into();
    }
    if let Ok(v) = row.try_get::<f64, _>(i) {
        return float(v);
    }
    if let Ok(v) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(i) {
        return v.to_rfc3339().into();
    }
    if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(i) {
        return v.to_string().into();
    }
    if let Ok(v) = row.try_get::<chrono::NaiveDate, _>(i) {
        return v.to_string().into();
    }
    if let Ok(v) = row.try_get::<chrono::NaiveTime, _>(i) {
        return v.to_string().into();
    }
    if let Ok(v) = row.try_get::<String, _>(i) {
        return v.into();
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(i) {
        return String::from_utf8_lossy(&v).into_owned().into();
    }
    Value::Null
}

fn sqlite_value(row: &SqliteRow, i: usize) -> Value {
    match row.try_get_raw(i) {
        Ok(raw) if !raw.is_null() => {}
        _ => return Value::Null,
    }
    if let Ok(v) = row.try_get::<i64, _>(i) {
        return v.into();
    }
    if let Ok(v) = row.try_get::<f64, _>(i) {
        return float(v);
    }
    if let Ok(v) = row.try_get::<String, _>(i) {
        return v.into();
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(i) {
        return String::from_utf8_lossy(&v).into_owned().into();
    }
    Value::Null
}
