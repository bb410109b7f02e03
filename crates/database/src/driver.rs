//! sqlx-backed implementation of [`Connector`] for MySQL and SQLite servers.
//!
//! One physical connection is opened per session and closed when the session
//! is closed or dropped; there is no pooling.

use crate::connection::{ConnectionTarget, Connector, Session, WriteSummary};
use crate::error::DbError;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use configuration::Driver;
use core_types::{Row, RowSet, SqlValue};
use rust_decimal::Decimal;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Row as _, TypeInfo, ValueRef};

#[derive(Debug, Clone, Default)]
pub struct SqlxConnector;

impl SqlxConnector {
    pub fn new() -> Self {
        Self
    }

    fn mysql_options(target: &ConnectionTarget) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&target.host)
            .port(target.port)
            .username(&target.user)
            .password(&target.password)
    }

    fn sqlite_options(target: &ConnectionTarget) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(target.sqlite_path())
            .create_if_missing(true)
    }
}

#[async_trait]
impl Connector for SqlxConnector {
    async fn open(&self, target: &ConnectionTarget) -> Result<Box<dyn Session>, DbError> {
        tracing::debug!(database = %target.logical, server = %target.server, driver = %target.driver, "Opening connection");
        match target.driver {
            Driver::Mysql => {
                let options = Self::mysql_options(target).database(&target.database);
                let conn = options.connect().await.map_err(DbError::connect)?;
                Ok(Box::new(MySqlSession { conn }))
            }
            Driver::Sqlite => {
                let conn = Self::sqlite_options(target)
                    .connect()
                    .await
                    .map_err(DbError::connect)?;
                Ok(Box::new(SqliteSession { conn }))
            }
        }
    }

    async fn ensure_database(&self, target: &ConnectionTarget) -> Result<(), DbError> {
        match target.driver {
            Driver::Mysql => {
                let name = quote_identifier(&target.database)?;
                // Server-level connection: the schema may not exist yet.
                let mut conn = Self::mysql_options(target)
                    .connect()
                    .await
                    .map_err(DbError::connect)?;
                sqlx::query(&format!("CREATE DATABASE IF NOT EXISTS {name}"))
                    .execute(&mut conn)
                    .await?;
                conn.close().await?;
                Ok(())
            }
            Driver::Sqlite => {
                tokio::fs::create_dir_all(&target.host)
                    .await
                    .map_err(|e| DbError::Connection(format!("cannot create '{}': {e}", target.host)))?;
                Ok(())
            }
        }
    }
}

/// Backtick-quotes a schema name after checking it is a plain identifier.
fn quote_identifier(name: &str) -> Result<String, DbError> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(DbError::InvalidStatement(format!("'{name}' is not a valid database name")));
    }
    Ok(format!("`{name}`"))
}

struct MySqlSession {
    conn: MySqlConnection,
}

#[async_trait]
impl Session for MySqlSession {
    async fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> Result<RowSet, DbError> {
        let rows = bind_mysql(sqlx::query(sql), params)
            .fetch_all(&mut self.conn)
            .await?;
        rows.iter().map(decode_mysql_row).collect()
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<WriteSummary, DbError> {
        let mut tx = self.conn.begin().await?;
        let result = bind_mysql(sqlx::query(sql), params).execute(&mut *tx).await?;
        tx.commit().await?;

        let id = result.last_insert_id();
        Ok(WriteSummary {
            rows_affected: result.rows_affected(),
            last_insert_id: (id > 0).then_some(id as i64),
        })
    }

    async fn close(self: Box<Self>) -> Result<(), DbError> {
        self.conn.close().await?;
        Ok(())
    }
}

struct SqliteSession {
    conn: SqliteConnection,
}

#[async_trait]
impl Session for SqliteSession {
    async fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> Result<RowSet, DbError> {
        let rows = bind_sqlite(sqlx::query(sql), params)
            .fetch_all(&mut self.conn)
            .await?;
        rows.iter().map(decode_sqlite_row).collect()
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<WriteSummary, DbError> {
        let mut tx = self.conn.begin().await?;
        let result = bind_sqlite(sqlx::query(sql), params).execute(&mut *tx).await?;
        tx.commit().await?;

        let id = result.last_insert_rowid();
        Ok(WriteSummary {
            rows_affected: result.rows_affected(),
            last_insert_id: (id > 0).then_some(id),
        })
    }

    async fn close(self: Box<Self>) -> Result<(), DbError> {
        self.conn.close().await?;
        Ok(())
    }
}

fn bind_mysql<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &'q [SqlValue],
) -> Query<'q, MySql, MySqlArguments> {
    for value in params {
        query = match value {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Decimal(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Date(v) => query.bind(*v),
            SqlValue::Time(v) => query.bind(*v),
            SqlValue::DateTime(v) => query.bind(*v),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Bytes(v) => query.bind(v.as_slice()),
        };
    }
    query
}

fn bind_sqlite<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in params {
        query = match value {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            // SQLite has no decimal type; NUMERIC affinity converts the text on insert.
            SqlValue::Decimal(v) => query.bind(v.to_string()),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Date(v) => query.bind(*v),
            SqlValue::Time(v) => query.bind(*v),
            SqlValue::DateTime(v) => query.bind(*v),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Bytes(v) => query.bind(v.as_slice()),
        };
    }
    query
}

/// Decodes a MySQL row cell by cell, choosing the Rust type from the declared column type.
fn decode_mysql_row(row: &MySqlRow) -> Result<Row, DbError> {
    let mut cells = Vec::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        if row.try_get_raw(i)?.is_null() {
            cells.push(SqlValue::Null);
            continue;
        }
        let type_name = column.type_info().name().to_ascii_uppercase();
        let value = match type_name.as_str() {
            "BOOLEAN" => SqlValue::Bool(row.try_get_unchecked::<bool, _>(i)?),
            name if name.ends_with("UNSIGNED") => {
                SqlValue::Int(row.try_get_unchecked::<u64, _>(i)? as i64)
            }
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
                SqlValue::Int(row.try_get_unchecked::<i64, _>(i)?)
            }
            "FLOAT" => SqlValue::Float(row.try_get_unchecked::<f32, _>(i)? as f64),
            "DOUBLE" => SqlValue::Float(row.try_get_unchecked::<f64, _>(i)?),
            "DECIMAL" => SqlValue::Decimal(row.try_get_unchecked::<Decimal, _>(i)?),
            "DATE" => SqlValue::Date(row.try_get_unchecked::<NaiveDate, _>(i)?),
            "TIME" => SqlValue::Time(row.try_get_unchecked::<NaiveTime, _>(i)?),
            "DATETIME" | "TIMESTAMP" => SqlValue::DateTime(row.try_get_unchecked::<NaiveDateTime, _>(i)?),
            name if name.ends_with("BLOB") || name.ends_with("BINARY") => {
                SqlValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(i)?)
            }
            _ => SqlValue::Text(row.try_get_unchecked::<String, _>(i)?),
        };
        cells.push(value);
    }
    Ok(cells)
}

/// Decodes a SQLite row using each value's storage class, since SQLite
/// column declarations are only affinities.
fn decode_sqlite_row(row: &SqliteRow) -> Result<Row, DbError> {
    let mut cells = Vec::with_capacity(row.len());
    for i in 0..row.len() {
        let raw = row.try_get_raw(i)?;
        if raw.is_null() {
            cells.push(SqlValue::Null);
            continue;
        }
        let storage = raw.type_info().name().to_ascii_uppercase();
        let value = match storage.as_str() {
            "INTEGER" | "BOOLEAN" => SqlValue::Int(row.try_get_unchecked::<i64, _>(i)?),
            "REAL" => SqlValue::Float(row.try_get_unchecked::<f64, _>(i)?),
            "BLOB" => SqlValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(i)?),
            _ => SqlValue::Text(row.try_get_unchecked::<String, _>(i)?),
        };
        cells.push(value);
    }
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_checked_before_quoting() {
        assert_eq!(quote_identifier("patients_db").unwrap(), "`patients_db`");
        assert!(quote_identifier("x`; DROP DATABASE y").is_err());
        assert!(quote_identifier("").is_err());
    }
}
