//! PostgreSQL driver
//!
//! Opens a single `PgConnection` per session (no pool). Parameterless SQL runs
//! through the simple-query protocol so scripts with several statements work;
//! parameterised catalog queries bind text arguments.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::StreamExt;
use sqlx::postgres::types::PgMoney;
use sqlx::postgres::{PgColumn, PgConnectOptions, PgConnection, PgRow, PgSslMode};
use sqlx::{Column, Connection, Either, Executor, Row, Statement, TypeInfo, ValueRef};
use std::time::Duration;
use tracing::debug;

use crate::config::Settings;
use crate::database::driver::{
    DatabaseDriver, DriverConnection, DriverError, DriverField, DriverResponse,
};
use crate::database::profile::ConnectionProfile;
use crate::database::value::Value;

/// Driver for PostgreSQL servers
pub struct PostgresDriver {
    connect_timeout: Duration,
    application_name: String,
}

impl PostgresDriver {
    pub fn new(connect_timeout: Duration, application_name: impl Into<String>) -> Self {
        Self {
            connect_timeout,
            application_name: application_name.into(),
        }
    }

    /// Build a driver from application settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Duration::from_secs(settings.connect_timeout_secs),
            settings.application_name.clone(),
        )
    }

    fn connect_options(&self, profile: &ConnectionProfile) -> PgConnectOptions {
        let ssl_mode = if profile.use_tls {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        let options = PgConnectOptions::new()
            .host(&profile.host)
            .port(profile.port)
            .database(&profile.database)
            .username(&profile.username)
            .application_name(&self.application_name)
            .ssl_mode(ssl_mode);

        if profile.password.is_empty() {
            options
        } else {
            options.password(&profile.password)
        }
    }
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    async fn open(
        &self,
        profile: &ConnectionProfile,
    ) -> Result<Box<dyn DriverConnection>, DriverError> {
        let options = self.connect_options(profile);

        let conn = tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&options))
            .await
            .map_err(|_| {
                DriverError::connection(format!(
                    "timed out after {}s connecting to {}:{}",
                    self.connect_timeout.as_secs(),
                    profile.host,
                    profile.port
                ))
            })?
            .map_err(|e| DriverError::connection(error_message(&e)))?;

        Ok(Box::new(PostgresConnection { conn: Some(conn) }))
    }
}

struct PostgresConnection {
    conn: Option<PgConnection>,
}

#[async_trait]
impl DriverConnection for PostgresConnection {
    async fn query(&mut self, sql: &str, params: &[String]) -> Result<DriverResponse, DriverError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| DriverError::connection("connection is closed"))?;

        let statements = split_statements(sql);
        let mut sets = ResultSets::default();

        {
            let mut stream = if params.is_empty() {
                sqlx::raw_sql(sql).fetch_many(&mut *conn)
            } else {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = query.bind(param.as_str());
                }
                query.fetch_many(&mut *conn)
            };

            while let Some(item) = stream.next().await {
                match item.map_err(classify_error)? {
                    Either::Left(done) => sets.complete(done.rows_affected()),
                    Either::Right(row) => {
                        let values = (0..row.columns().len())
                            .map(|i| map_postgres_value(&row, i))
                            .collect();
                        sets.push_row(|| driver_fields(row.columns()), values);
                    }
                }
            }
        }

        // An empty row set carries no row descriptions on the stream.
        if sets.needs_description(&statements) {
            match (&mut *conn).prepare(sql).await {
                Ok(statement) => sets.describe(driver_fields(statement.columns())),
                Err(e) => debug!(error = %e, "Could not describe empty result"),
            }
        }

        Ok(sets.finish(&statements))
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        match self.conn.take() {
            Some(conn) => conn.close().await.map_err(classify_error),
            None => {
                debug!("Connection already closed");
                Ok(())
            }
        }
    }
}

/// Accumulates the result sets of one round trip. Only the last row set is
/// kept, and the command tag comes from the statement that produced it.
#[derive(Debug, Default)]
struct ResultSets {
    completed: usize,
    kept: Option<usize>,
    open_set: bool,
    fields: Vec<DriverField>,
    rows: Vec<Vec<Value>>,
    affected: u64,
}

impl ResultSets {
    fn complete(&mut self, rows_affected: u64) {
        self.affected += rows_affected;
        self.completed += 1;
        self.open_set = false;
    }

    fn push_row(&mut self, fields: impl FnOnce() -> Vec<DriverField>, values: Vec<Value>) {
        if !self.open_set {
            self.fields = fields();
            self.rows.clear();
            self.kept = Some(self.completed);
            self.open_set = true;
        }
        self.rows.push(values);
    }

    /// A single row-returning statement that produced no rows
    fn needs_description(&self, statements: &[&str]) -> bool {
        self.kept.is_none() && statements.len() == 1 && returns_rows(statements[0])
    }

    fn describe(&mut self, fields: Vec<DriverField>) {
        self.fields = fields;
    }

    fn finish(self, statements: &[&str]) -> DriverResponse {
        let index = self
            .kept
            .unwrap_or_else(|| statements.len().saturating_sub(1));
        let command_tag = statements
            .get(index)
            .map(|statement| command_tag(statement))
            .unwrap_or_else(|| "UNKNOWN".to_string());

        let row_count = if self.fields.is_empty() {
            self.affected
        } else {
            self.rows.len() as u64
        };

        DriverResponse {
            rows: self.rows,
            fields: self.fields,
            row_count,
            command_tag,
        }
    }
}

fn driver_fields(columns: &[PgColumn]) -> Vec<DriverField> {
    columns
        .iter()
        .map(|c| DriverField {
            name: c.name().to_string(),
            type_id: c.type_info().oid().map(|oid| oid.0).unwrap_or(0),
        })
        .collect()
}

/// Split a script on top-level semicolons. Quoted text, dollar-quoted bodies
/// and comments are skipped; statements with no keyword are dropped.
fn split_statements(sql: &str) -> Vec<&str> {
    let bytes = sql.as_bytes();
    let mut statements = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 1;
            }
            b'$' => {
                if let Some(len) = dollar_tag_len(&bytes[i..]) {
                    let tag = &bytes[i..i + len];
                    i += len;
                    while i < bytes.len() && !bytes[i..].starts_with(tag) {
                        i += 1;
                    }
                    i += len - 1;
                }
            }
            b';' => {
                statements.push(&sql[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    if start < sql.len() {
        statements.push(&sql[start..]);
    }

    statements
        .into_iter()
        .filter(|statement| leading_keyword(statement).is_some())
        .collect()
}

/// Length of a `$tag$` opener at the start of `bytes`
fn dollar_tag_len(bytes: &[u8]) -> Option<usize> {
    let mut end = 1;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        if end == 1 && bytes[end].is_ascii_digit() {
            return None;
        }
        end += 1;
    }
    (bytes.get(end) == Some(&b'$')).then_some(end + 1)
}

fn leading_keyword(sql: &str) -> Option<String> {
    sql.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("--"))
        .flat_map(str::split_whitespace)
        .next()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_ascii_alphabetic())
                .to_uppercase()
        })
        .filter(|word| !word.is_empty())
}

/// Leading keyword of the statement, uppercased
fn command_tag(sql: &str) -> String {
    leading_keyword(sql).unwrap_or_else(|| "UNKNOWN".to_string())
}

fn returns_rows(statement: &str) -> bool {
    matches!(
        command_tag(statement).as_str(),
        "SELECT" | "WITH" | "VALUES" | "TABLE" | "SHOW" | "EXPLAIN" | "FETCH"
    ) || statement.to_uppercase().contains("RETURNING")
}

fn classify_error(err: sqlx::Error) -> DriverError {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::WorkerCrashed => DriverError::connection(error_message(&err)),
        _ => DriverError::query(error_message(&err)),
    }
}

fn error_message(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db) => db.message().to_string(),
        other => other.to_string(),
    }
}

fn map_postgres_value(row: &PgRow, index: usize) -> Value {
    let value_ref = match row.try_get_raw(index) {
        Ok(v) => v,
        Err(_) => return Value::Null,
    };

    if value_ref.is_null() {
        return Value::Null;
    }

    let type_info = value_ref.type_info();
    let type_name = type_info.name().to_string();

    let decoded = match type_name.as_str() {
        "BOOL" => row.try_get::<bool, _>(index).ok().map(Value::Bool),
        "INT2" => row.try_get::<i16, _>(index).ok().map(|v| Value::Integer(v.into())),
        "INT4" => row.try_get::<i32, _>(index).ok().map(|v| Value::Integer(v.into())),
        "INT8" => row.try_get::<i64, _>(index).ok().map(Value::Integer),
        "OID" => row
            .try_get::<sqlx::postgres::types::Oid, _>(index)
            .ok()
            .map(|v| Value::Integer(v.0.into())),
        "FLOAT4" => row.try_get::<f32, _>(index).ok().map(|v| Value::Float(v.into())),
        "FLOAT8" => row.try_get::<f64, _>(index).ok().map(Value::Float),
        "NUMERIC" => row
            .try_get::<sqlx::types::BigDecimal, _>(index)
            .ok()
            .map(|d| Value::Numeric(d.to_string())),
        "MONEY" => row
            .try_get::<PgMoney, _>(index)
            .ok()
            .map(|m| Value::Numeric(format_cents(m.0))),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" => {
            row.try_get::<String, _>(index).ok().map(Value::Text)
        }
        "UUID" => row
            .try_get::<uuid::Uuid, _>(index)
            .ok()
            .map(|u| Value::Text(u.to_string())),
        "DATE" => row.try_get::<NaiveDate, _>(index).ok().map(Value::Date),
        "TIME" => row.try_get::<NaiveTime, _>(index).ok().map(Value::Time),
        "TIMESTAMP" => row.try_get::<NaiveDateTime, _>(index).ok().map(Value::Timestamp),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(index)
            .ok()
            .map(Value::TimestampTz),
        "JSON" | "JSONB" => row.try_get::<serde_json::Value, _>(index).ok().map(Value::Json),
        "BYTEA" => row.try_get::<Vec<u8>, _>(index).ok().map(Value::Binary),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => row
            .try_get::<Vec<String>, _>(index)
            .ok()
            .map(|v| Value::Json(serde_json::json!(v))),
        "INT2[]" => row
            .try_get::<Vec<i16>, _>(index)
            .ok()
            .map(|v| Value::Json(serde_json::json!(v))),
        "INT4[]" => row
            .try_get::<Vec<i32>, _>(index)
            .ok()
            .map(|v| Value::Json(serde_json::json!(v))),
        "INT8[]" => row
            .try_get::<Vec<i64>, _>(index)
            .ok()
            .map(|v| Value::Json(serde_json::json!(v))),
        "FLOAT8[]" => row
            .try_get::<Vec<f64>, _>(index)
            .ok()
            .map(|v| Value::Json(serde_json::json!(v))),
        "BOOL[]" => row
            .try_get::<Vec<bool>, _>(index)
            .ok()
            .map(|v| Value::Json(serde_json::json!(v))),
        "JSON[]" | "JSONB[]" => row
            .try_get::<Vec<serde_json::Value>, _>(index)
            .ok()
            .map(|v| Value::Json(serde_json::Value::Array(v))),
        _ => None,
    };

    if let Some(value) = decoded {
        return value;
    }

    // Anything else is shown as text: first via the String decoder, then by
    // reading the raw bytes, which is exact for the simple-query protocol.
    if let Ok(s) = row.try_get::<String, _>(index) {
        return Value::Text(s);
    }
    if let Ok(bytes) = value_ref.as_bytes() {
        if let Ok(s) = std::str::from_utf8(bytes) {
            return Value::Text(s.to_string());
        }
    }
    Value::Text(format!("<{}>", type_name))
}

fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_tag() {
        assert_eq!(command_tag("select 1"), "SELECT");
        assert_eq!(command_tag("  \n-- comment\nUPDATE users SET a = 1"), "UPDATE");
        assert_eq!(command_tag("(SELECT 1)"), "SELECT");
        assert_eq!(command_tag(""), "UNKNOWN");
    }

    fn int_field(name: &str) -> DriverField {
        DriverField {
            name: name.to_string(),
            type_id: 23,
        }
    }

    #[test]
    fn test_split_statements() {
        assert_eq!(split_statements("SELECT 1"), vec!["SELECT 1"]);
        assert_eq!(
            split_statements("UPDATE t SET a = ';'; SELECT 2;\n-- done\n"),
            vec!["UPDATE t SET a = ';'", " SELECT 2"]
        );
        assert_eq!(
            split_statements("CREATE FUNCTION f() RETURNS int AS $$ SELECT 1; $$ LANGUAGE sql"),
            vec!["CREATE FUNCTION f() RETURNS int AS $$ SELECT 1; $$ LANGUAGE sql"]
        );
        assert_eq!(
            split_statements("SELECT $1::text /* ; */"),
            vec!["SELECT $1::text /* ; */"]
        );
        assert!(split_statements("  ;  ").is_empty());
    }

    #[test]
    fn test_empty_row_set_keeps_fields() {
        let statements = split_statements("SELECT id FROM empty_table");
        let mut sets = ResultSets::default();
        sets.complete(0);

        assert!(sets.needs_description(&statements));
        sets.describe(vec![int_field("id")]);

        let response = sets.finish(&statements);
        assert_eq!(response.fields.len(), 1);
        assert!(response.rows.is_empty());
        assert_eq!(response.row_count, 0);
        assert_eq!(response.command_tag, "SELECT");
    }

    #[test]
    fn test_statements_without_rows_are_not_described() {
        let mut sets = ResultSets::default();
        sets.complete(4);
        assert!(!sets.needs_description(&split_statements("DELETE FROM t")));
        assert!(sets.needs_description(&split_statements("DELETE FROM t RETURNING id")));
        assert!(!sets.needs_description(&split_statements("SELECT 1; SELECT 2")));

        let response = sets.finish(&split_statements("DELETE FROM t"));
        assert!(response.fields.is_empty());
        assert_eq!(response.row_count, 4);
        assert_eq!(response.command_tag, "DELETE");
    }

    #[test]
    fn test_tag_follows_kept_row_set() {
        let statements = split_statements("UPDATE t SET a = 1; SELECT 1");
        let mut sets = ResultSets::default();
        sets.complete(3);
        sets.push_row(|| vec![int_field("?column?")], vec![Value::Integer(1)]);
        sets.complete(1);

        assert!(!sets.needs_description(&statements));
        let response = sets.finish(&statements);
        assert_eq!(response.command_tag, "SELECT");
        assert_eq!(response.row_count, 1);

        let statements = split_statements("SELECT 1; UPDATE t SET a = 1");
        let mut sets = ResultSets::default();
        sets.push_row(|| vec![int_field("?column?")], vec![Value::Integer(1)]);
        sets.complete(1);
        sets.complete(3);
        assert_eq!(sets.finish(&statements).command_tag, "SELECT");

        let statements = split_statements("SELECT 1; SELECT 2");
        let mut sets = ResultSets::default();
        sets.push_row(|| vec![int_field("a")], vec![Value::Integer(1)]);
        sets.complete(1);
        sets.push_row(|| vec![int_field("b")], vec![Value::Integer(2)]);
        sets.complete(1);
        let response = sets.finish(&statements);
        assert_eq!(response.fields[0].name, "b");
        assert_eq!(response.rows, vec![vec![Value::Integer(2)]]);
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(12345), "123.45");
        assert_eq!(format_cents(-50), "-0.50");
        assert_eq!(format_cents(7), "0.07");
    }

    #[test]
    fn test_error_classification() {
        let io = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        ));
        assert!(classify_error(io).is_connection_lost());

        let decode = sqlx::Error::ColumnNotFound("missing".to_string());
        assert!(!classify_error(decode).is_connection_lost());
    }

    #[test]
    fn test_connect_options_tls() {
        let driver = PostgresDriver::new(Duration::from_secs(5), "schema-browser");
        let mut profile = ConnectionProfile::new("p", "db.internal", 6543, "app", "app", "");
        profile.use_tls = true;

        let options = driver.connect_options(&profile);
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_database(), Some("app"));
    }
}
