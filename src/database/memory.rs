//! In-memory scripted driver
//!
//! Answers statements from a list of canned responses keyed by SQL
//! fragments and counts every open, close and query it sees. Used by the
//! test suites to exercise sessions and caches without a server.

use crate::database::driver::{
    DatabaseDriver, DriverConnection, DriverError, DriverField, DriverResponse,
};
use crate::database::profile::ConnectionProfile;
use crate::database::value::Value;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Script = Vec<(String, std::result::Result<DriverResponse, DriverError>)>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counters shared by a driver and all connections it opened
#[derive(Debug, Default)]
pub struct DriverStats {
    opens: AtomicUsize,
    closes: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl DriverStats {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Every statement received, in order
    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }

    /// Number of statements containing `fragment`
    pub fn count_matching(&self, fragment: &str) -> usize {
        lock(&self.queries)
            .iter()
            .filter(|sql| sql.contains(fragment))
            .count()
    }
}

#[derive(Default)]
struct Inner {
    stats: Arc<DriverStats>,
    script: Mutex<Script>,
    open_error: Mutex<Option<String>>,
    close_error: Mutex<Option<String>>,
}

/// Scripted driver; clones share script and counters
#[derive(Clone, Default)]
pub struct MemoryDriver {
    inner: Arc<Inner>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> Arc<DriverStats> {
        self.inner.stats.clone()
    }

    /// Answer statements containing `fragment` with `response`.
    ///
    /// Earlier registrations win when several fragments match.
    pub fn respond(&self, fragment: impl Into<String>, response: DriverResponse) {
        lock(&self.inner.script).push((fragment.into(), Ok(response)));
    }

    /// Fail statements containing `fragment`
    pub fn respond_error(&self, fragment: impl Into<String>, error: DriverError) {
        lock(&self.inner.script).push((fragment.into(), Err(error)));
    }

    /// Make subsequent opens fail
    pub fn fail_open(&self, message: impl Into<String>) {
        *lock(&self.inner.open_error) = Some(message.into());
    }

    pub fn allow_open(&self) {
        *lock(&self.inner.open_error) = None;
    }

    /// Make closes report an error (the connection still counts as closed)
    pub fn fail_close(&self, message: impl Into<String>) {
        *lock(&self.inner.close_error) = Some(message.into());
    }
}

#[async_trait]
impl DatabaseDriver for MemoryDriver {
    async fn open(
        &self,
        _profile: &ConnectionProfile,
    ) -> std::result::Result<Box<dyn DriverConnection>, DriverError> {
        if let Some(message) = lock(&self.inner.open_error).clone() {
            return Err(DriverError::connection(message));
        }
        self.inner.stats.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            inner: self.inner.clone(),
            closed: false,
        }))
    }
}

struct MemoryConnection {
    inner: Arc<Inner>,
    closed: bool,
}

#[async_trait]
impl DriverConnection for MemoryConnection {
    async fn query(
        &mut self,
        sql: &str,
        _params: &[String],
    ) -> std::result::Result<DriverResponse, DriverError> {
        if self.closed {
            return Err(DriverError::connection("connection is closed"));
        }
        lock(&self.inner.stats.queries).push(sql.to_string());

        let scripted = lock(&self.inner.script)
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, response)| response.clone());

        match scripted {
            Some(response) => response,
            None => Ok(default_response(sql)),
        }
    }

    async fn close(&mut self) -> std::result::Result<(), DriverError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.stats.closes.fetch_add(1, Ordering::SeqCst);
        match lock(&self.inner.close_error).clone() {
            Some(message) => Err(DriverError::connection(message)),
            None => Ok(()),
        }
    }
}

fn default_response(sql: &str) -> DriverResponse {
    let command = sql
        .split_whitespace()
        .next()
        .map(|s| s.to_uppercase())
        .unwrap_or_default();

    if command == "SELECT" {
        DriverResponse {
            rows: vec![vec![Value::Integer(1)]],
            fields: vec![DriverField {
                name: "?column?".to_string(),
                type_id: 23,
            }],
            row_count: 1,
            command_tag: command,
        }
    } else {
        DriverResponse {
            command_tag: command,
            ..Default::default()
        }
    }
}

/// Build a text-only response, handy for catalog queries
pub fn text_response(columns: &[&str], rows: &[&[&str]]) -> DriverResponse {
    DriverResponse {
        rows: rows
            .iter()
            .map(|row| row.iter().map(|v| Value::Text(v.to_string())).collect())
            .collect(),
        fields: columns
            .iter()
            .map(|name| DriverField {
                name: name.to_string(),
                type_id: 25,
            })
            .collect(),
        row_count: rows.len() as u64,
        command_tag: "SELECT".to_string(),
    }
}
