//! Query orchestration
//!
//! Runs ad-hoc SQL against the session and keeps the history of statements
//! that were executed successfully.

pub mod history;

use crate::database::result::QueryResult;
use crate::database::session::Session;
use crate::error::{BrowserError, Result};
use chrono::Utc;
use tracing::debug;

pub use history::{QueryHistory, QueryHistoryEntry, DEFAULT_HISTORY_LIMIT};

/// Runs user SQL and records it
#[derive(Debug, Default)]
pub struct QueryOrchestrator {
    history: QueryHistory,
}

impl QueryOrchestrator {
    /// Create an orchestrator keeping at most `history_limit` entries
    pub fn new(history_limit: usize) -> Self {
        Self {
            history: QueryHistory::new(history_limit),
        }
    }

    /// Execute `sql` on the session.
    ///
    /// Blank input fails with `EmptyQuery` before the session is consulted.
    /// Only successful executions are added to the history.
    pub async fn run(&mut self, session: &mut Session, sql: &str) -> Result<QueryResult> {
        if sql.trim().is_empty() {
            return Err(BrowserError::EmptyQuery);
        }
        if !session.is_connected() {
            return Err(BrowserError::NotConnected);
        }

        let result = session.execute_query(sql).await?;
        self.history.record(sql, Utc::now());
        debug!(command = %result.command, rows = result.row_count, "Query recorded");

        Ok(result)
    }

    pub fn history(&self) -> &QueryHistory {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::driver::DriverError;
    use crate::database::memory::MemoryDriver;
    use crate::database::profile::ConnectionProfile;
    use crate::database::value::Value;
    use std::sync::Arc;

    async fn connected(driver: &MemoryDriver) -> Session {
        let mut session = Session::new(Arc::new(driver.clone()));
        let profile = ConnectionProfile::new("local", "localhost", 5432, "app", "app", "x");
        assert!(session.connect(profile).await.success);
        session
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let driver = MemoryDriver::new();
        let mut session = connected(&driver).await;
        let mut orchestrator = QueryOrchestrator::default();

        for sql in ["", "   ", "\n\t"] {
            assert!(matches!(
                orchestrator.run(&mut session, sql).await,
                Err(BrowserError::EmptyQuery)
            ));
        }
        assert!(driver.stats().queries().is_empty());
        assert!(orchestrator.history().is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_session() {
        let driver = MemoryDriver::new();
        let mut session = Session::new(Arc::new(driver.clone()));
        let mut orchestrator = QueryOrchestrator::default();

        assert!(matches!(
            orchestrator.run(&mut session, "SELECT 1").await,
            Err(BrowserError::NotConnected)
        ));
        assert!(orchestrator.history().is_empty());
    }

    #[tokio::test]
    async fn test_select_one() {
        let driver = MemoryDriver::new();
        let mut session = connected(&driver).await;
        let mut orchestrator = QueryOrchestrator::default();

        let result = tokio_test::assert_ok!(orchestrator.run(&mut session, "SELECT 1").await);
        assert_eq!(result.command, "SELECT");
        assert_eq!(result.row_count, 1);
        assert_eq!(result.fields[0].name, "?column?");
        assert_eq!(result.fields[0].data_type, "integer");
        assert_eq!(result.rows[0].get("?column?"), Some(&Value::Integer(1)));
        assert_eq!(
            orchestrator.history().latest().map(|e| e.query.as_str()),
            Some("SELECT 1")
        );
    }

    #[tokio::test]
    async fn test_failed_query_not_recorded() {
        let driver = MemoryDriver::new();
        driver.respond_error("missing_table", DriverError::query("relation \"missing_table\" does not exist"));
        let mut session = connected(&driver).await;
        let mut orchestrator = QueryOrchestrator::default();

        let result = orchestrator.run(&mut session, "SELECT * FROM missing_table").await;
        assert!(matches!(result, Err(BrowserError::QueryFailed(_))));
        assert!(orchestrator.history().is_empty());
    }

    #[tokio::test]
    async fn test_history_bounded() {
        let driver = MemoryDriver::new();
        let mut session = connected(&driver).await;
        let mut orchestrator = QueryOrchestrator::default();

        for i in 0..51 {
            orchestrator
                .run(&mut session, &format!("SELECT {}", i))
                .await
                .unwrap();
        }

        let history = orchestrator.history();
        assert_eq!(history.len(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(history.latest().map(|e| e.query.as_str()), Some("SELECT 50"));
        assert_eq!(
            history.entries().last().map(|e| e.query.as_str()),
            Some("SELECT 1")
        );
    }
}
