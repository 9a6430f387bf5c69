//! Workspace
//!
//! The per-window context: one session, the metadata cache built over it and
//! the query orchestrator that runs user SQL through it. Nothing here is
//! global; every front-end constructs and owns its own workspace.

use crate::config::Settings;
use crate::database::cache::MetadataCache;
use crate::database::driver::DatabaseDriver;
use crate::database::profile::ConnectionProfile;
use crate::database::result::QueryResult;
use crate::database::schema::{ColumnDescriptor, RelationNode, SchemaNode};
use crate::database::session::{self, ConnectOutcome, Connectivity, Session};
use crate::error::Result;
use crate::query::{QueryHistory, QueryOrchestrator};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Session, metadata cache and query orchestrator for one window
pub struct Workspace {
    session: Session,
    cache: MetadataCache,
    queries: QueryOrchestrator,
}

impl Workspace {
    pub fn new(driver: Arc<dyn DatabaseDriver>, settings: &Settings) -> Self {
        Self::with_history_limit(driver, settings.history_limit)
    }

    pub fn with_history_limit(driver: Arc<dyn DatabaseDriver>, history_limit: usize) -> Self {
        Self {
            session: Session::new(driver),
            cache: MetadataCache::new(),
            queries: QueryOrchestrator::new(history_limit),
        }
    }

    /// Connect, replacing any current connection and its cached metadata
    pub async fn connect(&mut self, profile: ConnectionProfile) -> ConnectOutcome {
        let outcome = self.session.connect(profile).await;
        self.cache.invalidate(None);
        outcome
    }

    /// Disconnect and drop all cached metadata
    pub async fn disconnect(&mut self) {
        self.session.disconnect().await;
        self.cache.invalidate(None);
    }

    /// Probe a profile without touching the live session
    pub async fn test_connection(&self, profile: &ConnectionProfile) -> ConnectOutcome {
        let driver = self.session.driver();
        session::test_connection(driver.as_ref(), profile).await
    }

    pub async fn list_schemas(&mut self) -> Result<Vec<SchemaNode>> {
        self.cache.list_schemas(&mut self.session).await
    }

    pub async fn list_relations(&mut self, schema: &str) -> Result<Vec<RelationNode>> {
        self.cache.list_relations(&mut self.session, schema).await
    }

    pub async fn list_columns(&mut self, schema: &str, relation: &str) -> Result<Vec<ColumnDescriptor>> {
        self.cache
            .list_columns(&mut self.session, schema, relation)
            .await
    }

    /// Manual refresh of one schema or the whole tree
    pub fn refresh(&mut self, schema: Option<&str>) {
        self.cache.invalidate(schema);
    }

    /// Run user SQL
    pub async fn run(&mut self, sql: &str) -> Result<QueryResult> {
        self.queries.run(&mut self.session, sql).await
    }

    pub fn history(&self) -> &QueryHistory {
        self.queries.history()
    }

    pub fn connectivity(&self) -> Connectivity {
        self.session.connectivity()
    }

    pub fn current_profile(&self) -> Option<&ConnectionProfile> {
        self.session.current_profile()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }
}

/// Shared workspace handle
pub type SharedWorkspace = Arc<Mutex<Workspace>>;

/// Create a shared workspace over `driver`
pub fn create_shared_workspace(
    driver: Arc<dyn DatabaseDriver>,
    settings: &Settings,
) -> SharedWorkspace {
    Arc::new(Mutex::new(Workspace::new(driver, settings)))
}
