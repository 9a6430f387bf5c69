//! Metadata cache
//!
//! A lazily populated tree over the active session's schemas. Each expansion
//! costs at most one round of catalog queries; results are memoized until
//! invalidated or until the session reconnects.
//!
//! Every tree is tagged with the session epoch it was built under. A read
//! against a different epoch drops the whole tree and counts as a miss, so a
//! reconnect never serves metadata from the previous connection.

use crate::database::result::{QueryResult, Row};
use crate::database::schema::{
    ColumnDescriptor, LoadState, RelationKind, RelationNode, SchemaName, SchemaNode,
};
use crate::database::session::Session;
use crate::database::types::TypeCatalog;
use crate::error::{BrowserError, Result};
use std::collections::BTreeMap;
use tracing::debug;

pub(crate) const SCHEMAS_SQL: &str = "\
    SELECT schema_name FROM information_schema.schemata \
    WHERE schema_name NOT IN ('information_schema', 'pg_catalog', 'pg_toast') \
    AND schema_name NOT LIKE 'pg_temp_%' \
    AND schema_name NOT LIKE 'pg_toast_temp_%' \
    ORDER BY schema_name";

pub(crate) const TABLES_SQL: &str = "\
    SELECT table_name, table_type FROM information_schema.tables \
    WHERE table_schema = $1 \
    ORDER BY table_name";

pub(crate) const MATVIEWS_SQL: &str = "\
    SELECT matviewname FROM pg_catalog.pg_matviews \
    WHERE schemaname = $1 \
    ORDER BY matviewname";

pub(crate) const COLUMNS_SQL: &str = r#"
    SELECT
        a.attname AS column_name,
        a.atttypid::int8 AS type_id,
        format_type(a.atttypid, a.atttypmod) AS declared_type,
        NOT a.attnotnull AS nullable,
        EXISTS (
            SELECT 1 FROM pg_catalog.pg_constraint con
            WHERE con.conrelid = c.oid
              AND con.contype = 'p'
              AND a.attnum = ANY(con.conkey)
        ) AS is_primary_key,
        pg_get_expr(d.adbin, d.adrelid) AS column_default
    FROM pg_catalog.pg_attribute a
    JOIN pg_catalog.pg_class c ON a.attrelid = c.oid
    JOIN pg_catalog.pg_namespace n ON c.relnamespace = n.oid
    LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
    WHERE n.nspname = $1 AND c.relname = $2
      AND a.attnum > 0 AND NOT a.attisdropped
    ORDER BY a.attnum
"#;

struct SchemaTree {
    epoch: u64,
    schemas_state: LoadState,
    schemas: BTreeMap<SchemaName, SchemaNode>,
}

impl SchemaTree {
    fn new(epoch: u64) -> Self {
        Self {
            epoch,
            schemas_state: LoadState::NotLoaded,
            schemas: BTreeMap::new(),
        }
    }
}

/// Lazily loaded schema → relation tree for one session
#[derive(Default)]
pub struct MetadataCache {
    tree: Option<SchemaTree>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// List the non-system schemas, alphabetically.
    ///
    /// Queries the server only on the first call of an epoch.
    pub async fn list_schemas(&mut self, session: &mut Session) -> Result<Vec<SchemaNode>> {
        let tree = self.tree_for(session)?;

        if tree.schemas_state == LoadState::Loaded {
            debug!(epoch = tree.epoch, "Schema list served from cache");
            return Ok(tree.schemas.values().cloned().collect());
        }

        tree.schemas_state = LoadState::Loading;
        let result = match session.execute_with_params(SCHEMAS_SQL, &[]).await {
            Ok(result) => result,
            Err(e) => {
                let e = metadata_error(e);
                tree.schemas_state = LoadState::Error(e.to_string());
                return Err(e);
            }
        };

        let names = result
            .rows
            .iter()
            .map(|row| text_cell(row, "schema_name"))
            .collect::<Result<Vec<_>>>();
        let mut names = match names {
            Ok(names) => names,
            Err(e) => {
                tree.schemas_state = LoadState::Error(e.to_string());
                return Err(e);
            }
        };
        names.sort();
        names.dedup();

        let mut previous = std::mem::take(&mut tree.schemas);
        for name in names {
            let key = SchemaName::new(name);
            let node = previous
                .remove(&key)
                .unwrap_or_else(|| SchemaNode::new(key.clone()));
            tree.schemas.insert(key, node);
        }
        tree.schemas_state = LoadState::Loaded;
        debug!(epoch = tree.epoch, count = tree.schemas.len(), "Schema list loaded");

        Ok(tree.schemas.values().cloned().collect())
    }

    /// List tables, views and materialized views of one schema, by name.
    ///
    /// Tables/views and materialized views come from two catalog queries and
    /// are merged. The merged list is cached on the schema node.
    ///
    /// A schema missing from an already loaded listing is queried but never
    /// added to the tree. A node created here before the listing is loaded
    /// is removed again if its load fails.
    pub async fn list_relations(
        &mut self,
        session: &mut Session,
        schema: &str,
    ) -> Result<Vec<RelationNode>> {
        let tree = self.tree_for(session)?;
        let key = SchemaName::new(schema);
        let params = [schema.to_string()];

        let existed = match tree.schemas.get(&key) {
            Some(node) if node.is_loaded() => {
                debug!(schema = %node.name, "Relations served from cache");
                return Ok(node.relations.clone());
            }
            Some(_) => true,
            None => false,
        };

        if !existed && tree.schemas_state == LoadState::Loaded {
            debug!(schema, "Schema is not in the listing; relations not cached");
            return fetch_relations(session, schema, &params).await;
        }

        tree.schemas
            .entry(key.clone())
            .or_insert_with(|| SchemaNode::new(key.clone()))
            .load_state = LoadState::Loading;

        let fetched = fetch_relations(session, schema, &params).await;
        match fetched {
            Ok(relations) => {
                let node = tree
                    .schemas
                    .entry(key.clone())
                    .or_insert_with(|| SchemaNode::new(key));
                node.relations = relations;
                node.load_state = LoadState::Loaded;
                debug!(schema = %node.name, count = node.relations.len(), "Relations loaded");
                Ok(node.relations.clone())
            }
            Err(e) => {
                if existed {
                    if let Some(node) = tree.schemas.get_mut(&key) {
                        node.relations.clear();
                        node.load_state = LoadState::Error(e.to_string());
                    }
                } else {
                    tree.schemas.remove(&key);
                }
                Err(e)
            }
        }
    }

    /// Describe the columns of a relation in declared order.
    ///
    /// Always queries the server; column lists are not cached.
    pub async fn list_columns(
        &self,
        session: &mut Session,
        schema: &str,
        relation: &str,
    ) -> Result<Vec<ColumnDescriptor>> {
        let params = [schema.to_string(), relation.to_string()];
        let result = session
            .execute_with_params(COLUMNS_SQL, &params)
            .await
            .map_err(metadata_error)?;

        result.rows.iter().map(column_from_row).collect()
    }

    /// Forget one schema's relations, or the whole tree when `schema` is `None`
    pub fn invalidate(&mut self, schema: Option<&str>) {
        match schema {
            None => {
                debug!("Metadata cache cleared");
                self.tree = None;
            }
            Some(name) => {
                if let Some(node) = self
                    .tree
                    .as_mut()
                    .and_then(|t| t.schemas.get_mut(&SchemaName::new(name)))
                {
                    debug!(schema = name, "Schema invalidated");
                    node.reset();
                }
            }
        }
    }

    /// Cached schema nodes for `epoch` without touching the network
    pub fn cached_schemas(&self, epoch: u64) -> Vec<&SchemaNode> {
        match &self.tree {
            Some(tree) if tree.epoch == epoch => tree.schemas.values().collect(),
            _ => Vec::new(),
        }
    }

    /// Epoch the current tree was built under, if any
    pub fn cached_epoch(&self) -> Option<u64> {
        self.tree.as_ref().map(|t| t.epoch)
    }

    fn tree_for(&mut self, session: &Session) -> Result<&mut SchemaTree> {
        if !session.is_connected() {
            return Err(BrowserError::NotConnected);
        }

        let epoch = session.epoch();
        if self.tree.as_ref().is_some_and(|t| t.epoch != epoch) {
            debug!(epoch, "Discarding metadata from a previous connection");
            self.tree = None;
        }
        Ok(self.tree.get_or_insert_with(|| SchemaTree::new(epoch)))
    }
}

async fn fetch_relations(
    session: &mut Session,
    schema: &str,
    params: &[String],
) -> Result<Vec<RelationNode>> {
    let tables = session
        .execute_with_params(TABLES_SQL, params)
        .await
        .map_err(metadata_error)?;
    let matviews = session
        .execute_with_params(MATVIEWS_SQL, params)
        .await
        .map_err(metadata_error)?;

    let mut relations = relations_from(&tables, schema, |row| {
        Ok(RelationKind::from_table_type(&text_cell(row, "table_type")?))
    }, "table_name")?;
    relations.extend(relations_from(
        &matviews,
        schema,
        |_| Ok(RelationKind::MaterializedView),
        "matviewname",
    )?);
    relations.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(relations)
}

fn relations_from(
    result: &QueryResult,
    schema: &str,
    kind: impl Fn(&Row) -> Result<RelationKind>,
    name_column: &str,
) -> Result<Vec<RelationNode>> {
    result
        .rows
        .iter()
        .map(|row| {
            Ok(RelationNode {
                name: text_cell(row, name_column)?,
                schema: schema.to_string(),
                kind: kind(row)?,
            })
        })
        .collect()
}

fn column_from_row(row: &Row) -> Result<ColumnDescriptor> {
    let type_id = row
        .get("type_id")
        .and_then(|v| match v.as_i64() {
            Some(id) => u32::try_from(id).ok(),
            None => v.as_str().and_then(|id| id.parse().ok()),
        })
        .unwrap_or_default();

    Ok(ColumnDescriptor {
        name: text_cell(row, "column_name")?,
        data_type: TypeCatalog::resolve(type_id).into_owned(),
        declared_type: optional_text(row, "declared_type"),
        nullable: bool_cell(row, "nullable").unwrap_or(true),
        is_primary_key: bool_cell(row, "is_primary_key").unwrap_or(false),
        default_expression: optional_text(row, "column_default"),
    })
}

fn text_cell(row: &Row, column: &str) -> Result<String> {
    match row.get(column).filter(|v| !v.is_null()) {
        Some(value) => Ok(value
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string())),
        None => Err(BrowserError::MetadataQueryFailed(format!(
            "catalog row is missing '{}'",
            column
        ))),
    }
}

fn optional_text(row: &Row, column: &str) -> Option<String> {
    row.get(column)
        .filter(|v| !v.is_null())
        .map(|v| v.to_string())
}

fn bool_cell(row: &Row, column: &str) -> Option<bool> {
    let value = row.get(column)?;
    value
        .as_bool()
        .or_else(|| value.as_str().map(|s| matches!(s, "t" | "true")))
}

fn metadata_error(err: BrowserError) -> BrowserError {
    match err {
        BrowserError::QueryFailed(message) => BrowserError::MetadataQueryFailed(message),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::driver::{DriverError, DriverField, DriverResponse};
    use crate::database::memory::{text_response, MemoryDriver};
    use crate::database::profile::ConnectionProfile;
    use crate::database::value::Value;
    use std::sync::Arc;

    fn profile() -> ConnectionProfile {
        ConnectionProfile::new("local", "localhost", 5432, "app", "app", "x")
    }

    fn scripted() -> MemoryDriver {
        let driver = MemoryDriver::new();
        driver.respond(
            "information_schema.schemata",
            text_response(&["schema_name"], &[&["sales"], &["public"]]),
        );
        driver.respond(
            "information_schema.tables",
            text_response(
                &["table_name", "table_type"],
                &[&["users", "BASE TABLE"], &["active_users", "VIEW"]],
            ),
        );
        driver.respond(
            "pg_matviews",
            text_response(&["matviewname"], &[&["daily_totals"]]),
        );
        driver
    }

    async fn connected(driver: &MemoryDriver) -> Session {
        let mut session = Session::new(Arc::new(driver.clone()));
        assert!(session.connect(profile()).await.success);
        session
    }

    #[tokio::test]
    async fn test_list_schemas_is_cached() {
        let driver = scripted();
        let mut session = connected(&driver).await;
        let mut cache = MetadataCache::new();

        let first = cache.list_schemas(&mut session).await.unwrap();
        let second = cache.list_schemas(&mut session).await.unwrap();

        let names: Vec<&str> = first.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["public", "sales"]);
        assert_eq!(first, second);
        assert_eq!(driver.stats().count_matching("information_schema.schemata"), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_requery() {
        let driver = scripted();
        let mut session = connected(&driver).await;
        let mut cache = MetadataCache::new();

        cache.list_schemas(&mut session).await.unwrap();
        cache.invalidate(None);
        cache.list_schemas(&mut session).await.unwrap();
        assert_eq!(driver.stats().count_matching("information_schema.schemata"), 2);
    }

    #[tokio::test]
    async fn test_reconnect_discards_tree() {
        let driver = scripted();
        let mut session = connected(&driver).await;
        let mut cache = MetadataCache::new();

        cache.list_schemas(&mut session).await.unwrap();
        assert_eq!(cache.cached_epoch(), Some(1));

        session.connect(profile()).await;
        assert!(cache.cached_schemas(session.epoch()).is_empty());

        cache.list_schemas(&mut session).await.unwrap();
        assert_eq!(cache.cached_epoch(), Some(2));
        assert_eq!(driver.stats().count_matching("information_schema.schemata"), 2);
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let driver = scripted();
        let mut session = Session::new(Arc::new(driver.clone()));
        let mut cache = MetadataCache::new();

        assert!(matches!(
            cache.list_schemas(&mut session).await,
            Err(BrowserError::NotConnected)
        ));
        assert!(matches!(
            cache.list_relations(&mut session, "public").await,
            Err(BrowserError::NotConnected)
        ));
        assert!(driver.stats().queries().is_empty());
    }

    #[tokio::test]
    async fn test_relations_merge_materialized_views() {
        let driver = scripted();
        let mut session = connected(&driver).await;
        let mut cache = MetadataCache::new();

        let relations = cache.list_relations(&mut session, "public").await.unwrap();
        let listed: Vec<(&str, RelationKind)> =
            relations.iter().map(|r| (r.name.as_str(), r.kind)).collect();
        assert_eq!(
            listed,
            vec![
                ("active_users", RelationKind::View),
                ("daily_totals", RelationKind::MaterializedView),
                ("users", RelationKind::Table),
            ]
        );

        cache.list_relations(&mut session, "public").await.unwrap();
        assert_eq!(driver.stats().count_matching("information_schema.tables"), 1);
        assert_eq!(driver.stats().count_matching("pg_matviews"), 1);
    }

    #[tokio::test]
    async fn test_invalidate_single_schema() {
        let driver = scripted();
        let mut session = connected(&driver).await;
        let mut cache = MetadataCache::new();

        cache.list_schemas(&mut session).await.unwrap();
        cache.list_relations(&mut session, "public").await.unwrap();
        cache.list_relations(&mut session, "sales").await.unwrap();

        cache.invalidate(Some("public"));
        cache.list_relations(&mut session, "public").await.unwrap();
        cache.list_relations(&mut session, "sales").await.unwrap();
        cache.list_schemas(&mut session).await.unwrap();

        assert_eq!(driver.stats().count_matching("information_schema.tables"), 3);
        assert_eq!(driver.stats().count_matching("information_schema.schemata"), 1);
    }

    #[tokio::test]
    async fn test_failed_listing_is_not_cached() {
        let driver = MemoryDriver::new();
        driver.respond_error(
            "information_schema.tables",
            DriverError::query("permission denied for schema secret"),
        );
        let mut session = connected(&driver).await;
        let mut cache = MetadataCache::new();

        let err = cache.list_relations(&mut session, "secret").await.unwrap_err();
        assert!(matches!(err, BrowserError::MetadataQueryFailed(_)));
        // the failed schema is not left behind in the tree
        assert!(cache.cached_schemas(session.epoch()).is_empty());

        assert!(cache.list_relations(&mut session, "secret").await.is_err());
        assert_eq!(driver.stats().count_matching("information_schema.tables"), 2);
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_unlisted_schema_does_not_join_listing() {
        let driver = scripted();
        let mut session = connected(&driver).await;
        let mut cache = MetadataCache::new();

        let before = cache.list_schemas(&mut session).await.unwrap();
        cache.list_relations(&mut session, "typo").await.unwrap();
        let after = cache.list_schemas(&mut session).await.unwrap();

        assert_eq!(before, after);
        let names: Vec<&str> = after.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["public", "sales"]);
        assert_eq!(driver.stats().count_matching("information_schema.schemata"), 1);

        // not cached either: asking again goes back to the server
        cache.list_relations(&mut session, "typo").await.unwrap();
        assert_eq!(driver.stats().count_matching("information_schema.tables"), 2);
    }

    #[tokio::test]
    async fn test_failed_listed_schema_stays_listed() {
        let driver = MemoryDriver::new();
        driver.respond(
            "information_schema.schemata",
            text_response(&["schema_name"], &[&["public"]]),
        );
        driver.respond_error("information_schema.tables", DriverError::query("permission denied"));
        let mut session = connected(&driver).await;
        let mut cache = MetadataCache::new();
        cache.list_schemas(&mut session).await.unwrap();

        assert!(cache.list_relations(&mut session, "public").await.is_err());
        let nodes = cache.cached_schemas(session.epoch());
        assert_eq!(nodes.len(), 1);
        assert!(matches!(nodes[0].load_state, LoadState::Error(_)));
        assert!(nodes[0].relations.is_empty());

        // the schema list itself is still served from cache
        cache.list_schemas(&mut session).await.unwrap();
        assert_eq!(driver.stats().count_matching("information_schema.schemata"), 1);
    }

    #[tokio::test]
    async fn test_malformed_schema_rows_mark_listing_failed() {
        let driver = MemoryDriver::new();
        driver.respond(
            "information_schema.schemata",
            text_response(&["nspname"], &[&["public"]]),
        );
        let mut session = connected(&driver).await;
        let mut cache = MetadataCache::new();

        let err = cache.list_schemas(&mut session).await.unwrap_err();
        assert!(matches!(err, BrowserError::MetadataQueryFailed(_)));
        let state = &cache.tree.as_ref().unwrap().schemas_state;
        assert!(matches!(state, LoadState::Error(_)));
    }

    #[tokio::test]
    async fn test_list_columns_not_cached() {
        let driver = MemoryDriver::new();
        driver.respond(
            "pg_attribute",
            DriverResponse {
                rows: vec![
                    vec![
                        Value::Text("id".into()),
                        Value::Integer(23),
                        Value::Text("integer".into()),
                        Value::Bool(false),
                        Value::Bool(true),
                        Value::Text("nextval('users_id_seq'::regclass)".into()),
                    ],
                    vec![
                        Value::Text("email".into()),
                        Value::Integer(1043),
                        Value::Text("character varying(255)".into()),
                        Value::Bool(true),
                        Value::Bool(false),
                        Value::Null,
                    ],
                ],
                fields: [
                    ("column_name", 25),
                    ("type_id", 20),
                    ("declared_type", 25),
                    ("nullable", 16),
                    ("is_primary_key", 16),
                    ("column_default", 25),
                ]
                .iter()
                .map(|(name, type_id)| DriverField {
                    name: name.to_string(),
                    type_id: *type_id,
                })
                .collect(),
                row_count: 2,
                command_tag: "SELECT".into(),
            },
        );
        let mut session = connected(&driver).await;
        let cache = MetadataCache::new();

        let columns = cache.list_columns(&mut session, "public", "users").await.unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "id");
        assert_eq!(columns[0].data_type, "integer");
        assert!(columns[0].is_primary_key);
        assert!(!columns[0].nullable);
        assert_eq!(columns[1].data_type, "character varying");
        assert_eq!(columns[1].declared_type.as_deref(), Some("character varying(255)"));
        assert!(columns[1].default_expression.is_none());

        cache.list_columns(&mut session, "public", "users").await.unwrap();
        assert_eq!(driver.stats().count_matching("pg_attribute"), 2);
    }
}
