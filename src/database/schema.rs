//! Schema data structures
//!
//! This module defines the nodes of the lazily loaded metadata tree:
//! schemas own relations, columns are described on demand.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Strongly typed schema key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchemaName(String);

impl SchemaName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SchemaName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Load progress of a tree node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadState {
    NotLoaded,
    Loading,
    Loaded,
    /// The last load failed; the node is treated as not loaded
    Error(String),
}

/// Kind of selectable catalog object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    Table,
    View,
    MaterializedView,
}

impl RelationKind {
    /// Map an `information_schema.tables.table_type` value
    pub fn from_table_type(table_type: &str) -> Self {
        match table_type {
            "VIEW" => RelationKind::View,
            _ => RelationKind::Table,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RelationKind::Table => "table",
            RelationKind::View => "view",
            RelationKind::MaterializedView => "materialized view",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A table, view or materialized view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationNode {
    pub name: String,
    pub schema: String,
    pub kind: RelationKind,
}

/// A schema and its (possibly unloaded) relations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaNode {
    pub name: SchemaName,
    pub load_state: LoadState,
    /// Ordered by name
    pub relations: Vec<RelationNode>,
}

impl SchemaNode {
    pub fn new(name: SchemaName) -> Self {
        Self {
            name,
            load_state: LoadState::NotLoaded,
            relations: Vec::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.load_state == LoadState::Loaded
    }

    /// Drop loaded relations so the next listing re-queries
    pub fn reset(&mut self) {
        self.load_state = LoadState::NotLoaded;
        self.relations.clear();
    }
}

/// Description of a single column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Name resolved through the type catalog
    pub data_type: String,
    /// Type as declared, with modifiers (e.g. `character varying(255)`)
    pub declared_type: Option<String>,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub default_expression: Option<String>,
}

impl fmt::Display for ColumnDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.name,
            self.declared_type.as_deref().unwrap_or(&self.data_type)
        )?;

        if self.is_primary_key {
            write!(f, " PRIMARY KEY")?;
        }
        if !self.nullable {
            write!(f, " NOT NULL")?;
        }
        if let Some(ref default) = self.default_expression {
            write!(f, " DEFAULT {}", default)?;
        }

        Ok(())
    }
}
