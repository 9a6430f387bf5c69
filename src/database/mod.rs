//! Database module
//!
//! This module provides the session core: the connection lifecycle, the
//! metadata cache layered over it, result normalization and the drivers the
//! session talks through.

pub mod cache;
pub mod driver;
pub mod memory;
pub mod postgres;
pub mod profile;
pub mod result;
pub mod schema;
pub mod session;
pub mod types;
pub mod value;

// Re-exports
pub use cache::MetadataCache;
pub use driver::{DatabaseDriver, DriverConnection, DriverError, DriverErrorKind, DriverField, DriverResponse};
pub use postgres::PostgresDriver;
pub use profile::ConnectionProfile;
pub use result::{FieldDescriptor, QueryResult, ResultPage, Row};
pub use schema::{ColumnDescriptor, LoadState, RelationKind, RelationNode, SchemaName, SchemaNode};
pub use session::{ConnectOutcome, Connectivity, Session};
pub use types::TypeCatalog;
pub use value::Value;
