//! Schema-Browser Library
//!
//! This is the library interface for Schema-Browser: a PostgreSQL session
//! core with a metadata cache, query history and result normalization.
//! The interactive binary is in src/main.rs.

pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod query;
pub mod workspace;

pub use error::{BrowserError, Result};
pub use workspace::{create_shared_workspace, SharedWorkspace, Workspace};
