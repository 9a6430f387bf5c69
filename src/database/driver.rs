//! Network driver contract
//!
//! The session talks to a database server only through these traits. A
//! driver opens connections; a connection runs statements and closes itself.

use crate::database::profile::ConnectionProfile;
use crate::database::value::Value;
use async_trait::async_trait;
use std::fmt;

/// Field descriptor as reported by the driver
#[derive(Debug, Clone, PartialEq)]
pub struct DriverField {
    pub name: String,
    /// Engine type identifier (a type OID for PostgreSQL)
    pub type_id: u32,
}

/// Raw response of a single statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverResponse {
    /// Positional rows, one value per field
    pub rows: Vec<Vec<Value>>,
    pub fields: Vec<DriverField>,
    /// Rows returned, or rows affected for statements returning none
    pub row_count: u64,
    pub command_tag: String,
}

/// Which layer a driver failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// The transport itself is gone; the connection is unusable
    Connection,
    /// The statement failed but the connection survives
    Query,
}

/// Driver failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Connection,
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Query,
            message: message.into(),
        }
    }

    /// Whether the connection should be considered severed
    pub fn is_connection_lost(&self) -> bool {
        self.kind == DriverErrorKind::Connection
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DriverError {}

/// Opens connections to a database server
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Open a connection using the profile's credentials
    async fn open(
        &self,
        profile: &ConnectionProfile,
    ) -> Result<Box<dyn DriverConnection>, DriverError>;
}

/// A live connection handle
#[async_trait]
pub trait DriverConnection: Send {
    /// Run a statement. Parameters are bound as text in order (`$1`, `$2`, ...).
    async fn query(&mut self, sql: &str, params: &[String]) -> Result<DriverResponse, DriverError>;

    /// Close the connection. Further queries fail with a connection error.
    async fn close(&mut self) -> Result<(), DriverError>;
}
