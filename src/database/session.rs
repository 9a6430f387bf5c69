//! Database session
//!
//! A `Session` owns at most one live connection and tracks its lifecycle:
//!
//! ```text
//! Disconnected -> Connecting -> Connected | Failed
//! Connected -> Disconnecting -> Disconnected
//! Failed -> Disconnected | Connecting
//! ```
//!
//! The connection handle exists only while the session is `Connected`, so a
//! connected session without an active profile cannot be represented.

use crate::database::driver::{DatabaseDriver, DriverConnection, DriverError};
use crate::database::profile::ConnectionProfile;
use crate::database::result::QueryResult;
use crate::error::{BrowserError, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Statement used to validate a fresh connection
const PROBE_SQL: &str = "SELECT 1";

/// Observable connection state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connectivity {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    /// The last attempt failed, or the transport was severed
    Failed(String),
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Connectivity::Disconnected => write!(f, "disconnected"),
            Connectivity::Connecting => write!(f, "connecting"),
            Connectivity::Connected => write!(f, "connected"),
            Connectivity::Disconnecting => write!(f, "disconnecting"),
            Connectivity::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

enum SessionState {
    Disconnected,
    Connecting,
    Connected {
        profile: ConnectionProfile,
        conn: Box<dyn DriverConnection>,
    },
    Disconnecting,
    Failed {
        reason: String,
    },
}

/// Outcome of `connect` and `test_connection`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOutcome {
    pub success: bool,
    pub message: String,
    pub failure_detail: Option<String>,
}

impl ConnectOutcome {
    fn succeeded(message: String) -> Self {
        Self {
            success: true,
            message,
            failure_detail: None,
        }
    }

    fn failed(message: String, detail: String) -> Self {
        Self {
            success: false,
            message,
            failure_detail: Some(detail),
        }
    }

    /// Convert into a `Result`, mapping failure to `ConnectionFailed`
    pub fn into_result(self) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(BrowserError::ConnectionFailed(
                self.failure_detail.unwrap_or(self.message),
            ))
        }
    }
}

/// A single-connection database session
pub struct Session {
    driver: Arc<dyn DatabaseDriver>,
    state: SessionState,
    /// Bumped on every successful connect
    epoch: u64,
}

impl Session {
    /// Create a disconnected session over the given driver
    pub fn new(driver: Arc<dyn DatabaseDriver>) -> Self {
        Self {
            driver,
            state: SessionState::Disconnected,
            epoch: 0,
        }
    }

    /// The driver this session opens connections with
    pub fn driver(&self) -> Arc<dyn DatabaseDriver> {
        self.driver.clone()
    }

    /// Current connection state
    pub fn connectivity(&self) -> Connectivity {
        match &self.state {
            SessionState::Disconnected => Connectivity::Disconnected,
            SessionState::Connecting => Connectivity::Connecting,
            SessionState::Connected { .. } => Connectivity::Connected,
            SessionState::Disconnecting => Connectivity::Disconnecting,
            SessionState::Failed { reason } => Connectivity::Failed(reason.clone()),
        }
    }

    /// Check if a live connection is held
    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected { .. })
    }

    /// Profile of the live connection, if any
    pub fn current_profile(&self) -> Option<&ConnectionProfile> {
        match &self.state {
            SessionState::Connected { profile, .. } => Some(profile),
            _ => None,
        }
    }

    /// Number of successful connects so far
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Connect using `profile`, closing any existing connection first.
    ///
    /// Never returns an error; failures are reported in the outcome and leave
    /// the session `Failed` with no handle allocated.
    pub async fn connect(&mut self, profile: ConnectionProfile) -> ConnectOutcome {
        self.teardown().await;

        let target = profile.display_target();
        self.state = SessionState::Connecting;
        debug!(server = %target, "Opening connection");

        match self.driver.open(&profile).await {
            Ok(conn) => {
                self.epoch += 1;
                info!(server = %target, epoch = self.epoch, "Connected");
                let message = format!("Connected to {}", display_name(&profile));
                self.state = SessionState::Connected { profile, conn };
                ConnectOutcome::succeeded(message)
            }
            Err(e) => {
                warn!(server = %target, error = %e, "Connection failed");
                self.state = SessionState::Failed {
                    reason: e.message.clone(),
                };
                ConnectOutcome::failed(
                    format!("Failed to connect to {}", display_name(&profile)),
                    e.message,
                )
            }
        }
    }

    /// Validate a profile with a short-lived connection.
    ///
    /// The probe connection is always closed and this session's own state is
    /// left untouched.
    pub async fn test_connection(&self, profile: &ConnectionProfile) -> ConnectOutcome {
        test_connection(self.driver.as_ref(), profile).await
    }

    /// Close the live connection, if any. Idempotent.
    pub async fn disconnect(&mut self) {
        if self.is_connected() {
            info!("Disconnecting");
        }
        self.teardown().await;
    }

    /// Run a statement on the live connection
    pub async fn execute_query(&mut self, sql: &str) -> Result<QueryResult> {
        self.execute_with_params(sql, &[]).await
    }

    /// Run a statement with positional text parameters.
    ///
    /// A failed statement leaves the connection in place unless the driver
    /// reports the transport as lost, in which case the session moves to
    /// `Failed`.
    pub async fn execute_with_params(&mut self, sql: &str, params: &[String]) -> Result<QueryResult> {
        let conn = match &mut self.state {
            SessionState::Connected { conn, .. } => conn,
            _ => return Err(BrowserError::NotConnected),
        };

        let started = Instant::now();
        let outcome = conn.query(sql, params).await;
        match outcome {
            Ok(response) => {
                let elapsed = started.elapsed();
                debug!(
                    rows = response.row_count,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Statement finished"
                );
                Ok(QueryResult::from_driver(response, elapsed))
            }
            Err(e) if e.is_connection_lost() => {
                self.mark_severed(&e).await;
                Err(BrowserError::QueryFailed(e.message))
            }
            Err(e) => Err(BrowserError::QueryFailed(e.message)),
        }
    }

    async fn mark_severed(&mut self, error: &DriverError) {
        warn!(error = %error, "Connection lost");
        let previous = std::mem::replace(&mut self.state, SessionState::Disconnecting);
        if let SessionState::Connected { mut conn, .. } = previous {
            if let Err(e) = conn.close().await {
                debug!(error = %e, "Ignoring close error on severed connection");
            }
        }
        self.state = SessionState::Failed {
            reason: error.message.clone(),
        };
    }

    async fn teardown(&mut self) {
        let previous = std::mem::replace(&mut self.state, SessionState::Disconnecting);
        if let SessionState::Connected { profile, mut conn } = previous {
            if let Err(e) = conn.close().await {
                warn!(server = %profile.display_target(), error = %e, "Error closing connection");
            }
        }
        self.state = SessionState::Disconnected;
    }
}

/// Open, probe and close a throwaway connection
pub async fn test_connection(
    driver: &dyn DatabaseDriver,
    profile: &ConnectionProfile,
) -> ConnectOutcome {
    let target = profile.display_target();
    let mut conn = match driver.open(profile).await {
        Ok(conn) => conn,
        Err(e) => {
            return ConnectOutcome::failed(format!("Cannot reach {}", target), e.message);
        }
    };

    let probe = conn.query(PROBE_SQL, &[]).await;
    if let Err(e) = conn.close().await {
        warn!(server = %target, error = %e, "Error closing test connection");
    }

    match probe {
        Ok(_) => ConnectOutcome::succeeded(format!("Connection to {} succeeded", target)),
        Err(e) => ConnectOutcome::failed(format!("Connection test against {} failed", target), e.message),
    }
}

fn display_name(profile: &ConnectionProfile) -> String {
    if profile.name.is_empty() {
        profile.display_target()
    } else {
        profile.name.clone()
    }
}
