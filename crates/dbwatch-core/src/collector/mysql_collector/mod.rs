//! MySQL probe set.
//!
//! `mysql_async` needs a Tokio context for its I/O, so each session owns a
//! current-thread runtime and blocks on it. The probe API stays synchronous,
//! like the PostgreSQL session.

mod queries;

use std::time::Duration;

use mysql_async::prelude::*;
use mysql_async::{Conn, OptsBuilder};
use tokio::runtime::Runtime;
use tracing::debug;

use super::Session;
use crate::config::{ConnectionConfig, Dialect};
use crate::error::MonitorError;
use crate::model::{ConnectionCounts, SizeAndCache, SlowQueryRecord};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Row shape of the slow-query probe.
type ProcessRow = (
    u64,
    Option<String>,
    Option<String>,
    i64,
    Option<String>,
    Option<String>,
);

/// Session over a single `mysql_async` connection.
pub struct MySqlSession {
    runtime: Runtime,
    conn: Option<Conn>,
}

impl MySqlSession {
    pub fn connect(config: &ConnectionConfig) -> Result<Self, MonitorError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| MonitorError::Connection(format!("failed to start MySQL runtime: {}", e)))?;

        let password = Some(config.password()).filter(|p| !p.is_empty());
        let opts = OptsBuilder::default()
            .ip_or_hostname(config.host())
            .tcp_port(config.port())
            .db_name(Some(config.database()))
            .user(Some(config.user()))
            .pass(password);

        let conn = runtime
            .block_on(async { tokio::time::timeout(CONNECT_TIMEOUT, Conn::new(opts)).await })
            .map_err(|_| MonitorError::Connection("connection timed out".to_string()))?
            .map_err(|e| MonitorError::Connection(format_mysql_error(&e)))?;

        Ok(Self {
            runtime,
            conn: Some(conn),
        })
    }

    fn query_count(&mut self, query: &'static str) -> Result<i64, MonitorError> {
        let Self { runtime, conn } = self;
        let conn = conn.as_mut().ok_or_else(closed)?;
        let count: Option<i64> = runtime
            .block_on(conn.query_first(query))
            .map_err(probe_error)?;
        Ok(count.unwrap_or(0))
    }
}

impl Session for MySqlSession {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
    }

    fn slow_query_snapshot(
        &mut self,
        min_duration_ms: u64,
    ) -> Result<Vec<SlowQueryRecord>, MonitorError> {
        let Self { runtime, conn } = self;
        let conn = conn.as_mut().ok_or_else(closed)?;
        let rows: Vec<ProcessRow> = runtime
            .block_on(conn.exec(queries::SLOW_QUERIES, (min_duration_ms,)))
            .map_err(probe_error)?;

        Ok(rows.into_iter().map(slow_query_from_row).collect())
    }

    fn connection_stats(&mut self) -> Result<ConnectionCounts, MonitorError> {
        Ok(ConnectionCounts {
            active: self.query_count(queries::ACTIVE_CONNECTIONS)?,
            total: self.query_count(queries::TOTAL_CONNECTIONS)?,
        })
    }

    fn size_and_cache(&mut self) -> Result<SizeAndCache, MonitorError> {
        let Self { runtime, conn } = self;
        let conn = conn.as_mut().ok_or_else(closed)?;
        // SUM over an empty schema is NULL.
        let size: Option<Option<String>> = runtime
            .block_on(conn.query_first(queries::DATABASE_SIZE))
            .map_err(probe_error)?;

        Ok(SizeAndCache {
            database_size: size.flatten(),
            cache_hit_ratio: None,
        })
    }

    fn close(&mut self) {
        if let Some(conn) = self.conn.take()
            && let Err(e) = self.runtime.block_on(conn.disconnect())
        {
            debug!(error = %format_mysql_error(&e), "error while closing MySQL session");
        }
    }
}

impl Drop for MySqlSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn slow_query_from_row(row: ProcessRow) -> SlowQueryRecord {
    let (pid, user, database, seconds, state, query) = row;
    SlowQueryRecord {
        pid: i64::try_from(pid).unwrap_or(i64::MAX),
        user: user.unwrap_or_default(),
        database,
        duration_ms: seconds as f64 * 1000.0,
        state: state.unwrap_or_default(),
        query_preview: query.unwrap_or_default(),
        wait_event_type: None,
        wait_event: None,
    }
}

fn closed() -> MonitorError {
    MonitorError::Probe("session is closed".to_string())
}

fn probe_error(e: mysql_async::Error) -> MonitorError {
    MonitorError::Probe(format_mysql_error(&e))
}

/// Formats MySQL error message for display.
pub(crate) fn format_mysql_error(e: &mysql_async::Error) -> String {
    match e {
        mysql_async::Error::Server(server) => {
            format!("{} (error {})", server.message, server.code)
        }
        other => {
            let msg = other.to_string();
            if msg.contains("Connection refused") {
                "connection refused".to_string()
            } else {
                msg
            }
        }
    }
}
