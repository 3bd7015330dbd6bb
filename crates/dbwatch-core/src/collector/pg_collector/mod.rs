//! PostgreSQL probe set.
//!
//! Reads from:
//! - `pg_stat_activity`: running statements, connection counts
//! - `pg_stat_database`: buffer cache hits/reads of the current database
//! - `pg_database_size()`: on-disk size of the current database

mod queries;

use std::time::Duration;

use postgres::{Client, NoTls, Row};
use tracing::debug;

use super::Session;
use crate::config::{ConnectionConfig, Dialect};
use crate::error::MonitorError;
use crate::model::{ConnectionCounts, SizeAndCache, SlowQueryRecord, cache_hit_ratio};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Session over a synchronous `postgres::Client`.
pub struct PostgresSession {
    client: Option<Client>,
}

impl PostgresSession {
    pub fn connect(config: &ConnectionConfig) -> Result<Self, MonitorError> {
        let mut pg = postgres::Config::new();
        pg.host(config.host())
            .port(config.port())
            .dbname(config.database())
            .user(config.user())
            .application_name("dbwatch")
            .connect_timeout(CONNECT_TIMEOUT);
        if !config.password().is_empty() {
            pg.password(config.password());
        }

        let client = pg
            .connect(NoTls)
            .map_err(|e| MonitorError::Connection(format_postgres_error(&e)))?;
        Ok(Self {
            client: Some(client),
        })
    }

    fn client(&mut self) -> Result<&mut Client, MonitorError> {
        self.client
            .as_mut()
            .ok_or_else(|| MonitorError::Probe("session is closed".to_string()))
    }

    fn count(&mut self, query: &str) -> Result<i64, MonitorError> {
        let row = self.client()?.query_one(query, &[]).map_err(probe_error)?;
        row.try_get(0).map_err(probe_error)
    }
}

impl Session for PostgresSession {
    fn dialect(&self) -> Dialect {
        Dialect::Postgresql
    }

    fn slow_query_snapshot(
        &mut self,
        min_duration_ms: u64,
    ) -> Result<Vec<SlowQueryRecord>, MonitorError> {
        let threshold = min_duration_ms as f64;
        let rows = self
            .client()?
            .query(queries::SLOW_QUERIES, &[&threshold])
            .map_err(probe_error)?;
        rows.iter()
            .map(slow_query_from_row)
            .collect::<Result<_, _>>()
            .map_err(probe_error)
    }

    fn connection_stats(&mut self) -> Result<ConnectionCounts, MonitorError> {
        Ok(ConnectionCounts {
            active: self.count(queries::ACTIVE_CONNECTIONS)?,
            total: self.count(queries::TOTAL_CONNECTIONS)?,
        })
    }

    fn size_and_cache(&mut self) -> Result<SizeAndCache, MonitorError> {
        let client = self.client()?;

        let size: Option<String> = client
            .query_one(queries::DATABASE_SIZE, &[])
            .and_then(|row| row.try_get(0))
            .map_err(probe_error)?;

        let row = client
            .query_one(queries::CACHE_BLOCKS, &[])
            .map_err(probe_error)?;
        let hits: i64 = row.try_get("hits").map_err(probe_error)?;
        let reads: i64 = row.try_get("reads").map_err(probe_error)?;

        Ok(SizeAndCache {
            database_size: size,
            cache_hit_ratio: cache_hit_ratio(hits, reads),
        })
    }

    fn close(&mut self) {
        if let Some(client) = self.client.take()
            && let Err(e) = client.close()
        {
            debug!(error = %format_postgres_error(&e), "error while closing PostgreSQL session");
        }
    }
}

fn slow_query_from_row(row: &Row) -> Result<SlowQueryRecord, postgres::Error> {
    Ok(SlowQueryRecord {
        pid: row.try_get("pid")?,
        user: row.try_get("usename")?,
        database: row.try_get("datname")?,
        duration_ms: row.try_get("duration_ms")?,
        state: row.try_get("state")?,
        query_preview: row.try_get("query_preview")?,
        wait_event_type: row.try_get("wait_event_type")?,
        wait_event: row.try_get("wait_event")?,
    })
}

fn probe_error(e: postgres::Error) -> MonitorError {
    MonitorError::Probe(format_postgres_error(&e))
}

/// Formats PostgreSQL error message for display.
pub(crate) fn format_postgres_error(e: &postgres::Error) -> String {
    if let Some(db_error) = e.as_db_error() {
        format!("{}: {}", db_error.severity(), db_error.message())
    } else {
        let msg = e.to_string();
        if msg.contains("Connection refused") {
            "connection refused".to_string()
        } else if msg.contains("password authentication failed") {
            "password authentication failed".to_string()
        } else if msg.contains("does not exist") {
            msg.split("FATAL:")
                .last()
                .unwrap_or(&msg)
                .trim()
                .to_string()
        } else if msg.contains("timed out") {
            "connection timed out".to_string()
        } else {
            msg
        }
    }
}
