//! Database session handling and diagnostic probes.
//!
//! A [`Connector`] owns at most one [`Session`]. The session type is chosen
//! once, when the connection is opened, from the configured dialect:
//! - `pg_collector`: `pg_stat_activity` / `pg_stat_database` probes
//! - `mysql_collector`: `information_schema.PROCESSLIST` / `TABLES` probes
//!
//! Every probe is read-only. The functions in [`probes`] absorb per-probe
//! failures so that a check always completes with whatever data was gathered.

mod connector;
pub mod mock;
pub mod mysql_collector;
pub mod pg_collector;
pub mod probes;

pub use connector::Connector;
pub use mysql_collector::MySqlSession;
pub use pg_collector::PostgresSession;
pub use probes::{ProbeResults, collect};

use crate::config::{ConnectionConfig, Dialect};
use crate::error::MonitorError;
use crate::model::{ConnectionCounts, SizeAndCache, SlowQueryRecord};

/// An open database session exposing the probe set of one dialect.
pub trait Session {
    fn dialect(&self) -> Dialect;

    /// Sessions in a non-idle state running longer than `min_duration_ms`,
    /// excluding the probing session itself.
    fn slow_query_snapshot(
        &mut self,
        min_duration_ms: u64,
    ) -> Result<Vec<SlowQueryRecord>, MonitorError>;

    /// Active and total connection counts.
    fn connection_stats(&mut self) -> Result<ConnectionCounts, MonitorError>;

    /// Database size and, where supported, the buffer cache hit ratio.
    fn size_and_cache(&mut self) -> Result<SizeAndCache, MonitorError>;

    /// Releases the connection. Calling it again is a no-op.
    fn close(&mut self);
}

/// Opens sessions for a connection config.
pub trait Driver {
    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Session>, MonitorError>;
}

/// Driver backed by the native postgres and mysql clients.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeDriver;

impl Driver for NativeDriver {
    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Session>, MonitorError> {
        match config.dialect() {
            Dialect::Postgresql => Ok(Box::new(PostgresSession::connect(config)?)),
            Dialect::Mysql => Ok(Box::new(MySqlSession::connect(config)?)),
        }
    }
}
