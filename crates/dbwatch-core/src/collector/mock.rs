//! Scripted driver for tests and dry runs.
//!
//! [`ScriptedDriver`] hands out [`ScriptedSession`]s that replay fixed probe
//! responses and record every call in a shared [`SessionLog`].

use std::sync::{Arc, Mutex};

use super::{Driver, Session};
use crate::config::{ConnectionConfig, Dialect};
use crate::error::MonitorError;
use crate::model::{ConnectionCounts, SizeAndCache, SlowQueryRecord};

/// Callback run at the start of every slow-query probe.
pub type ProbeHook = Arc<dyn Fn() + Send + Sync>;

/// Fixed probe responses.
#[derive(Clone)]
pub struct SessionScript {
    pub dialect: Dialect,
    pub slow_queries: Result<Vec<SlowQueryRecord>, MonitorError>,
    pub connection_stats: Result<ConnectionCounts, MonitorError>,
    pub size_and_cache: Result<SizeAndCache, MonitorError>,
    pub on_probe: Option<ProbeHook>,
}

impl Default for SessionScript {
    fn default() -> Self {
        Self {
            dialect: Dialect::Postgresql,
            slow_queries: Ok(Vec::new()),
            connection_stats: Ok(ConnectionCounts::default()),
            size_and_cache: Ok(SizeAndCache::default()),
            on_probe: None,
        }
    }
}

impl SessionScript {
    /// A script where every probe fails.
    pub fn failing_probes(dialect: Dialect) -> Self {
        let err = || MonitorError::Probe("simulated driver error".to_string());
        Self {
            dialect,
            slow_queries: Err(err()),
            connection_stats: Err(err()),
            size_and_cache: Err(err()),
            on_probe: None,
        }
    }

    pub fn with_slow_queries(mut self, records: Vec<SlowQueryRecord>) -> Self {
        self.slow_queries = Ok(records);
        self
    }

    pub fn with_connections(mut self, active: i64, total: i64) -> Self {
        self.connection_stats = Ok(ConnectionCounts { active, total });
        self
    }

    pub fn with_size_and_cache(mut self, size: &str, cache_hit_ratio: Option<f64>) -> Self {
        self.size_and_cache = Ok(SizeAndCache {
            database_size: Some(size.to_string()),
            cache_hit_ratio,
        });
        self
    }

    pub fn with_probe_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_probe = Some(Arc::new(hook));
        self
    }
}

/// Calls observed by scripted sessions.
#[derive(Debug, Default)]
pub struct SessionLog {
    pub connect_attempts: usize,
    pub opens: usize,
    pub closes: usize,
    pub slow_query_probes: usize,
    pub stats_probes: usize,
    pub last_min_duration_ms: Option<u64>,
}

/// Driver returning scripted sessions, or a scripted connection failure.
pub struct ScriptedDriver {
    script: SessionScript,
    connect_error: Option<String>,
    log: Arc<Mutex<SessionLog>>,
}

impl ScriptedDriver {
    pub fn new(script: SessionScript) -> Self {
        Self {
            script,
            connect_error: None,
            log: Arc::new(Mutex::new(SessionLog::default())),
        }
    }

    /// A driver whose every connection attempt fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            connect_error: Some(message.to_string()),
            ..Self::new(SessionScript::default())
        }
    }

    /// Shared call log, readable after the driver has been moved.
    pub fn log(&self) -> Arc<Mutex<SessionLog>> {
        Arc::clone(&self.log)
    }
}

impl Driver for ScriptedDriver {
    fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn Session>, MonitorError> {
        let mut log = self.log.lock().map_err(|_| poisoned())?;
        log.connect_attempts += 1;
        if let Some(ref msg) = self.connect_error {
            return Err(MonitorError::Connection(msg.clone()));
        }
        log.opens += 1;
        Ok(Box::new(ScriptedSession {
            script: self.script.clone(),
            log: Arc::clone(&self.log),
            closed: false,
        }))
    }
}

/// Session replaying a [`SessionScript`].
pub struct ScriptedSession {
    script: SessionScript,
    log: Arc<Mutex<SessionLog>>,
    closed: bool,
}

impl ScriptedSession {
    fn record(&self, f: impl FnOnce(&mut SessionLog)) {
        if let Ok(mut log) = self.log.lock() {
            f(&mut log);
        }
    }
}

impl Session for ScriptedSession {
    fn dialect(&self) -> Dialect {
        self.script.dialect
    }

    fn slow_query_snapshot(
        &mut self,
        min_duration_ms: u64,
    ) -> Result<Vec<SlowQueryRecord>, MonitorError> {
        if let Some(ref hook) = self.script.on_probe {
            hook();
        }
        self.record(|log| {
            log.slow_query_probes += 1;
            log.last_min_duration_ms = Some(min_duration_ms);
        });
        self.script.slow_queries.clone()
    }

    fn connection_stats(&mut self) -> Result<ConnectionCounts, MonitorError> {
        self.record(|log| log.stats_probes += 1);
        self.script.connection_stats.clone()
    }

    fn size_and_cache(&mut self) -> Result<SizeAndCache, MonitorError> {
        self.script.size_and_cache.clone()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.record(|log| log.closes += 1);
        }
    }
}

/// Builds a slow-query record with the fields the analysis looks at.
pub fn slow_query(pid: i64, duration_ms: f64, query: &str) -> SlowQueryRecord {
    SlowQueryRecord {
        pid,
        user: "app".to_string(),
        database: Some("app".to_string()),
        duration_ms,
        state: "active".to_string(),
        query_preview: query.to_string(),
        wait_event_type: None,
        wait_event: None,
    }
}

fn poisoned() -> MonitorError {
    MonitorError::Connection("scripted driver log poisoned".to_string())
}
