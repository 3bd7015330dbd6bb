//! Scheduler loop.
//!
//! ```text
//! Disconnected --open--> Connected --> Checking --> Sleeping --> Checking ...
//!      |                                   |            |
//!      +--open failed--> Stopped <---------+------------+
//! ```
//!
//! The shutdown signal is only observed outside of a check: a signal raised
//! while a check is running takes effect once that check (notifications
//! included) has finished. While sleeping, the signal is polled every tick.
//! The session is closed exactly once, whichever way the run ends.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, info_span};

use crate::analysis::{Evaluator, Finding};
use crate::collector::{Connector, Driver, NativeDriver, probes};
use crate::config::{Dialect, MonitorSettings};
use crate::error::MonitorError;
use crate::fmt::format_duration;
use crate::model::{DatabaseStats, SlowQueryRecord};
use crate::notify::{LogNotifier, Notifier};
use crate::report;

/// Polling granularity of the shutdown signal while sleeping.
pub const SHUTDOWN_TICK: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Disconnected,
    Connected,
    Checking,
    Sleeping,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// One-shot check finished.
    Completed,
    /// The total duration budget was used up.
    DurationElapsed,
    /// The shutdown signal was raised.
    Cancelled,
}

/// Result of one check.
#[derive(Clone, Debug, Serialize)]
pub struct CheckSummary {
    /// 1-based check number within the run.
    pub check: u64,
    pub timestamp: DateTime<Utc>,
    pub dialect: Dialect,
    pub slow_queries_count: usize,
    pub slow_queries: Vec<SlowQueryRecord>,
    pub stats: DatabaseStats,
    pub findings: Vec<Finding>,
    pub probe_failures: usize,
}

/// Result of a whole run.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub checks: u64,
    pub reason: StopReason,
    pub last_check: Option<CheckSummary>,
}

/// Cloneable cancellation flag, raised from a signal handler.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleeps up to `timeout` in steps of `tick`.
    ///
    /// Returns true as soon as the signal is seen, false if the full timeout
    /// elapsed without it.
    pub fn wait(&self, timeout: Duration, tick: Duration) -> bool {
        let mut remaining = timeout;
        while remaining > Duration::ZERO {
            if self.is_triggered() {
                return true;
            }
            let step = remaining.min(tick);
            std::thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
        self.is_triggered()
    }
}

/// Drives connector, probes, evaluation and notification.
pub struct Monitor<D: Driver = NativeDriver, N: Notifier = LogNotifier> {
    connector: Connector<D>,
    notifier: N,
    evaluator: Evaluator,
    settings: MonitorSettings,
    state: MonitorState,
    checks: u64,
    tick: Duration,
}

impl<D: Driver, N: Notifier> Monitor<D, N> {
    /// Creates a monitor. Fails with a configuration error on invalid thresholds.
    pub fn new(
        connector: Connector<D>,
        notifier: N,
        settings: MonitorSettings,
    ) -> Result<Self, MonitorError> {
        settings.validate()?;
        Ok(Self {
            connector,
            notifier,
            evaluator: Evaluator::new(&settings.thresholds),
            settings,
            state: MonitorState::Disconnected,
            checks: 0,
            tick: SHUTDOWN_TICK,
        })
    }

    /// Overrides the shutdown polling tick.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn checks(&self) -> u64 {
        self.checks
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Opens the database session. Failure is fatal and stops the monitor.
    pub fn connect(&mut self) -> Result<(), MonitorError> {
        if self.state == MonitorState::Stopped {
            return Err(MonitorError::Connection("monitor is stopped".to_string()));
        }
        match self.connector.open() {
            Ok(()) => {
                self.state = MonitorState::Connected;
                Ok(())
            }
            Err(e) => {
                self.stop();
                Err(e)
            }
        }
    }

    /// Runs one probe, evaluate and notify cycle on the open session.
    pub fn check(&mut self) -> Result<CheckSummary, MonitorError> {
        let thresholds = &self.settings.thresholds;
        let Some(session) = self.connector.session() else {
            return Err(MonitorError::Connection(
                "no open database session".to_string(),
            ));
        };

        self.state = MonitorState::Checking;
        self.checks += 1;
        let _span = info_span!("check", n = self.checks).entered();

        let timestamp = Utc::now();
        let dialect = session.dialect();
        let results = probes::collect(session, thresholds.slow_query_ms);
        let findings = self
            .evaluator
            .evaluate(&results.slow_queries, &results.stats);

        let summary = CheckSummary {
            check: self.checks,
            timestamp,
            dialect,
            slow_queries_count: results.slow_queries.len(),
            slow_queries: results.slow_queries,
            stats: results.stats,
            findings,
            probe_failures: results.failures,
        };

        report::log_check(&summary, thresholds);
        for finding in &summary.findings {
            self.notifier.notify(&finding.subject, &finding.message);
        }
        report::log_check_end();

        self.state = MonitorState::Connected;
        Ok(summary)
    }

    /// Connects, runs exactly one check and stops.
    pub fn run_once(&mut self) -> Result<CheckSummary, MonitorError> {
        let result = self.connect().and_then(|()| self.check());
        self.stop();
        result
    }

    /// Checks every interval until the duration budget is used up or
    /// `shutdown` is raised.
    pub fn run(&mut self, shutdown: &ShutdownSignal) -> Result<RunSummary, MonitorError> {
        info!(
            "Starting continuous monitoring (interval: {})",
            format_duration(self.settings.interval)
        );
        let result = self
            .settings
            .validate_schedule()
            .and_then(|()| self.run_loop(shutdown));
        self.stop();
        result
    }

    fn run_loop(&mut self, shutdown: &ShutdownSignal) -> Result<RunSummary, MonitorError> {
        self.connect()?;

        let started = Instant::now();
        let budget = self.settings.duration;

        loop {
            info!("Check #{}", self.checks + 1);
            let last_check = Some(self.check()?);

            let remaining = match budget {
                Some(budget) => {
                    let elapsed = started.elapsed();
                    if elapsed >= budget {
                        return Ok(self.finish(StopReason::DurationElapsed, last_check));
                    }
                    Some(budget - elapsed)
                }
                None => None,
            };

            if shutdown.is_triggered() {
                return Ok(self.finish(StopReason::Cancelled, last_check));
            }

            self.state = MonitorState::Sleeping;
            let pause = remaining.map_or(self.settings.interval, |r| r.min(self.settings.interval));
            debug!(pause_ms = pause.as_millis() as u64, "sleeping until next check");

            if shutdown.wait(pause, self.tick) {
                return Ok(self.finish(StopReason::Cancelled, last_check));
            }
            if let Some(budget) = budget
                && started.elapsed() >= budget
            {
                return Ok(self.finish(StopReason::DurationElapsed, last_check));
            }
        }
    }

    fn finish(&self, reason: StopReason, last_check: Option<CheckSummary>) -> RunSummary {
        match reason {
            StopReason::Cancelled => info!("Monitoring stopped by user"),
            StopReason::DurationElapsed => info!(
                "Monitoring duration limit reached ({})",
                format_duration(self.settings.duration.unwrap_or_default())
            ),
            StopReason::Completed => {}
        }
        RunSummary {
            checks: self.checks,
            reason,
            last_check,
        }
    }

    /// Closes the session and enters the terminal state.
    pub fn stop(&mut self) {
        self.connector.close();
        self.state = MonitorState::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{ScriptedDriver, SessionScript, slow_query};
    use crate::config::ConnectionConfig;
    use crate::notify::{NoopNotifier, RecordingNotifier};

    fn connector(driver: ScriptedDriver) -> Connector<ScriptedDriver> {
        let config = ConnectionConfig::new(Dialect::Postgresql, "localhost", 5432, "app", "app");
        Connector::with_driver(config, driver)
    }

    fn watch_settings(interval_secs: u64, duration: Option<Duration>) -> MonitorSettings {
        MonitorSettings {
            interval: Duration::from_secs(interval_secs),
            duration,
            ..MonitorSettings::default()
        }
    }

    #[test]
    fn one_shot_reports_every_scripted_slow_query() {
        let script = SessionScript::default()
            .with_slow_queries(vec![
                slow_query(10, 1200.0, "SELECT a"),
                slow_query(11, 7000.0, "SELECT b"),
                slow_query(12, 3000.0, "SELECT c"),
            ])
            .with_connections(4, 20)
            .with_size_and_cache("7453 kB", Some(99.2));
        let driver = ScriptedDriver::new(script);
        let log = driver.log();
        let recorder = RecordingNotifier::new();
        let mut monitor =
            Monitor::new(connector(driver), &recorder, MonitorSettings::default()).unwrap();

        let summary = monitor.run_once().unwrap();

        assert_eq!(summary.slow_queries_count, 3);
        assert_eq!(summary.slow_queries[0].pid, 11);
        assert_eq!(summary.check, 1);
        assert_eq!(summary.findings.len(), 1);
        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert_eq!(
            recorder.alerts()[0].0,
            "Very Slow Query Detected (PID 11)".to_string()
        );

        let log = log.lock().unwrap();
        assert_eq!(log.opens, 1);
        assert_eq!(log.closes, 1);
        assert_eq!(log.last_min_duration_ms, Some(1000));
    }

    #[test]
    fn failing_probes_do_not_abort_the_check() {
        let driver = ScriptedDriver::new(SessionScript::failing_probes(Dialect::Mysql));
        let recorder = RecordingNotifier::new();
        let mut monitor =
            Monitor::new(connector(driver), &recorder, MonitorSettings::default()).unwrap();

        let summary = monitor.run_once().unwrap();

        assert_eq!(summary.slow_queries_count, 0);
        assert_eq!(summary.probe_failures, 3);
        assert!(summary.findings.is_empty());
        assert!(recorder.alerts().is_empty());
        assert_eq!(summary.dialect, Dialect::Mysql);
    }

    #[test]
    fn connection_failure_is_fatal_and_stops() {
        let driver = ScriptedDriver::failing("connection refused");
        let log = driver.log();
        let mut monitor =
            Monitor::new(connector(driver), LogNotifier, MonitorSettings::default()).unwrap();

        let err = monitor.run(&ShutdownSignal::new()).unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert_eq!(monitor.checks(), 0);
        let log = log.lock().unwrap();
        assert_eq!(log.connect_attempts, 1);
        assert_eq!(log.slow_query_probes, 0);
        assert_eq!(log.closes, 0);
    }

    #[test]
    fn stopped_monitor_does_not_reconnect() {
        let driver = ScriptedDriver::new(SessionScript::default());
        let log = driver.log();
        let mut monitor =
            Monitor::new(connector(driver), LogNotifier, MonitorSettings::default()).unwrap();

        monitor.run_once().unwrap();
        assert!(monitor.connect().is_err());
        assert_eq!(log.lock().unwrap().opens, 1);
    }

    #[test]
    fn check_without_session_is_an_error() {
        let driver = ScriptedDriver::new(SessionScript::default());
        let mut monitor =
            Monitor::new(connector(driver), LogNotifier, MonitorSettings::default()).unwrap();

        assert!(matches!(monitor.check(), Err(MonitorError::Connection(_))));
        assert_eq!(monitor.checks(), 0);
    }

    #[test]
    fn invalid_thresholds_are_rejected_before_connecting() {
        let driver = ScriptedDriver::new(SessionScript::default());
        let log = driver.log();
        let mut settings = MonitorSettings::default();
        settings.thresholds.min_cache_hit_ratio = 120.0;

        let err = Monitor::new(connector(driver), LogNotifier, settings)
            .err()
            .unwrap();
        assert!(matches!(err, MonitorError::Configuration(_)));
        assert_eq!(log.lock().unwrap().connect_attempts, 0);
    }

    #[test]
    fn watch_rejects_sub_second_interval_before_connecting() {
        let driver = ScriptedDriver::new(SessionScript::default());
        let log = driver.log();
        let mut monitor = Monitor::new(
            connector(driver),
            LogNotifier,
            watch_settings(0, Some(Duration::ZERO)),
        )
        .unwrap();

        let err = monitor.run(&ShutdownSignal::new()).unwrap_err();
        assert!(matches!(err, MonitorError::Configuration(_)));
        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert_eq!(log.lock().unwrap().connect_attempts, 0);
    }

    #[test]
    fn one_shot_ignores_the_interval() {
        let driver = ScriptedDriver::new(SessionScript::default());
        let mut monitor =
            Monitor::new(connector(driver), LogNotifier, watch_settings(0, None)).unwrap();

        let summary = monitor.run_once().unwrap();
        assert_eq!(summary.check, 1);
    }

    #[test]
    fn panic_inside_a_check_still_closes_the_session_once() {
        let script = SessionScript::default().with_probe_hook(|| panic!("driver blew up"));
        let driver = ScriptedDriver::new(script);
        let log = driver.log();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let mut monitor =
                Monitor::new(connector(driver), LogNotifier, MonitorSettings::default()).unwrap();
            monitor.run_once()
        }));

        assert!(outcome.is_err());
        let log = log.lock().unwrap();
        assert_eq!(log.opens, 1);
        assert_eq!(log.closes, 1);
        assert_eq!(log.slow_query_probes, 0);
    }

    #[test]
    fn cancellation_while_sleeping_stops_within_a_tick() {
        let driver = ScriptedDriver::new(SessionScript::default());
        let log = driver.log();
        let mut monitor = Monitor::new(connector(driver), LogNotifier, watch_settings(60, None))
            .unwrap()
            .with_tick(Duration::from_millis(10));

        let shutdown = ShutdownSignal::new();
        let trigger = shutdown.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            trigger.trigger();
        });

        let started = Instant::now();
        let run = monitor.run(&shutdown).unwrap();
        handle.join().unwrap();

        assert_eq!(run.reason, StopReason::Cancelled);
        assert_eq!(run.checks, 1);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(monitor.state(), MonitorState::Stopped);
        let log = log.lock().unwrap();
        assert_eq!(log.slow_query_probes, 1);
        assert_eq!(log.closes, 1);
    }

    #[test]
    fn cancellation_during_check_is_deferred_until_it_completes() {
        let shutdown = ShutdownSignal::new();
        let trigger = shutdown.clone();
        let script = SessionScript::default()
            .with_slow_queries(vec![slow_query(5, 8000.0, "SELECT pg_sleep(60)")])
            .with_connections(150, 200)
            .with_probe_hook(move || trigger.trigger());
        let driver = ScriptedDriver::new(script);
        let log = driver.log();
        let recorder = RecordingNotifier::new();
        let mut monitor = Monitor::new(connector(driver), &recorder, watch_settings(60, None))
            .unwrap()
            .with_tick(Duration::from_millis(10));

        let started = Instant::now();
        let run = monitor.run(&shutdown).unwrap();

        assert_eq!(run.reason, StopReason::Cancelled);
        assert_eq!(run.checks, 1);
        assert!(started.elapsed() < Duration::from_secs(5));
        // The interrupted check still ran every probe and delivered its alerts.
        let log = log.lock().unwrap();
        assert_eq!(log.slow_query_probes, 1);
        assert_eq!(log.stats_probes, 1);
        assert_eq!(recorder.alerts().len(), 2);
        let last = run.last_check.unwrap();
        assert_eq!(last.findings.len(), 2);
    }

    #[test]
    fn zero_duration_budget_runs_a_single_check() {
        let driver = ScriptedDriver::new(SessionScript::default());
        let mut monitor = Monitor::new(
            connector(driver),
            LogNotifier,
            watch_settings(60, Some(Duration::ZERO)),
        )
        .unwrap();

        let run = monitor.run(&ShutdownSignal::new()).unwrap();
        assert_eq!(run.reason, StopReason::DurationElapsed);
        assert_eq!(run.checks, 1);
    }

    #[test]
    fn sleep_is_clipped_to_the_remaining_budget() {
        let driver = ScriptedDriver::new(SessionScript::default());
        let log = driver.log();
        let mut monitor = Monitor::new(
            connector(driver),
            LogNotifier,
            watch_settings(60, Some(Duration::from_millis(150))),
        )
        .unwrap()
        .with_tick(Duration::from_millis(10));

        let started = Instant::now();
        let run = monitor.run(&ShutdownSignal::new()).unwrap();

        assert_eq!(run.reason, StopReason::DurationElapsed);
        assert_eq!(run.checks, 1);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[test]
    fn shutdown_wait_returns_early_when_triggered() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        let started = Instant::now();
        assert!(signal.wait(Duration::from_secs(30), Duration::from_millis(100)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn shutdown_wait_times_out_without_signal() {
        let signal = ShutdownSignal::new();
        assert!(!signal.wait(Duration::from_millis(30), Duration::from_millis(10)));
    }

    #[test]
    fn check_summary_serializes_slow_query_count() {
        let driver = ScriptedDriver::new(
            SessionScript::default().with_slow_queries(vec![slow_query(1, 1500.0, "x")]),
        );
        let mut monitor =
            Monitor::new(connector(driver), NoopNotifier, MonitorSettings::default()).unwrap();
        let summary = monitor.run_once().unwrap();

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["slow_queries_count"], 1);
        assert_eq!(json["dialect"], "postgresql");
    }
}
