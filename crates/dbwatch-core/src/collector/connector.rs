use tracing::{debug, info};

use super::{Driver, NativeDriver, Session};
use crate::config::ConnectionConfig;
use crate::error::MonitorError;

/// Owns the connection config and the single session opened from it.
pub struct Connector<D: Driver = NativeDriver> {
    config: ConnectionConfig,
    driver: D,
    session: Option<Box<dyn Session>>,
}

impl Connector<NativeDriver> {
    /// Creates a connector using the native database clients.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_driver(config, NativeDriver)
    }
}

impl<D: Driver> Connector<D> {
    pub fn with_driver(config: ConnectionConfig, driver: D) -> Self {
        Self {
            config,
            driver,
            session: None,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Opens the session. An already open session is reused.
    pub fn open(&mut self) -> Result<(), MonitorError> {
        if self.session.is_some() {
            return Ok(());
        }

        debug!(
            dialect = %self.config.dialect(),
            host = %self.config.host(),
            port = self.config.port(),
            database = %self.config.database(),
            "opening database session"
        );
        let session = self.driver.connect(&self.config)?;
        info!(
            "Connected to {} database at {}:{}/{}",
            self.config.dialect(),
            self.config.host(),
            self.config.port(),
            self.config.database()
        );
        self.session = Some(session);
        Ok(())
    }

    /// The open session, if any.
    pub fn session(&mut self) -> Option<&mut (dyn Session + 'static)> {
        self.session.as_deref_mut()
    }

    /// Closes the session. No-op when nothing is open.
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
            info!("Database connection closed");
        }
    }
}

impl<D: Driver> Drop for Connector<D> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{ScriptedDriver, SessionScript};
    use crate::config::Dialect;

    fn config() -> ConnectionConfig {
        ConnectionConfig::new(Dialect::Postgresql, "localhost", 5432, "postgres", "postgres")
    }

    #[test]
    fn close_without_open_is_noop() {
        let driver = ScriptedDriver::new(SessionScript::default());
        let log = driver.log();
        let mut connector = Connector::with_driver(config(), driver);

        connector.close();
        connector.close();

        let log = log.lock().unwrap();
        assert_eq!(log.opens, 0);
        assert_eq!(log.closes, 0);
    }

    #[test]
    fn open_twice_keeps_single_session() {
        let driver = ScriptedDriver::new(SessionScript::default());
        let log = driver.log();
        let mut connector = Connector::with_driver(config(), driver);

        connector.open().unwrap();
        connector.open().unwrap();
        assert!(connector.is_open());
        assert_eq!(log.lock().unwrap().opens, 1);
    }

    #[test]
    fn close_is_idempotent() {
        let driver = ScriptedDriver::new(SessionScript::default());
        let log = driver.log();
        let mut connector = Connector::with_driver(config(), driver);

        connector.open().unwrap();
        connector.close();
        connector.close();
        assert!(!connector.is_open());
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[test]
    fn failed_open_leaves_connector_closed() {
        let driver = ScriptedDriver::failing("connection refused");
        let log = driver.log();
        let mut connector = Connector::with_driver(config(), driver);

        let err = connector.open().unwrap_err();
        assert_eq!(err, MonitorError::Connection("connection refused".into()));
        assert!(!connector.is_open());
        assert!(connector.session().is_none());
        assert_eq!(log.lock().unwrap().connect_attempts, 1);
    }

    #[test]
    fn drop_closes_open_session() {
        let driver = ScriptedDriver::new(SessionScript::default());
        let log = driver.log();
        {
            let mut connector = Connector::with_driver(config(), driver);
            connector.open().unwrap();
        }
        assert_eq!(log.lock().unwrap().closes, 1);
    }
}
