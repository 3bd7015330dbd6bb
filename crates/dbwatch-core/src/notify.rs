//! Alert delivery.
//!
//! The core only needs [`Notifier::notify`], which never fails and never
//! blocks indefinitely. Concrete transports plug in as [`AlertChannel`]s
//! behind a [`ChannelNotifier`], which logs and swallows delivery failures.

use tracing::{debug, warn};

use crate::error::MonitorError;

/// Receives findings as subject/message pairs.
pub trait Notifier {
    fn notify(&self, subject: &str, message: &str);
}

impl<N: Notifier + ?Sized> Notifier for &N {
    fn notify(&self, subject: &str, message: &str) {
        (**self).notify(subject, message)
    }
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn notify(&self, subject: &str, message: &str) {
        (**self).notify(subject, message)
    }
}

/// Writes alerts to the log. Always available as the fallback transport.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, subject: &str, message: &str) {
        warn!("ALERT: {}", subject);
        warn!("Message: {}", message);
    }
}

/// Discards alerts.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _subject: &str, _message: &str) {}
}

/// A fallible alert transport (mail, chat, pager, ...).
pub trait AlertChannel: Send + Sync {
    /// Channel name used in log lines.
    fn name(&self) -> &str;

    fn send(&self, subject: &str, message: &str) -> Result<(), MonitorError>;
}

/// Fans alerts out to every registered channel.
///
/// A failing channel is logged and skipped; the remaining channels still
/// receive the alert.
#[derive(Default)]
pub struct ChannelNotifier {
    channels: Vec<Box<dyn AlertChannel>>,
}

impl ChannelNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: impl AlertChannel + 'static) -> Self {
        self.register(Box::new(channel));
        self
    }

    pub fn register(&mut self, channel: Box<dyn AlertChannel>) {
        debug!(channel = channel.name(), "alert channel registered");
        self.channels.push(channel);
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, subject: &str, message: &str) {
        for channel in &self.channels {
            match channel.send(subject, message) {
                Ok(()) => debug!(channel = channel.name(), subject, "alert delivered"),
                Err(e) => warn!(channel = channel.name(), error = %e, "alert delivery failed"),
            }
        }
    }
}

/// The log transport as a channel, so it can sit next to real ones.
impl AlertChannel for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn send(&self, subject: &str, message: &str) -> Result<(), MonitorError> {
        self.notify(subject, message);
        Ok(())
    }
}

/// Collects alerts in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    alerts: std::sync::Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts received so far, in delivery order.
    pub fn alerts(&self) -> Vec<(String, String)> {
        self.alerts
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, subject: &str, message: &str) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push((subject.to_string(), message.to_string()));
        }
    }
}

impl AlertChannel for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    fn send(&self, subject: &str, message: &str) -> Result<(), MonitorError> {
        self.notify(subject, message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct BrokenChannel;

    impl AlertChannel for BrokenChannel {
        fn name(&self) -> &str {
            "broken"
        }

        fn send(&self, _subject: &str, _message: &str) -> Result<(), MonitorError> {
            Err(MonitorError::Notification("smtp unreachable".to_string()))
        }
    }

    struct Shared(Arc<RecordingNotifier>);

    impl AlertChannel for Shared {
        fn name(&self) -> &str {
            "shared"
        }

        fn send(&self, subject: &str, message: &str) -> Result<(), MonitorError> {
            self.0.send(subject, message)
        }
    }

    #[test]
    fn failing_channel_does_not_block_the_next_one() {
        let recorder = Arc::new(RecordingNotifier::new());
        let notifier = ChannelNotifier::new()
            .with_channel(BrokenChannel)
            .with_channel(Shared(Arc::clone(&recorder)));

        notifier.notify("Low Cache Hit Ratio", "Cache hit ratio: 80%");

        assert_eq!(notifier.len(), 2);
        assert_eq!(
            recorder.alerts(),
            vec![(
                "Low Cache Hit Ratio".to_string(),
                "Cache hit ratio: 80%".to_string()
            )]
        );
    }

    #[test]
    fn empty_channel_notifier_is_a_noop() {
        let notifier = ChannelNotifier::new();
        assert!(notifier.is_empty());
        notifier.notify("subject", "message");
    }

    #[test]
    fn recording_notifier_keeps_order() {
        let recorder = RecordingNotifier::new();
        recorder.notify("a", "1");
        recorder.notify("b", "2");
        let subjects: Vec<String> = recorder.alerts().into_iter().map(|(s, _)| s).collect();
        assert_eq!(subjects, vec!["a", "b"]);
    }

    #[test]
    fn boxed_and_borrowed_notifiers_forward() {
        let recorder = RecordingNotifier::new();
        {
            let by_ref: &dyn Notifier = &recorder;
            by_ref.notify("ref", "");
        }
        let boxed: Box<dyn Notifier> = Box::new(NoopNotifier);
        boxed.notify("dropped", "");
        assert_eq!(recorder.alerts().len(), 1);
    }
}
