//! Event publishing, error reporting and clock implementations

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::domain::experiment::{Clock, ErrorReporter, EventPublisher, ExperimentEvent};

use super::observability::record_reported_error;

// ============================================================================
// Event publishers
// ============================================================================

/// Writes every event as a structured log line
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventPublisher;

impl EventPublisher for TracingEventPublisher {
    fn publish(&self, event: &ExperimentEvent) {
        info!(
            event = event.name(),
            experiment_id = %event.experiment_id(),
            payload = %event.payload(),
            "Experiment event"
        );
    }
}

/// Fans events out to in-process subscribers
#[derive(Debug, Clone)]
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<ExperimentEvent>,
}

impl BroadcastEventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExperimentEvent> {
        self.sender.subscribe()
    }
}

impl EventPublisher for BroadcastEventPublisher {
    fn publish(&self, event: &ExperimentEvent) {
        // No subscribers is not an error for fire-and-forget delivery
        let _ = self.sender.send(event.clone());
    }
}

/// Publishes to several sinks in order
#[derive(Default, Clone)]
pub struct CompositeEventPublisher {
    publishers: Vec<Arc<dyn EventPublisher>>,
}

impl CompositeEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publishers.push(publisher);
        self
    }
}

impl std::fmt::Debug for CompositeEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeEventPublisher")
            .field("publishers", &self.publishers.len())
            .finish()
    }
}

impl EventPublisher for CompositeEventPublisher {
    fn publish(&self, event: &ExperimentEvent) {
        for publisher in &self.publishers {
            publisher.publish(event);
        }
    }
}

// ============================================================================
// Error reporting
// ============================================================================

/// Logs reported failures and counts them per source
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, message: &str, source: &str, context: &Value) {
        if source.ends_with("validation") {
            warn!(source, context = %context, "{}", message);
        } else {
            error!(source, context = %context, "{}", message);
        }

        record_reported_error(source);
    }
}

// ============================================================================
// Clocks
// ============================================================================

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        match self.now.write() {
            Ok(mut now) => *now = at,
            Err(poisoned) => *poisoned.into_inner() = at,
        }
    }

    pub fn advance(&self, by: Duration) {
        let next = self.now() + by;
        self.set(next);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experiment::{ExperimentId, StopReason};
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 8, 0, 0).unwrap()
    }

    fn stopped_event() -> ExperimentEvent {
        ExperimentEvent::ExperimentStopped {
            experiment_id: ExperimentId::new("exp-1").unwrap(),
            reason: StopReason::Manual,
            total_participants: 10,
            timestamp: start(),
        }
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(start());
        assert_eq!(clock.now(), start());

        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), start() + Duration::minutes(90));

        clock.set(start());
        assert_eq!(clock.now(), start());
    }

    #[tokio::test]
    async fn test_broadcast_publisher_delivers_to_subscribers() {
        let publisher = BroadcastEventPublisher::new(8);
        let mut receiver = publisher.subscribe();

        publisher.publish(&stopped_event());

        let received = receiver.recv().await.unwrap();
        assert_eq!(received, stopped_event());
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        let publisher = BroadcastEventPublisher::new(1);
        publisher.publish(&stopped_event());
    }

    #[test]
    fn test_late_subscriber_misses_earlier_events() {
        let publisher = BroadcastEventPublisher::new(4);
        publisher.publish(&stopped_event());

        let mut receiver = publisher.subscribe();
        assert!(matches!(
            receiver.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));

        publisher.publish(&stopped_event());
        let received = tokio_test::block_on(receiver.recv()).unwrap();
        assert_eq!(received.name(), "experiment_stopped");
    }

    #[tokio::test]
    async fn test_composite_publisher_fans_out() {
        let first = BroadcastEventPublisher::new(4);
        let second = BroadcastEventPublisher::new(4);
        let mut first_rx = first.subscribe();
        let mut second_rx = second.subscribe();

        let composite = CompositeEventPublisher::new()
            .with_publisher(Arc::new(first))
            .with_publisher(Arc::new(second))
            .with_publisher(Arc::new(TracingEventPublisher));

        composite.publish(&stopped_event());

        assert_eq!(first_rx.recv().await.unwrap().name(), "experiment_stopped");
        assert_eq!(second_rx.recv().await.unwrap().name(), "experiment_stopped");
    }
}
