//! Event fan-out for the detection gateway.
//!
//! State transitions are published on a bounded broadcast channel:
//! delivery is best-effort and never blocks the publishing component. An
//! observer that lags past the buffer loses the oldest events rather than
//! stalling anyone else.
//!
//! Late subscribers obtain a snapshot of the active block records before
//! consuming the stream (see `api::event_stream`): the receiver is
//! registered first and the snapshot taken second, so a transition can be
//! seen twice but never missed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::core::classifier::Classification;
use crate::core::mitigation::BlockRecord;

/// A state transition published to observers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Event {
    IdentityBlocked {
        record: BlockRecord,
    },
    IdentityUnblocked {
        identity: String,
        timestamp: DateTime<Utc>,
    },
    DetectionResult {
        identity: String,
        classification: Classification,
        allowed: bool,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn identity_unblocked(identity: &str) -> Self {
        Event::IdentityUnblocked {
            identity: identity.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn detection_result(identity: &str, classification: Classification, allowed: bool) -> Self {
        Event::DetectionResult {
            identity: identity.to_string(),
            classification,
            allowed,
            timestamp: Utc::now(),
        }
    }
}

/// Publishes events to all currently subscribed observers
pub struct EventNotifier {
    tx: broadcast::Sender<Event>,
}

impl EventNotifier {
    /// Create a notifier with the given per-observer buffer size
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self { tx }
    }

    /// Fire-and-forget publish. A send with no observers is not an error.
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    /// Register a new observer
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of currently subscribed observers
    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Verdict;

    fn sample_classification() -> Classification {
        Classification {
            prediction: Verdict::Anomalous,
            confidence: 0.88,
            explanation: None,
            model: None,
            degraded: false,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_all_observers() {
        let notifier = EventNotifier::new(16);
        let mut rx1 = notifier.subscribe();
        let mut rx2 = notifier.subscribe();
        assert_eq!(notifier.observer_count(), 2);

        notifier.publish(Event::identity_unblocked("10.0.0.5"));

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                Event::IdentityUnblocked { identity, .. } => assert_eq!(identity, "10.0.0.5"),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_publish_without_observers_is_not_an_error() {
        let notifier = EventNotifier::new(16);
        notifier.publish(Event::detection_result(
            "10.0.0.5",
            sample_classification(),
            true,
        ));
    }

    #[tokio::test]
    async fn test_slow_observer_lags_instead_of_blocking() {
        let notifier = EventNotifier::new(2);
        let mut rx = notifier.subscribe();

        // Publishing past the buffer never blocks the publisher
        for _ in 0..5 {
            notifier.publish(Event::identity_unblocked("10.0.0.5"));
        }

        // The lagged observer is told how much it missed, then catches up
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(missed)) => assert_eq!(missed, 3),
            other => panic!("expected lag, got {:?}", other),
        }
        assert!(rx.recv().await.is_ok());
    }

    #[test]
    fn test_event_serializes_with_kind_tag() {
        let event = Event::identity_unblocked("10.0.0.5");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "identity-unblocked");
        assert_eq!(json["identity"], "10.0.0.5");
    }
}
