//! In-process event fan-out over a tokio broadcast channel.

use tokio::sync::broadcast;

use billing_types::{BillingEvent, EventPublisher};

/// Publishes billing events to any number of subscribers. A publish with no
/// subscriber, or with lagging ones, never blocks the caller.
#[derive(Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<BillingEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BillingEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: BillingEvent) {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => tracing::debug!(event = name, receivers, "event published"),
            Err(_) => tracing::trace!(event = name, "event dropped, no subscribers"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_types::{Amount, CashDetails, Currency, Gateway, TenantId, Transaction};

    fn event() -> BillingEvent {
        BillingEvent::Created {
            transaction: Transaction::new(
                TenantId::new(),
                Amount::new(100, Currency::USD).unwrap(),
                Gateway::Cash,
                CashDetails::default().into(),
            )
            .unwrap(),
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let publisher = BroadcastPublisher::new(8);
        let mut rx = publisher.subscribe();
        let sent = event();
        publisher.publish(sent.clone());
        assert_eq!(rx.recv().await.unwrap(), sent);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        BroadcastPublisher::new(1).publish(event());
    }
}
