//! Phase transition events.
//!
//! The state machine publishes one event per transition. The CLI renders
//! them as spinner messages; tests use them to assert the path a run took.

use super::Phase;
use tokio::sync::broadcast;
use tracing::debug;

/// Maximum number of events buffered in the broadcast channel.
const EVENT_BUFFER_SIZE: usize = 256;

/// A transition of one cluster's state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseEvent {
    pub cluster: String,
    pub phase: Phase,
}

/// Publish/subscribe channel for phase events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PhaseEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { sender }
    }

    pub fn publish(&self, cluster: &str, phase: Phase) {
        debug!(cluster, %phase, "Publishing phase event");
        // No subscribers is fine.
        let _ = self.sender.send(PhaseEvent { cluster: cluster.to_string(), phase });
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber { receiver: self.sender.subscribe() }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EventSubscriber {
    receiver: broadcast::Receiver<PhaseEvent>,
}

impl EventSubscriber {
    /// Next event, or `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<PhaseEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("Event subscriber lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Drain everything already published without waiting.
    pub fn drain(&mut self) -> Vec<PhaseEvent> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return events,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish("default", Phase::Building);
        bus.publish("default", Phase::Ready);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.phase, Phase::Building);
        let rest = rx.drain();
        assert_eq!(rest, vec![PhaseEvent { cluster: "default".into(), phase: Phase::Ready }]);
    }

    #[test]
    fn test_publish_without_subscribers() {
        EventBus::new().publish("default", Phase::Idle);
    }
}
