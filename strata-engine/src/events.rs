//! Run event fan-out
//!
//! Every run and step transition is published on a broadcast bus. The
//! server's status surfaces subscribe directly; the webhook reporter
//! forwards each event as a JSON POST for external consumers.

use tokio::sync::broadcast;
use tracing::{debug, warn};

use strata_core::domain::event::RunEvent;

/// Broadcast bus for run events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event. Having no subscribers is fine; events are
    /// best-effort notifications, never load-bearing state.
    pub fn emit(&self, event: RunEvent) {
        debug!("event: {:?}", event);
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Forwards every event to a webhook URL
pub struct WebhookReporter;

impl WebhookReporter {
    /// Spawns the forwarding task. Delivery failures are logged and the
    /// stream continues; a slow consumer that lags the bus loses the lagged
    /// events, not the run.
    pub fn spawn(url: String, bus: &EventBus) -> tokio::task::JoinHandle<()> {
        let mut rx = bus.subscribe();
        let client = reqwest::Client::new();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Err(e) = client.post(&url).json(&event).send().await {
                            warn!("failed to deliver event to {}: {}", url, e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("webhook reporter lagged, {} event(s) dropped", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::domain::run::RunKind;

    #[tokio::test]
    async fn test_subscribers_receive_emitted_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(RunEvent::run_started("katarineko", "a1b2c3d4", RunKind::Trigger));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.pipeline(), "katarineko");
    }

    #[test]
    fn test_emit_without_subscribers_is_harmless() {
        let bus = EventBus::default();
        bus.emit(RunEvent::run_finished(
            "katarineko",
            "a1b2c3d4",
            strata_core::domain::run::RunStatus::Succeeded,
        ));
    }
}
