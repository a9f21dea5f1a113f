use async_trait::async_trait;
use std::sync::Arc;

use crate::models::LifecycleEvent;
use crate::services::collaborators::CollaboratorError;

/// Lifecycle notification collaborator
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        participant_id: &str,
        event: &LifecycleEvent,
    ) -> Result<(), CollaboratorError>;
}

/// Notifier that only writes the event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        participant_id: &str,
        event: &LifecycleEvent,
    ) -> Result<(), CollaboratorError> {
        tracing::info!("Notify {}: {:?}", participant_id, event);
        Ok(())
    }
}

/// Fire-and-forget delivery of lifecycle events.
///
/// Each notification runs on its own task; failures are logged and dropped
/// so the engine never waits on delivery.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub fn dispatch(&self, participant_id: &str, event: LifecycleEvent) {
        let notifier = Arc::clone(&self.notifier);
        let participant_id = participant_id.to_string();

        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&participant_id, &event).await {
                tracing::warn!(
                    "Failed to deliver {} to {}: {}",
                    event.name(),
                    participant_id,
                    e
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct ChannelNotifier(mpsc::UnboundedSender<(String, LifecycleEvent)>);

    #[async_trait]
    impl Notifier for ChannelNotifier {
        async fn notify(
            &self,
            participant_id: &str,
            event: &LifecycleEvent,
        ) -> Result<(), CollaboratorError> {
            let _ = self.0.send((participant_id.to_string(), event.clone()));
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(
            &self,
            _participant_id: &str,
            _event: &LifecycleEvent,
        ) -> Result<(), CollaboratorError> {
            Err(CollaboratorError::ApiError("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_dispatch_delivers_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = NotificationDispatcher::new(Arc::new(ChannelNotifier(tx)));
        let match_id = uuid::Uuid::new_v4();

        dispatcher.dispatch("p-1", LifecycleEvent::MatchCancelled { match_id });

        let (participant, event) = rx.recv().await.unwrap();
        assert_eq!(participant, "p-1");
        assert_eq!(event, LifecycleEvent::MatchCancelled { match_id });
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failures() {
        let dispatcher = NotificationDispatcher::new(Arc::new(FailingNotifier));

        // Must not panic or block the caller
        dispatcher.dispatch(
            "p-1",
            LifecycleEvent::MatchExpired {
                match_id: uuid::Uuid::new_v4(),
            },
        );
        tokio::task::yield_now().await;
    }
}
