//! Mirrors successful repository writes onto an [`EventBus`].

use std::sync::Arc;

use async_trait::async_trait;
use checklist_storage::{Checklist, WriteObserver};
use tracing::error;

use super::bus::{Event, EventBus, EventKind};

/// [`WriteObserver`] that publishes one event per written checklist.
///
/// Publish failures are logged and counted; the observed write still succeeds.
pub struct EventBusWriteObserver<B: ?Sized = dyn EventBus> {
    bus: Arc<B>,
}

impl<B: EventBus + ?Sized> EventBusWriteObserver<B> {
    pub fn new(bus: Arc<B>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<B> {
        &self.bus
    }

    async fn publish(&self, kind: EventKind, events: Vec<Event>) {
        let count = events.len();
        let outcome = match self.bus.send(events).await {
            Ok(()) => "success",
            Err(err) => {
                error!(error = %err, kind = %kind, count, "Unable to publish checklist events");
                "error"
            }
        };
        metrics::counter!(
            "ova_checklist_events_published_total",
            "kind" => kind.as_str(),
            "outcome" => outcome
        )
        .increment(count as u64);
    }
}

#[async_trait]
impl<B: EventBus + ?Sized> WriteObserver for EventBusWriteObserver<B> {
    async fn on_add_success(&self, checklists: &[Checklist]) {
        let events = checklists
            .iter()
            .map(|c| Event::new(EventKind::Created, c.user_id, c.id.as_str()))
            .collect();
        self.publish(EventKind::Created, events).await;
    }

    async fn on_remove_success(&self, user_id: u64, checklist_id: &str) {
        let event = Event::new(EventKind::Removed, user_id, checklist_id);
        self.publish(EventKind::Removed, vec![event]).await;
    }

    async fn on_update_success(&self, checklist: &Checklist) {
        let event = Event::new(EventKind::Updated, checklist.user_id, checklist.id.as_str());
        self.publish(EventKind::Updated, vec![event]).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBusError;
    use checklist_storage::{ChecklistRepository, MemoryChecklistRepository};
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct CapturingBus {
        sent: Mutex<Vec<Event>>,
        fail: bool,
    }

    #[async_trait]
    impl EventBus for CapturingBus {
        async fn send(&self, events: Vec<Event>) -> Result<(), EventBusError> {
            if self.fail {
                return Err(EventBusError::Publish {
                    count: events.len(),
                    message: "broker unavailable".to_string(),
                });
            }
            self.sent.lock().unwrap().extend(events);
            Ok(())
        }

        async fn close(&self) -> Result<(), EventBusError> {
            Ok(())
        }
    }

    fn checklist(user_id: u64, title: &str) -> Checklist {
        Checklist::new(user_id, title, "", Vec::new())
    }

    #[tokio::test]
    async fn test_multi_add_fans_out_to_one_event_each() {
        let bus = Arc::new(CapturingBus::default());
        let observer = EventBusWriteObserver::new(Arc::clone(&bus));
        let items = vec![checklist(1, "a"), checklist(2, "b"), checklist(1, "c")];

        observer.on_add_success(&items).await;

        let expected: Vec<_> = items
            .iter()
            .map(|c| Event::new(EventKind::Created, c.user_id, c.id.clone()))
            .collect();
        assert_eq!(*bus.sent.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_remove_and_update_events() {
        let bus = Arc::new(CapturingBus::default());
        let observer = EventBusWriteObserver::new(Arc::clone(&bus));
        let item = checklist(5, "a");

        observer.on_update_success(&item).await;
        observer.on_remove_success(5, &item.id).await;

        assert_eq!(
            *bus.sent.lock().unwrap(),
            vec![
                Event::new(EventKind::Updated, 5, item.id.clone()),
                Event::new(EventKind::Removed, 5, item.id.clone()),
            ]
        );
    }

    #[tokio::test]
    async fn test_bus_failure_does_not_fail_the_write() {
        let bus: Arc<dyn EventBus> = Arc::new(CapturingBus {
            fail: true,
            ..CapturingBus::default()
        });
        let repo = MemoryChecklistRepository::with_observer(EventBusWriteObserver::new(bus));
        let cancel = CancellationToken::new();
        let item = checklist(1, "a");

        repo.add(&cancel, std::slice::from_ref(&item)).await.unwrap();
        repo.update(&cancel, &item).await.unwrap();
        repo.remove(&cancel, 1, &item.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_repository_writes_emit_events() {
        let bus = Arc::new(CapturingBus::default());
        let repo =
            MemoryChecklistRepository::with_observer(EventBusWriteObserver::new(Arc::clone(&bus)));
        let cancel = CancellationToken::new();
        let items = vec![checklist(1, "a"), checklist(1, "b")];

        repo.add(&cancel, &items).await.unwrap();
        repo.remove(&cancel, 1, &items[0].id).await.unwrap();

        let kinds: Vec<_> = bus.sent.lock().unwrap().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Created, EventKind::Created, EventKind::Removed]
        );
    }
}
