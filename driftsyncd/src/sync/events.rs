use serde::Serialize;
use tokio::sync::broadcast;

/// Status stream consumed by any frontend (CLI, UI, log sink). The sync core
/// only ever publishes; it never knows who is listening.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SyncEvent {
    Started {
        file_id: String,
        operation_id: i64,
    },
    Progress {
        file_id: String,
        fraction: f64,
    },
    Completed {
        file_id: String,
        operation_id: i64,
    },
    Failed {
        file_id: String,
        operation_id: i64,
        reason: String,
    },
    ConflictDetected {
        conflict_id: i64,
        local_path: String,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Publishing with no subscribers is fine; events are advisory.
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.emit(SyncEvent::Started {
            file_id: "f".into(),
            operation_id: 1,
        });
        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::Started {
                file_id: "f".into(),
                operation_id: 1,
            }
        );
    }

    #[test]
    fn emitting_without_subscribers_does_not_fail() {
        let bus = EventBus::new(8);
        bus.emit(SyncEvent::Progress {
            file_id: "f".into(),
            fraction: 0.5,
        });
    }
}
