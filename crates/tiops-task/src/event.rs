//! Synchronous publish/subscribe for task progress.
//!
//! The UI layer subscribes to draw spinners; the engine publishes and
//! never depends on anyone listening. Handlers run on the publishing
//! thread, so they must be cheap and thread-safe.

use std::collections::HashMap;
use std::sync::RwLock;

/// The three event kinds tasks emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A task is about to execute.
    TaskBegin,
    /// A task finished executing.
    TaskFinish,
    /// A task made observable progress.
    TaskProgress,
}

/// A task lifecycle event.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// Emitted by `Serial`/`Parallel` before a child executes.
    Begin {
        /// The task's stable string form.
        task: String,
    },
    /// Emitted by `Serial`/`Parallel` after a child executed.
    Finish {
        /// The task's stable string form.
        task: String,
        /// The failure, if any.
        error: Option<String>,
    },
    /// Emitted by display wrappers as work proceeds.
    Progress {
        /// The task's stable string form.
        task: String,
        /// Free-form progress text.
        progress: String,
    },
}

impl TaskEvent {
    /// The kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Begin { .. } => EventKind::TaskBegin,
            Self::Finish { .. } => EventKind::TaskFinish,
            Self::Progress { .. } => EventKind::TaskProgress,
        }
    }
}

type Handler = Box<dyn Fn(&TaskEvent) + Send + Sync>;

/// In-process pub/sub bus for task events.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<Handler>>>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `handler` to every future event of `kind`.
    pub fn subscribe(&self, kind: EventKind, handler: impl Fn(&TaskEvent) + Send + Sync + 'static) {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers.entry(kind).or_default().push(Box::new(handler));
    }

    /// Publishes `event`, running matching handlers on this thread.
    pub fn publish(&self, event: &TaskEvent) {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        if let Some(list) = handlers.get(&event.kind()) {
            for handler in list {
                handler(event);
            }
        }
    }

    /// Number of handlers subscribed to `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.get(&kind).map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_publish_reaches_matching_kind_only() {
        let bus = EventBus::new();
        let begins = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&begins);
        bus.subscribe(EventKind::TaskBegin, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&TaskEvent::Begin {
            task: "Mkdir: host=10.0.0.1".to_string(),
        });
        bus.publish(&TaskEvent::Progress {
            task: "x".to_string(),
            progress: "50%".to_string(),
        });

        assert_eq!(begins.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(EventKind::TaskBegin), 1);
        assert_eq!(bus.subscriber_count(EventKind::TaskFinish), 0);
    }

    #[test]
    fn test_handlers_run_on_publisher_thread() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        bus.subscribe(EventKind::TaskFinish, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&TaskEvent::Finish {
            task: "t".to_string(),
            error: None,
        });
        // Synchronous: the handler already ran.
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
