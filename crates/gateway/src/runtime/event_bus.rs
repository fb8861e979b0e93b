//! In-process pub/sub decoupling the agent loop from whoever is
//! listening for its output (chat transport, persistence, debugging
//! tools). Subscribers attach to a named tag with a priority; within a
//! tag, higher-priority subscribers run first. Emission never blocks
//! the producer — events are enqueued and a background task drains them.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;

const DEFAULT_HISTORY: usize = 1000;

/// A single emitted event: a tag (e.g. `turn:<session_id>`) and a JSON
/// payload whose shape is defined by the emitter.
#[derive(Debug, Clone)]
pub struct Event {
    pub tag: String,
    pub payload: Value,
}

pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`], needed to remove the
/// subscription later via [`EventBus::unsubscribe`]. Transports that
/// bridge a tag to a per-connection channel (chat WS) must unsubscribe
/// when the connection closes, or the handler — and the channel sender
/// it closed over — leaks for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    priority: i32,
    handler: Handler,
}

struct Inner {
    subscribers: RwLock<HashMap<String, Vec<Subscriber>>>,
    history: RwLock<VecDeque<Event>>,
    history_cap: usize,
}

/// Priority-ordered in-process event bus with a bounded replay history.
pub struct EventBus {
    inner: Arc<Inner>,
    tx: mpsc::UnboundedSender<Event>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }

    pub fn with_history(history_cap: usize) -> Self {
        let inner = Arc::new(Inner {
            subscribers: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::with_capacity(history_cap)),
            history_cap,
        });
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

        let drain_inner = inner.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                drain_inner.dispatch(&event);
                drain_inner.record(event);
            }
        });

        Self {
            inner,
            tx,
            next_id: AtomicU64::new(1),
        }
    }

    /// Attach `handler` to `tag`. Higher `priority` runs before lower
    /// priority among subscribers on the same tag. Returns an id for
    /// [`Self::unsubscribe`].
    pub fn subscribe(&self, tag: impl Into<String>, priority: i32, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subs_by_tag = self.inner.subscribers.write();
        let subs = subs_by_tag.entry(tag.into()).or_default();
        subs.push(Subscriber {
            id,
            priority,
            handler,
        });
        // Keep this tag's subscriber list sorted so dispatch order is
        // deterministic even if subscriptions arrive out of order.
        subs.sort_by(|a, b| b.priority.cmp(&a.priority));
        id
    }

    /// Remove a subscription previously returned by [`Self::subscribe`].
    /// A no-op if it was already removed or `tag` has no subscribers.
    pub fn unsubscribe(&self, tag: &str, id: SubscriptionId) {
        if let Some(subs) = self.inner.subscribers.write().get_mut(tag) {
            subs.retain(|s| s.id != id);
        }
    }

    /// Enqueue `payload` under `tag`. Returns immediately; dispatch
    /// happens on the background drain task.
    pub fn emit(&self, tag: impl Into<String>, payload: Value) {
        let event = Event {
            tag: tag.into(),
            payload,
        };
        // A closed receiver only happens if the bus itself was dropped;
        // nothing to deliver to in that case.
        let _ = self.tx.send(event);
    }

    pub fn history(&self) -> Vec<Event> {
        self.inner.history.read().iter().cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn dispatch(&self, event: &Event) {
        let subs = self.subscribers.read();
        if let Some(list) = subs.get(&event.tag) {
            for sub in list {
                // A handler panic or logged error must not stop delivery
                // to the remaining subscribers.
                let handler = sub.handler.clone();
                let event = event.clone();
                if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    (handler)(&event)
                })) {
                    tracing::error!(tag = %event.tag, ?panic, "event bus subscriber panicked");
                }
            }
        }
    }

    fn record(&self, event: Event) {
        let mut history = self.history.write();
        if history.len() >= self.history_cap {
            history.pop_front();
        }
        history.push_back(event);
    }
}
