//! Event registry.
//!
//! Listeners are registered per [`EventKind`] and removed by the handle
//! returned at registration. Emission only enqueues: a dispatcher task
//! drains the queue and calls listeners in registration order, so a slow
//! or panicking listener can never block or fail the transition that
//! produced the event. The same events are also broadcast for consumers
//! that prefer a stream.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use ota_types::{EventKind, UpdaterEvent};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Callback type for event listeners
pub type Listener = Arc<dyn Fn(&UpdaterEvent) + Send + Sync>;

/// Token identifying one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    kind: EventKind,
    id: u64,
}

impl ListenerHandle {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

pub struct EventRegistry {
    listeners: RwLock<BTreeMap<EventKind, Vec<(u64, Listener)>>>,
    next_id: AtomicU64,
    queue: mpsc::UnboundedSender<UpdaterEvent>,
    pending: Mutex<Option<mpsc::UnboundedReceiver<UpdaterEvent>>>,
    stream: broadcast::Sender<UpdaterEvent>,
}

impl EventRegistry {
    pub fn new() -> Self {
        let (queue, pending) = mpsc::unbounded_channel();
        let (stream, _) = broadcast::channel(1024);
        Self {
            listeners: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            queue,
            pending: Mutex::new(Some(pending)),
            stream,
        }
    }

    /// Spawn the dispatcher. Events emitted earlier are delivered once it
    /// runs; calling this twice returns `None`.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut rx = self.pending.lock().take()?;
        let registry: Weak<Self> = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.dispatch(&event);
            }
        }))
    }

    pub fn subscribe(&self, kind: EventKind, listener: Listener) -> ListenerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .entry(kind)
            .or_default()
            .push((id, listener));
        ListenerHandle { kind, id }
    }

    /// Remove a registration. Returns `false` for an unknown handle.
    pub fn unsubscribe(&self, handle: ListenerHandle) -> bool {
        let mut listeners = self.listeners.write();
        let Some(list) = listeners.get_mut(&handle.kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != handle.id);
        before != list.len()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.read().get(&kind).map_or(0, Vec::len)
    }

    /// Stream of every emitted event.
    pub fn stream(&self) -> broadcast::Receiver<UpdaterEvent> {
        self.stream.subscribe()
    }

    /// Fire-and-forget emission.
    pub fn emit(&self, event: UpdaterEvent) {
        trace!(kind = event.kind().name(), "Emitting event");
        // Ignore errors if no receivers.
        let _ = self.stream.send(event.clone());
        let _ = self.queue.send(event);
    }

    fn dispatch(&self, event: &UpdaterEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .get(&event.kind())
            .map(|list| list.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                warn!(kind = event.kind().name(), "Event listener panicked");
            }
        }
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}
