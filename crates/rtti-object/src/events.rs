//! Per-object change notifications.
//!
//! Every object owns an [`EventKey`]. Listeners subscribe to a key and are
//! called for each [`ObjectEvent`] dispatched through it. Dispatch clones the
//! listener list first, so listeners run without the dispatcher lock held and
//! may subscribe or unsubscribe themselves.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Key identifying an event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey(u64);

/// Identity of a subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Something that happened to an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectEvent {
    /// A data view write changed the value at `path`.
    PropertyChanged { path: String },
    /// The object went from unmodified to modified.
    Modified,
    /// The object finished loading.
    Loaded,
    ParentChanged,
}

pub type Listener = Arc<dyn Fn(&ObjectEvent) + Send + Sync>;

/// Listener lists by event key.
pub struct EventDispatcher {
    next_key: AtomicU64,
    next_listener: AtomicU64,
    listeners: RwLock<FxHashMap<EventKey, Vec<(ListenerId, Listener)>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            next_key: AtomicU64::new(1),
            next_listener: AtomicU64::new(1),
            listeners: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn new_key(&self) -> EventKey {
        EventKey(self.next_key.fetch_add(1, Ordering::Relaxed))
    }

    pub fn subscribe(
        &self,
        key: EventKey,
        listener: impl Fn(&ObjectEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(key)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a subscription; false if it was not registered for `key`.
    pub fn unsubscribe(&self, key: EventKey, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(list) = listeners.get_mut(&key) else {
            return false;
        };
        let before = list.len();
        list.retain(|(listener, _)| *listener != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(&key);
        }
        removed
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn dispatch(&self, key: EventKey, event: &ObjectEvent) {
        let listeners: Vec<Listener> = match self.listeners.read().get(&key) {
            Some(list) => list.iter().map(|(_, listener)| listener.clone()).collect(),
            None => return,
        };
        for listener in listeners {
            listener(event);
        }
    }

    /// Drop every listener of `key`.
    pub fn remove_key(&self, key: EventKey) {
        self.listeners.write().remove(&key);
    }

    pub fn listener_count(&self, key: EventKey) -> usize {
        self.listeners.read().get(&key).map_or(0, Vec::len)
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("keys", &self.listeners.read().len())
            .finish()
    }
}
