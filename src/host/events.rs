use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use serde_json::Value;

use super::HostResult;

pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

#[async_trait]
pub trait EventChannel: Send + Sync {
    async fn listen(&self, event: &str, handler: EventHandler) -> HostResult<Subscription>;
}

/// Registration handle for one event listener.
///
/// The listener is removed when the handle is dropped or
/// [`Subscription::unsubscribe`] is called, whichever comes first.
pub struct Subscription {
    event: String,
    unlisten: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(event: impl Into<String>, unlisten: impl FnOnce() + Send + 'static) -> Self {
        Self {
            event: event.into(),
            unlisten: Some(Box::new(unlisten)),
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unlisten) = self.unlisten.take() {
            tracing::trace!(event = %self.event, "unsubscribing listener");
            unlisten();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("active", &self.unlisten.is_some())
            .finish()
    }
}

type ListenerMap = HashMap<String, Vec<(u64, EventHandler)>>;

/// In-process event registry. Transports push host events into it with
/// [`EventBus::emit`]; components register through [`EventChannel`].
#[derive(Default)]
pub struct EventBus {
    listeners: Arc<Mutex<ListenerMap>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, event: &str, handler: EventHandler) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock_listeners(&self.listeners)
            .entry(event.to_string())
            .or_default()
            .push((id, handler));

        let registry: Weak<Mutex<ListenerMap>> = Arc::downgrade(&self.listeners);
        let key = event.to_string();
        Subscription::new(event, move || {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            let mut listeners = lock_listeners(&registry);
            if let Some(handlers) = listeners.get_mut(&key) {
                handlers.retain(|(handler_id, _)| *handler_id != id);
                if handlers.is_empty() {
                    listeners.remove(&key);
                }
            }
        })
    }

    /// Deliver `payload` to every listener of `event`; returns how many ran.
    pub fn emit(&self, event: &str, payload: Value) -> usize {
        let handlers: Vec<EventHandler> = lock_listeners(&self.listeners)
            .get(event)
            .map(|handlers| handlers.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            tracing::trace!(event, "event emitted with no listeners");
        }
        for handler in &handlers {
            handler(payload.clone());
        }
        handlers.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        lock_listeners(&self.listeners)
            .get(event)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl EventChannel for EventBus {
    async fn listen(&self, event: &str, handler: EventHandler) -> HostResult<Subscription> {
        Ok(self.subscribe(event, handler))
    }
}

fn lock_listeners(listeners: &Mutex<ListenerMap>) -> std::sync::MutexGuard<'_, ListenerMap> {
    listeners
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
