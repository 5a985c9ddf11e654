//! # Event Registry
//!
//! Maps an event type to its listeners, in registration order, and remembers
//! every type that has *ever* had a listener. The second set never shrinks: it
//! is what lets the manager tell a type nobody subscribed to yet (queue the
//! event) from a type whose subscribers went away (drop the event).
//!
//! One registry is built per [`crate::manager::EventManager`] and shared with
//! its bus, pipeline and phase manager through an `Arc`.

use std::{fmt, future::Future, sync::Arc};

use dashmap::{DashMap, DashSet};
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::trace;

use crate::{event::Event, EventResult};

pub type ListenerFuture = BoxFuture<'static, EventResult<Value>>;

type ListenerFn = dyn Fn(Event) -> ListenerFuture + Send + Sync;

/// A subscriber callback.
///
/// Cloning is cheap and keeps identity: two handles are equal only when they
/// come from the same `Listener::new`/`Listener::sync` call. That identity is
/// what `off` matches on.
#[derive(Clone)]
pub struct Listener {
    inner: Arc<ListenerFn>,
}

impl Listener {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EventResult<Value>> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |event| -> ListenerFuture { Box::pin(f(event)) }),
        }
    }

    /// Wraps a synchronous callback. It runs when the listener is called,
    /// before the returned future is polled.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Event) -> EventResult<Value> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(move |event| -> ListenerFuture {
                let result = f(event);
                Box::pin(async move { result })
            }),
        }
    }

    pub fn call(&self, event: Event) -> ListenerFuture {
        (self.inner)(event)
    }

    pub fn ptr_eq(&self, other: &Listener) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Arc::as_ptr(&self.inner) as *const ())
    }
}

#[derive(Debug, Default)]
pub struct EventRegistry {
    listeners: DashMap<String, Vec<Listener>>,
    has_had_listeners: DashSet<String>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, event_type: &str, listener: Listener) {
        self.listeners
            .entry(event_type.to_string())
            .or_default()
            .push(listener);
        self.mark_has_listeners(event_type);
        trace!("Registered listener for {}", event_type);
    }

    /// Removes the first registration of `listener`. The having-had-listeners
    /// marker for the type is kept.
    pub fn unregister(&self, event_type: &str, listener: &Listener) -> bool {
        let removed = match self.listeners.get_mut(event_type) {
            Some(mut listeners) => match listeners.iter().position(|l| l.ptr_eq(listener)) {
                Some(index) => {
                    listeners.remove(index);
                    true
                }
                None => false,
            },
            None => false,
        };
        if removed {
            self.listeners
                .remove_if(event_type, |_, listeners| listeners.is_empty());
            trace!("Unregistered listener for {}", event_type);
        }
        removed
    }

    /// Snapshot of the listeners in registration order.
    pub fn get_listeners(&self, event_type: &str) -> Vec<Listener> {
        self.listeners
            .get(event_type)
            .map(|listeners| listeners.clone())
            .unwrap_or_default()
    }

    pub fn has_listeners(&self, event_type: &str) -> bool {
        self.listeners
            .get(event_type)
            .map(|listeners| !listeners.is_empty())
            .unwrap_or(false)
    }

    pub fn listener_count(&self, event_type: &str) -> usize {
        self.listeners
            .get(event_type)
            .map(|listeners| listeners.len())
            .unwrap_or(0)
    }

    pub fn has_ever_had_listeners(&self, event_type: &str) -> bool {
        self.has_had_listeners.contains(event_type)
    }

    pub fn mark_has_listeners(&self, event_type: &str) {
        self.has_had_listeners.insert(event_type.to_string());
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::event::{mapper::EventMapper, Phase};

    fn noop() -> Listener {
        Listener::sync(|_| Ok(Value::Null))
    }

    #[test]
    fn test_register_marks_type() {
        let registry = EventRegistry::new();
        assert!(!registry.has_ever_had_listeners("order"));
        registry.register("order", noop());
        assert!(registry.has_listeners("order"));
        assert!(registry.has_ever_had_listeners("order"));
        assert_eq!(registry.listener_count("order"), 1);
    }

    #[test]
    fn test_unregister_keeps_marker() {
        let registry = EventRegistry::new();
        let listener = noop();
        registry.register("order", listener.clone());
        assert!(registry.unregister("order", &listener));
        assert!(!registry.has_listeners("order"));
        assert!(registry.has_ever_had_listeners("order"));
        assert!(registry.get_listeners("order").is_empty());
    }

    #[test]
    fn test_unregister_by_identity() {
        let registry = EventRegistry::new();
        let first = noop();
        let second = noop();
        registry.register("order", first.clone());
        registry.register("order", second.clone());

        assert!(!registry.unregister("order", &noop()));
        assert!(registry.unregister("order", &first));

        let remaining = registry.get_listeners("order");
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].ptr_eq(&second));
    }

    #[test]
    fn test_unregister_unknown_type() {
        let registry = EventRegistry::new();
        assert!(!registry.unregister("nothing", &noop()));
    }

    #[test]
    fn test_listeners_keep_registration_order() {
        let registry = EventRegistry::new();
        let listeners: Vec<Listener> = (0..5).map(|_| noop()).collect();
        for listener in &listeners {
            registry.register("order", listener.clone());
        }
        let snapshot = registry.get_listeners("order");
        for (registered, stored) in listeners.iter().zip(snapshot.iter()) {
            assert!(registered.ptr_eq(stored));
        }
    }

    #[test]
    fn test_mark_without_register() {
        let registry = EventRegistry::new();
        registry.mark_has_listeners("audit");
        assert!(registry.has_ever_had_listeners("audit"));
        assert!(!registry.has_listeners("audit"));
    }

    #[tokio::test]
    async fn test_listener_call() {
        let listener = Listener::new(|event: Event| async move { Ok(event.data) });
        let event = EventMapper::default().create_event("order", json!({"id": 7}));
        assert_eq!(event.phase, Phase::Main);
        let result = listener.call(event).await.unwrap();
        assert_eq!(result, json!({"id": 7}));
    }

    #[test]
    fn test_listener_clone_is_equal() {
        let listener = noop();
        assert_eq!(listener, listener.clone());
        assert_ne!(listener, noop());
    }
}
