//! # Event Manager
//!
//! The façade collaborators talk to. It builds the registry, context, bus and
//! mapper once and exposes `emit`, `on`, `off`, `request` and `channel`.
//!
//! ## Emit policy
//!
//! ```text
//! emit(type)
//!   ├─ listeners registered ─────────────▶ bus.emit            (Dispatched)
//!   ├─ never had listeners ──────────────▶ per-type EventQueue  (Queued)
//!   └─ had listeners, none left ─────────▶ warn and discard     (Dropped)
//! ```
//!
//! The first `on` for a queued type replays the whole queue through the bus
//! and discards it. The bus unregisters every listener of a type after an
//! emit (after the last event, for a replay), so a subscription sees either
//! the replayed batch or one later emit.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures::future::try_join_all;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::{
    bus::{EventBus, EventHook},
    channel::Channel,
    config::EventConfig,
    correlation::CorrelationIdFactory,
    event::{context::EventContext, mapper::EventMapper, Event},
    queue::EventQueue,
    registry::{EventRegistry, Listener},
    EventError, EventResult,
};

/// What `emit` did with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum EmitOutcome {
    /// Ran through the bus; carries the processed event.
    Dispatched(Box<Event>),
    /// Buffered until the first subscriber arrives.
    Queued { queue_len: usize },
    /// The type's subscribers are gone, so the event was discarded.
    Dropped,
}

pub(crate) struct ManagerInner {
    registry: Arc<EventRegistry>,
    context: Arc<EventContext>,
    bus: EventBus,
    mapper: EventMapper,
    queues: DashMap<String, EventQueue>,
    channels: DashMap<String, Channel>,
    queue_capacity: usize,
}

#[derive(Clone)]
pub struct EventManager {
    inner: Arc<ManagerInner>,
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EventManager {
    pub fn new() -> Self {
        Self::build(&EventConfig::default(), CorrelationIdFactory::new())
    }

    /// Fails only when `config.namespace` is not a valid correlation id namespace.
    pub fn with_config(config: EventConfig) -> EventResult<Self> {
        let correlation_ids = CorrelationIdFactory::with_namespace(&config.namespace)?;
        Ok(Self::build(&config, correlation_ids))
    }

    fn build(config: &EventConfig, correlation_ids: CorrelationIdFactory) -> Self {
        let registry = Arc::new(EventRegistry::new());
        let context = Arc::new(EventContext::new());
        let bus = EventBus::new(registry.clone(), config.strategy.build(), context.clone());
        debug!(
            "EventManager ready: strategy={}, queue_capacity={}, namespace={}",
            config.strategy,
            config.queue_capacity,
            correlation_ids.namespace()
        );
        Self {
            inner: Arc::new(ManagerInner {
                registry,
                context,
                bus,
                mapper: EventMapper::new(Arc::new(correlation_ids)),
                queues: DashMap::new(),
                channels: DashMap::new(),
                queue_capacity: config.queue_capacity,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ManagerInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ManagerInner> {
        Arc::downgrade(&self.inner)
    }

    /// Publishes an event. Never fails: listener errors stay on the event.
    #[instrument(level = "debug", skip(self, data))]
    pub async fn emit(&self, qualified: &str, data: Value) -> EmitOutcome {
        let event = self.inner.mapper.create_event(qualified, data);
        let event_type = event.event_type.clone();

        if self.inner.registry.has_listeners(&event_type) {
            let processed = self.inner.bus.emit(event).await;
            return EmitOutcome::Dispatched(Box::new(processed));
        }

        if self.inner.registry.has_ever_had_listeners(&event_type) {
            warn!(
                "Dropping {} ({}): {} has no listeners left",
                qualified, event.correlation_id, event_type
            );
            return EmitOutcome::Dropped;
        }

        let capacity = self.inner.queue_capacity;
        let mut queue = self
            .inner
            .queues
            .entry(event_type.clone())
            .or_insert_with(|| EventQueue::new(capacity));
        queue.enqueue(event);
        let queue_len = queue.len();
        drop(queue);
        debug!("Queued {} ({} pending for {})", qualified, queue_len, event_type);
        EmitOutcome::Queued { queue_len }
    }

    /// Subscribes `listener` to the qualifier's type and replays any events
    /// queued for that type before anyone listened.
    #[instrument(level = "debug", skip(self, listener))]
    pub async fn on(&self, qualified: &str, listener: Listener) -> Subscription {
        let event_type = EventMapper::parse_qualified_event(qualified).event_type;
        self.inner.registry.mark_has_listeners(&event_type);
        self.inner.registry.register(&event_type, listener.clone());

        if let Some((_, mut queue)) = self.inner.queues.remove(&event_type) {
            let mut pending = Vec::with_capacity(queue.len());
            queue.process(|event| pending.push(event.clone()));
            debug!("Replaying {} queued event(s) for {}", pending.len(), event_type);
            self.inner.bus.replay(pending).await;
        }

        Subscription {
            manager: self.clone(),
            qualified: qualified.to_string(),
            listener,
        }
    }

    pub fn off(&self, qualified: &str, listener: &Listener) -> bool {
        let event_type = EventMapper::parse_qualified_event(qualified).event_type;
        self.inner.registry.unregister(&event_type, listener)
    }

    /// Calls every listener of the type concurrently and merges their object
    /// results, later listeners winning on key conflicts.
    ///
    /// Unlike `emit`, listener errors are returned to the caller and listeners
    /// stay registered.
    #[instrument(level = "debug", skip(self, data))]
    pub async fn request(&self, qualified: &str, data: Value) -> EventResult<Value> {
        let event = self.inner.mapper.create_event(qualified, data);
        let listeners = self.inner.registry.get_listeners(&event.event_type);
        debug!(
            "Request {} ({}) to {} listener(s)",
            qualified,
            event.correlation_id,
            listeners.len()
        );
        let results =
            try_join_all(listeners.iter().map(|listener| listener.call(event.clone()))).await?;
        merge_results(&event.event_type, results)
    }

    /// Per-qualifier façade; repeated calls share one channel.
    pub fn channel(&self, qualified: &str) -> Channel {
        self.inner
            .channels
            .entry(qualified.to_string())
            .or_insert_with(|| Channel::new(qualified, self.downgrade()))
            .clone()
    }

    pub fn add_hook(&self, hook: Arc<dyn EventHook>) {
        self.inner.bus.add_hook(hook);
    }

    pub fn queued_len(&self, event_type: &str) -> usize {
        self.inner
            .queues
            .get(event_type)
            .map(|queue| queue.len())
            .unwrap_or(0)
    }

    pub fn has_queue(&self, event_type: &str) -> bool {
        self.inner.queues.contains_key(event_type)
    }

    pub fn listener_count(&self, event_type: &str) -> usize {
        self.inner.registry.listener_count(event_type)
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.inner.registry
    }

    pub fn context(&self) -> &Arc<EventContext> {
        &self.inner.context
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn mapper(&self) -> &EventMapper {
        &self.inner.mapper
    }

    pub fn correlation_ids(&self) -> &Arc<CorrelationIdFactory> {
        self.inner.mapper.correlation_ids()
    }

    fn discard_empty_queue(&self, event_type: &str) {
        self.inner
            .queues
            .remove_if(event_type, |_, queue| queue.is_empty());
    }
}

/// Handle returned by [`EventManager::on`]. Dropping it keeps the listener
/// registered; call [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    manager: EventManager,
    qualified: String,
    listener: Listener,
}

impl Subscription {
    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn qualified(&self) -> &str {
        &self.qualified
    }

    pub fn unsubscribe(self) -> bool {
        let removed = self.manager.off(&self.qualified, &self.listener);
        let event_type = EventMapper::parse_qualified_event(&self.qualified).event_type;
        self.manager.discard_empty_queue(&event_type);
        removed
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("qualified", &self.qualified)
            .field("listener", &self.listener)
            .finish()
    }
}

/// Shallow-merges object results in order. `null` results are skipped; any
/// other non-object result is an error.
pub fn merge_results(event_type: &str, results: Vec<Value>) -> EventResult<Value> {
    let mut merged = Map::new();
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Value::Object(fields) => merged.extend(fields),
            Value::Null => {}
            other => {
                return Err(EventError::NonMergeableResult {
                    event_type: event_type.to_string(),
                    index,
                    kind: value_kind(&other).to_string(),
                })
            }
        }
    }
    Ok(Value::Object(merged))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
