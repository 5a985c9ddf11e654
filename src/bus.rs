//! # Event Bus
//!
//! The bus owns one [`EventPipeline`] and defines what happens around a single
//! emit:
//!
//! 1. seed the [`EventContext`] (`ctx:bus`, `ctx:registry`, `ctx:processed`,
//!    `ctx:current_phase`)
//! 2. run the pipeline
//! 3. if the pipeline itself fails, call every hook's `on_error` once per
//!    listener registered for the event type
//! 4. mark the context processed and unregister **every** listener of the
//!    event type
//!
//! Step 4 makes a bus-level emit single-shot per type: a listener that wants
//! the next event has to subscribe again. Callers that need long-lived
//! subscriptions re-register from their own glue layer.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, RwLock,
};

use tracing::{debug, error, trace};

use crate::{
    event::{
        context::{EventContext, CTX_BUS, CTX_REGISTRY},
        Event,
    },
    pipeline::{strategy::DispatchStrategy, EventPipeline},
    registry::{EventRegistry, Listener},
    EventError,
};

static NEXT_BUS_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies the bus that seeded a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusId(pub u64);

/// Observer notified when an emit fails outside the pipeline's own recovery.
pub trait EventHook: Send + Sync {
    fn on_error(&self, _error: &EventError, _event: &Event, _listener: &Listener) {}
}

/// Reports hook-level failures through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHook;

impl EventHook for LoggingHook {
    fn on_error(&self, error: &EventError, event: &Event, listener: &Listener) {
        error!(
            "Emit of {} ({}) failed for {:?}: {}",
            event.qualified(),
            event.correlation_id,
            listener,
            error
        );
    }
}

pub struct EventBus {
    id: BusId,
    registry: Arc<EventRegistry>,
    context: Arc<EventContext>,
    pipeline: EventPipeline,
    hooks: RwLock<Vec<Arc<dyn EventHook>>>,
}

impl EventBus {
    pub fn new(
        registry: Arc<EventRegistry>,
        strategy: Arc<dyn DispatchStrategy>,
        context: Arc<EventContext>,
    ) -> Self {
        let pipeline = EventPipeline::new(registry.clone(), strategy, context.clone());
        Self::with_pipeline(registry, context, pipeline)
    }

    pub fn with_pipeline(
        registry: Arc<EventRegistry>,
        context: Arc<EventContext>,
        pipeline: EventPipeline,
    ) -> Self {
        Self {
            id: BusId(NEXT_BUS_ID.fetch_add(1, Ordering::Relaxed)),
            registry,
            context,
            pipeline,
            hooks: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> BusId {
        self.id
    }

    pub fn add_hook(&self, hook: Arc<dyn EventHook>) {
        let mut hooks = match self.hooks.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        hooks.push(hook);
    }

    pub fn hook_count(&self) -> usize {
        self.hooks().len()
    }

    fn hooks(&self) -> Vec<Arc<dyn EventHook>> {
        match self.hooks.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Processes `event` and returns it with the pipeline's changes applied.
    pub async fn emit(&self, event: Event) -> Event {
        debug!("Bus {} emitting {}", self.id.0, event.qualified());
        let event = self.dispatch(event).await;
        self.context.set_processed(true);
        self.cleanup_once_listeners(&event.event_type);
        event
    }

    /// Emits a batch of events of one type, draining that type's listeners once
    /// after the last event instead of after each one, so every event of the
    /// batch reaches the listeners registered when the batch started.
    pub async fn replay(&self, events: Vec<Event>) -> Vec<Event> {
        let mut processed = Vec::with_capacity(events.len());
        for event in events {
            debug!("Bus {} replaying {}", self.id.0, event.qualified());
            processed.push(self.dispatch(event).await);
        }

        self.context.set_processed(true);
        let mut drained: Vec<&str> = processed.iter().map(|e| e.event_type.as_str()).collect();
        drained.dedup();
        for event_type in drained {
            self.cleanup_once_listeners(event_type);
        }
        processed
    }

    async fn dispatch(&self, mut event: Event) -> Event {
        self.seed_context(&event);
        if let Err(e) = self.pipeline.process(&mut event).await {
            self.report_error(&e, &event);
        }
        event
    }

    fn seed_context(&self, event: &Event) {
        self.context.set(CTX_BUS, self.id);
        self.context.set(CTX_REGISTRY, self.registry.clone());
        self.context.set_processed(false);
        self.context.set_current_phase(event.phase);
    }

    // the hook does not know which listener failed, so every listener of the type is reported
    fn report_error(&self, error: &EventError, event: &Event) {
        let hooks = self.hooks();
        for listener in self.registry.get_listeners(&event.event_type) {
            for hook in &hooks {
                hook.on_error(error, event, &listener);
            }
        }
    }

    /// Unregisters every listener currently registered for `event_type`.
    fn cleanup_once_listeners(&self, event_type: &str) {
        let listeners = self.registry.get_listeners(event_type);
        for listener in &listeners {
            self.registry.unregister(event_type, listener);
        }
        trace!(
            "Removed {} listener(s) for {} after emit",
            listeners.len(),
            event_type
        );
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    pub fn context(&self) -> &Arc<EventContext> {
        &self.context
    }

    pub fn pipeline(&self) -> &EventPipeline {
        &self.pipeline
    }
}
