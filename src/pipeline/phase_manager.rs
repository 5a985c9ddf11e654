use std::sync::Arc;

use tracing::trace;

use super::strategy::DispatchStrategy;
use crate::{
    event::{Event, Lifecycle},
    registry::EventRegistry,
    EventResult,
};

/// Runs one phase of an event: looks up the listeners for its type and hands
/// them to the dispatch strategy.
pub struct PhaseManager {
    registry: Arc<EventRegistry>,
    strategy: Arc<dyn DispatchStrategy>,
}

impl PhaseManager {
    pub fn new(registry: Arc<EventRegistry>, strategy: Arc<dyn DispatchStrategy>) -> Self {
        Self { registry, strategy }
    }

    /// Stamps the lifecycle and marks the event successful before dispatch,
    /// so listeners receive it already marked. A strategy error flips the
    /// flags to failure and is returned unchanged.
    pub async fn execute_phase(&self, event: &mut Event) -> EventResult<()> {
        let listeners = self.registry.get_listeners(&event.event_type);
        trace!(
            "Executing {} with {} listener(s) via {}",
            event.qualified(),
            listeners.len(),
            self.strategy.name()
        );

        event
            .lifecycle
            .get_or_insert_with(Lifecycle::started_now)
            .finish();
        event.mark_success();

        if let Err(e) = self.strategy.execute(event, &listeners).await {
            event.mark_failure();
            return Err(e);
        }
        Ok(())
    }

    pub async fn transition(&self, event: &mut Event) -> EventResult<()> {
        self.execute_phase(event).await
    }

    pub fn strategy(&self) -> &Arc<dyn DispatchStrategy> {
        &self.strategy
    }
}
