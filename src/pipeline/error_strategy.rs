use std::sync::Arc;

use tracing::{debug, trace};

use crate::{
    event::{context::EventContext, Event, Phase},
    EventError, EventResult,
};

/// Terminal handler for a failed phase.
pub trait ErrorHandler: Send + Sync {
    fn handle_error(&self, error: &EventError, event: &mut Event) -> EventResult<()>;
}

/// Records the failure in the context and routes the event through `error`
/// into `fallback`. Never fails.
pub struct FallbackErrorStrategy {
    context: Arc<EventContext>,
}

impl FallbackErrorStrategy {
    pub fn new(context: Arc<EventContext>) -> Self {
        Self { context }
    }
}

impl ErrorHandler for FallbackErrorStrategy {
    fn handle_error(&self, error: &EventError, event: &mut Event) -> EventResult<()> {
        debug!("Phase {} failed: {}", event.qualified(), error);
        self.context.set_error(error.clone(), event.phase);

        // error is a pass-through state; recovery listeners live on fallback
        for phase in [Phase::Error, Phase::Fallback] {
            trace!("{}: {} -> {}", event.event_type, event.phase, phase);
            event.phase = phase;
        }
        event.error = Some(error.clone());
        Ok(())
    }
}
