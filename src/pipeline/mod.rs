//! # Event Pipeline
//!
//! ```text
//!            ┌──────────────┐  ok   ┌──────────────────┐
//! event ───▶ │ PhaseManager │ ────▶ │ is_success = true │
//!            └──────┬───────┘       └──────────────────┘
//!                   │ err
//!            ┌──────▼───────┐       ┌──────────────────────────┐
//!            │ ErrorHandler │ ────▶ │ phase = fallback, error  │
//!            └──────────────┘       └──────────────────────────┘
//! ```
//!
//! With the default [`error_strategy::FallbackErrorStrategy`] a listener
//! failure never reaches the caller of [`EventPipeline::process`]; it is only
//! visible on the event and in the [`EventContext`].

pub mod error_strategy;
pub mod phase_manager;
pub mod strategy;

use std::sync::Arc;

use error_strategy::{ErrorHandler, FallbackErrorStrategy};
use phase_manager::PhaseManager;
use strategy::DispatchStrategy;

use crate::{
    event::{context::EventContext, Event},
    registry::EventRegistry,
    EventResult,
};

pub struct EventPipeline {
    phase_manager: PhaseManager,
    error_handler: Arc<dyn ErrorHandler>,
    context: Arc<EventContext>,
}

impl EventPipeline {
    pub fn new(
        registry: Arc<EventRegistry>,
        strategy: Arc<dyn DispatchStrategy>,
        context: Arc<EventContext>,
    ) -> Self {
        let error_handler = Arc::new(FallbackErrorStrategy::new(context.clone()));
        Self::with_error_handler(registry, strategy, context, error_handler)
    }

    pub fn with_error_handler(
        registry: Arc<EventRegistry>,
        strategy: Arc<dyn DispatchStrategy>,
        context: Arc<EventContext>,
        error_handler: Arc<dyn ErrorHandler>,
    ) -> Self {
        Self {
            phase_manager: PhaseManager::new(registry, strategy),
            error_handler,
            context,
        }
    }

    /// Runs the event's phase. A dispatch failure is handed to the error
    /// handler and swallowed; only a failure of the handler itself is returned.
    pub async fn process(&self, event: &mut Event) -> EventResult<()> {
        self.context.set_current_phase(event.phase);
        if let Err(e) = self.phase_manager.transition(event).await {
            self.error_handler.handle_error(&e, event)?;
        }
        Ok(())
    }

    pub fn phase_manager(&self) -> &PhaseManager {
        &self.phase_manager
    }
}
