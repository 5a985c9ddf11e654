//! # Gland Events: phase-aware in-process event bus
//!
//! Gland's controllers, plugins and decorators talk to each other through
//! events instead of direct calls. This crate is the engine underneath that
//! surface.
//!
//! ## Technical Foundations
//!
//! ### 1. Qualified events
//! An event is addressed as `type` or `type:phase`, e.g. `order:pre`. The
//! phase vocabulary is closed ([`event::Phase`]); an unknown suffix is kept as
//! part of the type and the phase defaults to `main`.
//! - Event model ([`event`])
//! - Qualifier parsing ([`event::mapper`])
//! - Correlation ids ([`correlation`])
//!
//! ### 2. Dispatch
//! - Listener storage ([`registry`])
//! - Phase execution and error routing ([`pipeline`])
//! - Single emit semantics and hooks ([`bus`])
//!
//! ### 3. Façade
//! [`manager::EventManager`] is the only type collaborators need. It buffers
//! events for types nobody subscribed to yet ([`queue`]), drops events for
//! types whose subscribers left, fans `request` out to every listener and
//! merges the answers, and hands out per-qualifier [`channel::Channel`]s.
//!
//! ## Event Flow
//!
//! ```text
//! emit("order:post") → EventMapper → EventManager ─┬─▶ EventQueue (no subscriber yet)
//!                                                   └─▶ EventBus → EventPipeline → PhaseManager → DispatchStrategy → listeners
//! ```
//!
//! ## Configuration
//!
//! [`config::EventConfig`] selects the queue capacity, the correlation id
//! namespace and the dispatch strategy; it loads from JSON.

pub mod bus;
pub mod channel;
pub mod config;
pub mod correlation;
pub mod error;
pub mod event;
pub mod manager;
pub mod pipeline;
pub mod queue;
pub mod registry;

// Re-exports
pub use bus::{EventBus, EventHook, LoggingHook};
pub use channel::Channel;
pub use config::EventConfig;
pub use correlation::{CorrelationId, CorrelationIdFactory};
pub use error::*;
pub use event::{Event, Phase};
pub use manager::{EmitOutcome, EventManager, Subscription};
pub use pipeline::strategy::{DispatchStrategy, StrategyKind};
pub use registry::{EventRegistry, Listener};

#[cfg(test)]
mod tests {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    #[ctor::ctor]
    fn init_tests() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }
}
