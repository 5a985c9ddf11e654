//! Per-qualifier façade over [`EventManager`].
//!
//! `respond` turns the channel into a request/response endpoint: a handler
//! error does not reach the requester through the bus, it is re-published as
//! `<qualified>:error` with the failing event's correlation id.

use std::{
    future::Future,
    sync::{Arc, Weak},
};

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{
    event::Event,
    manager::{EmitOutcome, EventManager, ManagerInner, Subscription},
    registry::Listener,
    EventError, EventResult,
};

#[derive(Clone)]
pub struct Channel {
    qualified: Arc<str>,
    manager: Weak<ManagerInner>,
}

impl Channel {
    pub(crate) fn new(qualified: &str, manager: Weak<ManagerInner>) -> Self {
        Self {
            qualified: Arc::from(qualified),
            manager,
        }
    }

    pub fn qualified(&self) -> &str {
        &self.qualified
    }

    /// Qualifier the error companion event is published under.
    pub fn error_qualified(&self) -> String {
        format!("{}:error", self.qualified)
    }

    /// True when both handles came from the same `EventManager::channel` entry.
    pub fn same_channel(&self, other: &Channel) -> bool {
        Arc::ptr_eq(&self.qualified, &other.qualified)
    }

    fn manager(&self) -> EventResult<EventManager> {
        self.manager
            .upgrade()
            .map(EventManager::from_inner)
            .ok_or(EventError::ManagerDropped)
    }

    pub async fn emit(&self, data: Value) -> EmitOutcome {
        match self.manager() {
            Ok(manager) => manager.emit(&self.qualified, data).await,
            Err(_) => {
                warn!("Dropping {}: manager is gone", self.qualified);
                EmitOutcome::Dropped
            }
        }
    }

    pub async fn request(&self, data: Value) -> EventResult<Value> {
        self.manager()?.request(&self.qualified, data).await
    }

    /// Subscribes `handler` to this channel's type.
    ///
    /// The handler receives the event data. When it fails, the wrapper emits
    /// `{"correlationId": .., "error": ..}` to [`Channel::error_qualified`]
    /// and resolves to `null`. Events routed to `error` or `fallback` are
    /// ignored so the companion event never re-enters the handler.
    pub async fn respond<F, Fut>(&self, handler: F) -> EventResult<Subscription>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EventResult<Value>> + Send + 'static,
    {
        let manager = self.manager()?;
        let handler = Arc::new(handler);
        let weak = self.manager.clone();
        let error_qualified = self.error_qualified();

        let listener = Listener::new(move |event: Event| {
            let handler = handler.clone();
            let weak = weak.clone();
            let error_qualified = error_qualified.clone();
            async move {
                if event.phase.is_error_route() {
                    return Ok(Value::Null);
                }
                match (*handler)(event.data).await {
                    Ok(value) => Ok(value),
                    Err(e) => {
                        debug!("Responder failed, publishing {}: {}", error_qualified, e);
                        let payload = json!({
                            "correlationId": event.correlation_id.as_str(),
                            "error": e.to_string(),
                        });
                        if let Some(inner) = weak.upgrade() {
                            EventManager::from_inner(inner)
                                .emit(&error_qualified, payload)
                                .await;
                        }
                        Ok(Value::Null)
                    }
                }
            }
        });

        Ok(manager.on(&self.qualified, listener).await)
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("qualified", &self.qualified)
            .field("attached", &(self.manager.strong_count() > 0))
            .finish()
    }
}
