use std::{any::Any, sync::Arc};

use dashmap::DashMap;

use super::Phase;
use crate::EventError;

pub const CTX_BUS: &str = "ctx:bus";
pub const CTX_REGISTRY: &str = "ctx:registry";
pub const CTX_PROCESSED: &str = "ctx:processed";
pub const CTX_CURRENT_PHASE: &str = "ctx:current_phase";
pub const CTX_ERROR: &str = "ctx:error";
pub const CTX_FAILED_PHASE: &str = "ctx:failed_phase";

/// Key/value scratch space shared by the stages of one bus.
///
/// Values are stored type-erased; typed getters hand back clones. One context
/// belongs to one [`crate::bus::EventBus`] and is reseeded on every emit.
#[derive(Default)]
pub struct EventContext {
    values: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for EventContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self.values.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("EventContext").field("keys", &keys).finish()
    }
}

impl EventContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Any + Send + Sync>(&self, key: &str, value: T) {
        self.values.insert(key.to_string(), Arc::new(value));
    }

    pub fn get<T: Any + Send + Sync + Clone>(&self, key: &str) -> Option<T> {
        let value = self.values.get(key)?.value().clone();
        value.as_ref().downcast_ref::<T>().cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&self, key: &str) {
        self.values.remove(key);
    }

    pub fn clear(&self) {
        self.values.clear();
    }

    pub fn set_current_phase(&self, phase: Phase) {
        self.set(CTX_CURRENT_PHASE, phase);
    }

    pub fn current_phase(&self) -> Option<Phase> {
        self.get(CTX_CURRENT_PHASE)
    }

    pub fn set_processed(&self, processed: bool) {
        self.set(CTX_PROCESSED, processed);
    }

    pub fn is_processed(&self) -> bool {
        self.get(CTX_PROCESSED).unwrap_or(false)
    }

    pub fn set_error(&self, error: EventError, failed_phase: Phase) {
        self.set(CTX_ERROR, error);
        self.set(CTX_FAILED_PHASE, failed_phase);
    }

    pub fn last_error(&self) -> Option<EventError> {
        self.get(CTX_ERROR)
    }

    pub fn failed_phase(&self) -> Option<Phase> {
        self.get(CTX_FAILED_PHASE)
    }
}
