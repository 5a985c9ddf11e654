use std::{str::FromStr, sync::Arc};

use serde_json::Value;

use super::{Event, Phase};
use crate::correlation::CorrelationIdFactory;

/// A qualified event split into its type and phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQualifier {
    pub event_type: String,
    pub phase: Phase,
}

/// Turns qualified event strings into events and back.
#[derive(Debug, Clone)]
pub struct EventMapper {
    correlation_ids: Arc<CorrelationIdFactory>,
}

impl Default for EventMapper {
    fn default() -> Self {
        Self::new(Arc::new(CorrelationIdFactory::new()))
    }
}

impl EventMapper {
    pub fn new(correlation_ids: Arc<CorrelationIdFactory>) -> Self {
        Self { correlation_ids }
    }

    /// Splits off the trailing segment when it names a known phase.
    ///
    /// `"user:validation"` parses to `("user", validation)`. Any other string,
    /// including `"user:bogus"`, is a type in the `main` phase.
    pub fn parse_qualified_event(qualified: &str) -> ParsedQualifier {
        if let Some((event_type, segment)) = qualified.rsplit_once(':') {
            if let Ok(phase) = Phase::from_str(segment) {
                return ParsedQualifier {
                    event_type: event_type.to_string(),
                    phase,
                };
            }
        }
        ParsedQualifier {
            event_type: qualified.to_string(),
            phase: Phase::Main,
        }
    }

    pub fn create_event(&self, qualified: &str, data: Value) -> Event {
        let parsed = Self::parse_qualified_event(qualified);
        Event::new(
            &parsed.event_type,
            parsed.phase,
            data,
            self.correlation_ids.create(),
        )
    }

    pub fn create_qualified_event(event: &Event) -> String {
        event.qualified()
    }

    /// Canonical `"type:phase"` form used for registry lookups.
    pub fn registry_qualified(&self, qualified: &str) -> String {
        Self::create_qualified_event(&self.create_event(qualified, Value::Null))
    }

    pub fn correlation_ids(&self) -> &Arc<CorrelationIdFactory> {
        &self.correlation_ids
    }
}
