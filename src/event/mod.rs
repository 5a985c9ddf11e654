//! # Events and Phases
//!
//! An [`Event`] is one unit of work flowing through the bus. It is addressed by
//! a *qualified event* string, `"type"` or `"type:phase"`, which the
//! [`mapper::EventMapper`] turns into a typed event.
//!
//! ## Phase lifecycle of one emit
//!
//! ```text
//! CREATED ──▶ <phase from qualifier, default main>
//!                 │
//!                 ├── dispatch ok ──▶ is_success = true            (terminal)
//!                 │
//!                 └── dispatch err ─▶ error ─▶ fallback, is_failure (terminal)
//! ```
//!
//! The `error` phase is transient: the error strategy moves the event through
//! it straight into `fallback`, so recovery listeners subscribe to `fallback`.

pub mod context;
pub mod mapper;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{correlation::CorrelationId, EventError};

/// Processing stage of an event.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::Display,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Validation,
    Pre,
    #[default]
    Main,
    Post,
    Audit,
    Error,
    Fallback,
}

impl Phase {
    /// `true` for the phases the error strategy routes failed events into.
    pub fn is_error_route(&self) -> bool {
        matches!(self, Phase::Error | Phase::Fallback)
    }
}

/// Timing of the last phase execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lifecycle {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl Lifecycle {
    pub fn started_now() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
        }
    }

    pub fn finish(&mut self) {
        let finished_at = Utc::now();
        self.duration_ms = Some((finished_at - self.started_at).num_milliseconds());
        self.finished_at = Some(finished_at);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: String,
    pub phase: Phase,
    pub data: Value,
    /// Epoch milliseconds at creation.
    pub timestamp: i64,
    pub correlation_id: CorrelationId,
    pub error: Option<EventError>,
    pub is_success: Option<bool>,
    pub is_failure: Option<bool>,
    pub lifecycle: Option<Lifecycle>,
}

impl Event {
    pub fn new(event_type: &str, phase: Phase, data: Value, correlation_id: CorrelationId) -> Self {
        Self {
            event_type: event_type.to_string(),
            phase,
            data,
            timestamp: Utc::now().timestamp_millis(),
            correlation_id,
            error: None,
            is_success: None,
            is_failure: None,
            lifecycle: None,
        }
    }

    /// `"type:phase"`
    pub fn qualified(&self) -> String {
        format!("{}:{}", self.event_type, self.phase)
    }

    pub fn mark_success(&mut self) {
        self.is_success = Some(true);
        self.is_failure = Some(false);
    }

    pub fn mark_failure(&mut self) {
        self.is_success = Some(false);
        self.is_failure = Some(true);
    }

    pub fn succeeded(&self) -> bool {
        self.is_success.unwrap_or(false)
    }

    pub fn failed(&self) -> bool {
        self.is_failure.unwrap_or(false)
    }
}
