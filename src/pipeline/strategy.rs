//! Dispatch strategies decide how one event reaches its listeners.
//!
//! | Strategy    | Order                         | Failure                          |
//! |-------------|-------------------------------|----------------------------------|
//! | `immediate` | sequential, registration order| first error stops the run        |
//! | `broadcast` | concurrent fan-out            | all run, first error is reported |
//! | `queue`     | sequential, one run at a time | first error stops the run        |

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::trace;

use crate::{event::Event, registry::Listener, EventResult};

#[async_trait]
pub trait DispatchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Invokes `listeners` with `event`, returning their results in
    /// registration order.
    async fn execute(&self, event: &Event, listeners: &[Listener]) -> EventResult<Vec<Value>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Immediate,
    Broadcast,
    Queue,
}

impl StrategyKind {
    pub fn build(&self) -> Arc<dyn DispatchStrategy> {
        match self {
            StrategyKind::Immediate => Arc::new(ImmediateStrategy),
            StrategyKind::Broadcast => Arc::new(BroadcastStrategy),
            StrategyKind::Queue => Arc::new(QueueStrategy::default()),
        }
    }
}

async fn run_sequential(event: &Event, listeners: &[Listener]) -> EventResult<Vec<Value>> {
    let mut results = Vec::with_capacity(listeners.len());
    for listener in listeners {
        results.push(listener.call(event.clone()).await?);
    }
    Ok(results)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateStrategy;

#[async_trait]
impl DispatchStrategy for ImmediateStrategy {
    fn name(&self) -> &'static str {
        "immediate"
    }

    async fn execute(&self, event: &Event, listeners: &[Listener]) -> EventResult<Vec<Value>> {
        run_sequential(event, listeners).await
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BroadcastStrategy;

#[async_trait]
impl DispatchStrategy for BroadcastStrategy {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    async fn execute(&self, event: &Event, listeners: &[Listener]) -> EventResult<Vec<Value>> {
        let calls = listeners.iter().map(|listener| listener.call(event.clone()));
        join_all(calls).await.into_iter().collect()
    }
}

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    // ids of the queue strategies whose turn the current task holds
    static HELD_TURNS: Vec<u64>;
}

/// Sequential dispatch that also serializes whole runs, so two concurrent
/// emits never interleave their listeners.
///
/// A listener that emits again on the same strategy runs its nested dispatch
/// inside the current turn instead of waiting for it.
#[derive(Debug)]
pub struct QueueStrategy {
    id: u64,
    turn: Mutex<()>,
}

impl Default for QueueStrategy {
    fn default() -> Self {
        Self {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            turn: Mutex::new(()),
        }
    }
}

impl QueueStrategy {
    fn held_turns() -> Vec<u64> {
        HELD_TURNS.try_with(Clone::clone).unwrap_or_default()
    }
}

#[async_trait]
impl DispatchStrategy for QueueStrategy {
    fn name(&self) -> &'static str {
        "queue"
    }

    async fn execute(&self, event: &Event, listeners: &[Listener]) -> EventResult<Vec<Value>> {
        let mut held = Self::held_turns();
        if held.contains(&self.id) {
            trace!("Queue strategy re-entered for {}", event.qualified());
            return run_sequential(event, listeners).await;
        }

        let _turn = self.turn.lock().await;
        trace!("Queue strategy running {}", event.qualified());
        held.push(self.id);
        HELD_TURNS.scope(held, run_sequential(event, listeners)).await
    }
}
