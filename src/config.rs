use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};

use crate::{
    correlation::DEFAULT_NAMESPACE, pipeline::strategy::StrategyKind, queue::DEFAULT_MAX_SIZE,
    EventError, EventResult,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventConfig {
    /// Upper bound of each per-type queue of not-yet-subscribed events.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Suffix of minted correlation ids; lowercase letters only.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub strategy: StrategyKind,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            namespace: default_namespace(),
            strategy: StrategyKind::default(),
        }
    }
}

pub fn from_file<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> EventResult<T> {
    let file = File::open(path)
        .map_err(|e| EventError::Config(format!("Failed to open config file: {}", e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| EventError::Config(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: DeserializeOwned>(s: &str) -> EventResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| EventError::Config(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

// デフォルト値の定義
fn default_queue_capacity() -> usize {
    DEFAULT_MAX_SIZE
}
fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}
