//! # Correlation IDs
//!
//! A correlation id ties together every phase and listener invocation that
//! belongs to one logical operation. Ids sort by creation time and stay unique
//! inside a process even when several are minted in the same millisecond.
//!
//! ```text
//! 92f3a4b5c1-000-k3j9x0a7q2m1z-gland
//! └ms (hex)┘ └seq┘ └─ random ──┘ └ namespace
//! ```
//!
//! The timestamp keeps the low 40 bits of the epoch milliseconds (ten hex
//! digits), so ordering wraps roughly every 34 years.

use std::{
    fmt,
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{EventError, EventResult};

pub const DEFAULT_NAMESPACE: &str = "gland";

const SEQUENCE_MODULUS: u16 = 4096;
const TIMESTAMP_MASK: u64 = 0xff_ffff_ffff;
const RANDOM_LEN: usize = 13;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

lazy_static! {
    static ref CORRELATION_ID_PATTERN: Regex =
        Regex::new(r"^[0-9a-f]{10}-[0-9a-f]{3}-[a-z0-9]{13}-[a-z]+$").unwrap();
    static ref NAMESPACE_PATTERN: Regex = Regex::new(r"^[a-z]+$").unwrap();
}

/// A validated correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Wraps an existing id, rejecting anything that does not match the format.
    pub fn parse(id: &str) -> EventResult<Self> {
        if CorrelationIdFactory::validate(id) {
            Ok(Self(id.to_string()))
        } else {
            Err(EventError::InvalidCorrelationId(id.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Default)]
struct SequenceState {
    last_millis: Option<u64>,
    sequence: u16,
}

/// Mints correlation ids for one namespace.
#[derive(Debug)]
pub struct CorrelationIdFactory {
    namespace: String,
    state: Mutex<SequenceState>,
}

impl Default for CorrelationIdFactory {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            state: Mutex::new(SequenceState::default()),
        }
    }
}

impl CorrelationIdFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Namespace must be lowercase ascii letters so minted ids stay valid.
    pub fn with_namespace(namespace: &str) -> EventResult<Self> {
        if !NAMESPACE_PATTERN.is_match(namespace) {
            return Err(EventError::InvalidNamespace(namespace.to_string()));
        }
        Ok(Self {
            namespace: namespace.to_string(),
            state: Mutex::new(SequenceState::default()),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn create(&self) -> CorrelationId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        self.create_at(now)
    }

    pub(crate) fn create_at(&self, millis: u64) -> CorrelationId {
        let sequence = self.next_sequence(millis);
        CorrelationId(format!(
            "{:010x}-{:03x}-{}-{}",
            millis & TIMESTAMP_MASK,
            sequence,
            random_base36(RANDOM_LEN),
            self.namespace
        ))
    }

    fn next_sequence(&self, millis: u64) -> u16 {
        // poisoned lock only means another minting thread panicked; the counter is still usable
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.last_millis == Some(millis) {
            state.sequence = (state.sequence + 1) % SEQUENCE_MODULUS;
        } else {
            state.last_millis = Some(millis);
            state.sequence = 0;
        }
        state.sequence
    }

    pub fn validate(id: &str) -> bool {
        CORRELATION_ID_PATTERN.is_match(id)
    }
}

fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}
