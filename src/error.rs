use thiserror::Error;

/// Errors raised by the event engine and by listeners running inside it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventError {
    #[error("Listener failed: {message}")]
    Listener { message: String },

    #[error("Listener result {index} for {event_type} is not mergeable: {kind}")]
    NonMergeableResult {
        event_type: String,
        index: usize,
        kind: String,
    },

    #[error("Invalid correlation id namespace: {0}")]
    InvalidNamespace(String),

    #[error("Invalid correlation id: {0}")]
    InvalidCorrelationId(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Event manager has been dropped")]
    ManagerDropped,
}

pub type EventResult<T> = Result<T, EventError>;

// エラー作成用のヘルパー関数
impl EventError {
    pub fn listener<S: Into<String>>(message: S) -> Self {
        EventError::Listener {
            message: message.into(),
        }
    }
}
