use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue '{0}' is not registered")]
    UnknownQueue(String),

    #[error("queue '{0}' enqueue failed: channel closed")]
    EnqueueFailed(String),
}
