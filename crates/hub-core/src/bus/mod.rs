//! Async message bus — the internal plumbing connecting ingress, the
//! orchestrator, and the outbound send queue.

pub mod queue;
pub mod types;

pub use queue::MessageBus;
pub use types::{NormalizedMessage, OutboundMessage};
