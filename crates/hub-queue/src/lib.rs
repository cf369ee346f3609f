pub mod broker;
pub mod error;
pub mod job;

pub use broker::{JobHandler, QueueBroker};
pub use error::QueueError;
pub use job::{EnqueueOptions, Job, JobRecord};
