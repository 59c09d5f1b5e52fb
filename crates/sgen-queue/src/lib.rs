//! Bounded single-consumer job queue.
//!
//! Producers wait when the queue is full. Cancellation is a flag consulted
//! by the consumer after dequeue and at job completion.

pub mod error;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use queue::{JobQueue, QueueConfig};
