//! Single-flight operation queue.
//!
//! [`OperationQueue`] serialises state-changing commands:
//!
//! - commands are enqueued from any thread without blocking
//! - one consumer task, spawned on the shared tokio runtime, drains them in
//!   FIFO order, one at a time
//! - an [`OperationHandler`] decides admission (`validate`), does the work
//!   (`dispatch`) and receives errors (`report`)
//!
//! Nothing is retried: a rejected or failed operation is dropped after its
//! error has been reported.

#![forbid(unsafe_code)]

mod error;
mod queue;
mod traits;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{QueueError, QueueResult};
pub use queue::OperationQueue;
pub use traits::{FnHandler, OperationHandler};
