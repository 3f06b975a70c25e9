//! Event mailbox for the mediasrc pipeline.
//!
//! Every [`EventQueue`] is a "post event, retrieve event" channel. A media
//! source and each of its streams own one; the host drains all of them.

#![forbid(unsafe_code)]

mod error;
mod flags;
mod queue;

pub use error::{EventError, EventResult};
pub use flags::RetrieveFlags;
pub use queue::EventQueue;
