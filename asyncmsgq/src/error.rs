//! Error kinds exposed by the façade.

use std::fmt;

/// The queue has no more producers able to deliver a reply: `send` can only
/// return this if the consumer side has been torn down without draining the
/// item (which should not happen under normal destruction discipline, but is
/// surfaced rather than panicking since a producer has no way to observe
/// consumer lifetime otherwise).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed;

impl fmt::Display for QueueClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("asyncmsgq: queue closed with no reply delivered")
    }
}

impl std::error::Error for QueueClosed {}

pub use asyncmsgq_driver::{Empty, Full};
