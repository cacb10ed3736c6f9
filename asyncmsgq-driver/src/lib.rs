//! Low-level driver for `asyncmsgq`.
//!
//! This crate owns the two leaves of the message queue: the wake-source
//! FIFO (`AsyncQ`) and the process-wide item pool (`Pool`). Neither knows
//! anything about messages, targets, or reference counting; that is the
//! façade crate's job.

pub mod pool;
pub mod queue;
pub mod wake;

pub use pool::Pool;
pub use queue::{AsyncQ, Empty, Full};
pub use wake::{DefaultWake, WakeSource};
