//! An asynchronous, single-consumer/multi-producer message queue for
//! bridging a realtime audio thread and the rest of a server process.
//!
//! See [`AsyncMsgQ`] for the main entry point: `post` for fire-and-forget
//! messages, `send` for a synchronous round trip, and `get`/`done` (or the
//! [`bridge`] helpers) on the consumer side.

pub mod bridge;
mod chunk;
mod dispatch;
mod error;
mod facade;
mod item;
mod sem;
mod target;

pub use asyncmsgq_driver::pool::DEFAULT_POOL_CAPACITY;
pub use asyncmsgq_driver::Pool;

pub use chunk::AudioBlock;
pub use chunk::Chunk;
pub use dispatch::dispatch;
pub use error::QueueClosed;
pub use error::{Empty, Full};
pub use facade::{AsyncMsgQ, AsyncMsgQBuilder, Message, DEFAULT_CAPACITY};
pub use item::PostItem;
pub use target::{FreeCb, MessageTarget, Userdata};
