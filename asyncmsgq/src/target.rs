//! Message targets.
//!
//! A polymorphic dispatch target, tracked elsewhere through manual, atomic
//! ref/unref calls on an opaque object pointer. In Rust that capability is
//! simply `Arc<dyn MessageTarget>`: cloning the `Arc` at enqueue and
//! dropping the clone at completion is the refcount increment/decrement,
//! with none of it implemented by this crate directly.

use std::any::Any;

use crate::chunk::Chunk;

/// Opaque payload carried alongside a message. Boxed `Any` stands in for a
/// `void *userdata`; the sender decides what concrete type it unboxes to on
/// the handler side.
pub type Userdata = Box<dyn Any + Send>;

/// Releaser for a post's `userdata`, invoked exactly once by `done` on the
/// post path. Only meaningful for async posts; `send` never carries one.
pub type FreeCb = Box<dyn FnOnce(Userdata) + Send>;

/// An object a message can be dispatched to.
///
/// Implementors decide how to interpret `code` and `offset`; the queue
/// treats the target opaquely.
pub trait MessageTarget: Send + Sync {
    /// Handle one message. `userdata` and `chunk` are borrowed for the
    /// duration of the call; ownership remains with the queue (post path)
    /// or the blocked caller's stack frame (send path) either way.
    fn process_msg(
        &self,
        code: i32,
        userdata: Option<&Userdata>,
        offset: i64,
        chunk: Option<&Chunk>,
    ) -> i32;
}
