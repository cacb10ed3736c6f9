//! The two item shapes the façade pushes through `AsyncQ`: a pool-recycled,
//! owning `PostItem` for `post`, and a non-owning `SendEnvelope` that points
//! at a record living on the blocked producer's own stack frame for `send`.
//!
//! The `send` path needs an item that does not outlive, and is not outlived
//! by, the blocking call. A C caller gets this for free by allocating the
//! item on the C stack. This crate gets the same property the way `compio`'s
//! completion driver tracks in-flight operations through `Key<T>`: a raw,
//! lifetime-erased pointer, sound by protocol rather than by the type
//! system. The producer cannot return from `send`, and so cannot deallocate
//! the referent, until `done` has posted the reply semaphore.

use std::{ptr::NonNull, sync::Arc};

use crate::{
    chunk::Chunk,
    sem::BinarySemaphore,
    target::{FreeCb, MessageTarget, Userdata},
};

/// An owning, pool-recycled message record used on the `post` (fire and
/// forget) path.
///
/// `Default` is what lets [`asyncmsgq_driver::pool::Pool`] recycle these
/// without knowing anything about message semantics: a released item is
/// behavior-free, which for this type just means every field is `None`/`0`.
#[derive(Default)]
pub struct PostItem {
    pub code: i32,
    pub object: Option<Arc<dyn MessageTarget>>,
    pub userdata: Option<Userdata>,
    pub free_cb: Option<FreeCb>,
    pub offset: i64,
    pub chunk: Option<Chunk>,
}

/// The fields of a `send` item, as seen from the consumer side. Lives on the
/// producer's stack for the duration of the blocking call; the consumer
/// only ever reaches it through the raw pointer inside [`SendEnvelope`].
pub(crate) struct SendSlot {
    pub code: i32,
    pub object: Option<NonNull<dyn MessageTarget>>,
    pub userdata: Option<NonNull<Userdata>>,
    pub offset: i64,
    pub chunk: Option<NonNull<Chunk>>,
    pub ret: i32,
}

/// What actually travels through the queue for a `send` call: a pointer to
/// the producer's stack-resident [`SendSlot`] plus the reply handle `done`
/// uses to wake it back up.
pub(crate) struct SendEnvelope {
    pub(crate) slot: NonNull<SendSlot>,
    pub(crate) reply: BinarySemaphore,
}

// SAFETY: `SendEnvelope` is sent to the consumer thread and the consumer
// only dereferences `slot` between a `get` that popped this envelope and the
// matching `done`. `done` cannot be skipped without leaving the producer
// permanently blocked on `reply.wait()`. The producer cannot return from
// `send`, and therefore cannot invalidate the `SendSlot` it owns on its
// stack, until that `wait()` returns. So the referent is guaranteed live
// for exactly as long as the consumer can reach it.
unsafe impl Send for SendEnvelope {}

/// One record popped off `AsyncQ`, still owned by the queue until `done`.
pub(crate) enum Envelope {
    Post(Box<PostItem>),
    Send(SendEnvelope),
}

impl SendSlot {
    /// Build a slot borrowing from the caller's locals. Unsafe because the
    /// resulting pointers are only valid for as long as `object`/`userdata`/
    /// `chunk` are not moved and the call that created this slot has not
    /// returned. `AsyncMsgQ::send` upholds this by construction: it never
    /// returns before the consumer has called `done`.
    pub(crate) fn new(
        code: i32,
        object: Option<&dyn MessageTarget>,
        userdata: Option<&Userdata>,
        offset: i64,
        chunk: Option<&Chunk>,
    ) -> Self {
        Self {
            code,
            // SAFETY: see the struct-level note; the pointer never outlives the
            // stack frame that owns `object`.
            object: object.map(|o| unsafe {
                NonNull::new_unchecked(o as *const dyn MessageTarget as *mut dyn MessageTarget)
            }),
            userdata: userdata.map(NonNull::from),
            offset,
            chunk: chunk.map(NonNull::from),
            ret: -1,
        }
    }
}
