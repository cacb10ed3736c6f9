//! `AsyncMsgQ`: the message-level façade built on
//! `asyncmsgq_driver`'s `AsyncQ` and `Pool`.

use std::{
    cell::UnsafeCell,
    os::fd::RawFd,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use asyncmsgq_log::{debug, instrument, trace};
use asyncmsgq_driver::{queue::AsyncQ, Pool};

use crate::{
    chunk::Chunk,
    item::{Envelope, PostItem, SendEnvelope, SendSlot},
    sem::BinarySemaphore,
    target::{FreeCb, MessageTarget, Userdata},
};

/// Default capacity used by [`AsyncMsgQ::new`].
pub const DEFAULT_CAPACITY: usize = 128;

/// Builder for [`AsyncMsgQ`]: the `*Builder` idiom the rest of this
/// workspace's crates use, e.g. `compio-dispatcher::DispatcherBuilder`, for
/// the knobs a real embedding server wants beyond a bare capacity hint.
pub struct AsyncMsgQBuilder {
    capacity: usize,
    pool_capacity: usize,
    pool: Option<Arc<Pool<PostItem>>>,
}

impl AsyncMsgQBuilder {
    fn new() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            pool_capacity: asyncmsgq_driver::pool::DEFAULT_POOL_CAPACITY,
            pool: None,
        }
    }

    /// Maximum number of in-flight (pushed but not yet popped) items.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Free-list capacity for the item pool this queue allocates for
    /// itself, if [`AsyncMsgQBuilder::pool`] is not used.
    pub fn pool_capacity(mut self, pool_capacity: usize) -> Self {
        self.pool_capacity = pool_capacity;
        self
    }

    /// Share an existing pool instead of creating a private one. Useful in
    /// tests that want to observe pool recycling across multiple queues, or
    /// in an embedder that wants every `AsyncMsgQ` in the process to draw
    /// from the same process-wide free-list.
    pub fn pool(mut self, pool: Arc<Pool<PostItem>>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn build(self) -> std::io::Result<AsyncMsgQ> {
        // Defaults to the process-wide pool (mirroring the original's
        // `PA_STATIC_FLIST_DECLARE`), unless the caller supplied its own via
        // `.pool(...)` or asked for a non-default `.pool_capacity(...)`
        // (in which case a shared, process-wide instance would silently
        // ignore the requested size, which would be surprising).
        let pool = self.pool.unwrap_or_else(|| {
            if self.pool_capacity == asyncmsgq_driver::pool::DEFAULT_POOL_CAPACITY {
                asyncmsgq_driver::pool::shared::<PostItem>()
            } else {
                Arc::new(Pool::with_capacity(self.pool_capacity))
            }
        });
        Ok(AsyncMsgQ {
            queue: AsyncQ::new(self.capacity)?,
            pool,
            writer: Mutex::new(()),
            current: UnsafeCell::new(None),
            in_flight: AtomicBool::new(false),
        })
    }
}

impl Default for AsyncMsgQBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The message-level façade: `post`, `send`, `get`, `done`, `wait_for`,
/// plus the event-loop bridge (`get_fd`, `before_poll`, `after_poll`).
pub struct AsyncMsgQ {
    queue: AsyncQ<Envelope>,
    pool: Arc<Pool<PostItem>>,
    /// Serializes writers: turns the underlying `AsyncQ` into something
    /// only the SPSC discipline needs to hold up on the consumer side, and
    /// keeps pool interactions race-free if `Pool` itself were ever not
    /// independently lock-free.
    writer: Mutex<()>,
    /// The item between a successful `get` and the matching `done`.
    ///
    /// `UnsafeCell` rather than `Mutex` because only the single consumer
    /// thread ever touches it; there is exactly one reader. `in_flight`
    /// is the actual synchronization primitive, see the `unsafe impl Sync`
    /// note below.
    current: UnsafeCell<Option<Envelope>>,
    in_flight: AtomicBool,
}

// SAFETY: `current` is only ever written or read by the single consumer
// thread, strictly inside `get`/`done`, which are themselves ordered by
// `in_flight`'s acquire/release operations. Producer threads touch `queue`
// and `pool` (both independently thread-safe) and never `current`. So
// sharing `&AsyncMsgQ` across threads never races on the interior-mutable
// field.
unsafe impl Sync for AsyncMsgQ {}

impl AsyncMsgQ {
    /// Build a queue with the given capacity hint and default settings
    /// otherwise.
    pub fn new(capacity: usize) -> std::io::Result<Self> {
        Self::builder().capacity(capacity).build()
    }

    pub fn builder() -> AsyncMsgQBuilder {
        AsyncMsgQBuilder::new()
    }

    /// Fire-and-forget post.
    pub fn post(
        &self,
        object: Option<Arc<dyn MessageTarget>>,
        code: i32,
        userdata: Option<Userdata>,
        offset: i64,
        chunk: Option<Chunk>,
        free_cb: Option<FreeCb>,
    ) {
        instrument!(asyncmsgq_log::Level::TRACE, "AsyncMsgQ::post", code);
        let mut item = self.pool.acquire();
        item.code = code;
        item.object = object;
        item.userdata = userdata;
        item.free_cb = free_cb;
        item.offset = offset;
        item.chunk = chunk;

        // The writer mutex serializes producers; the underlying AsyncQ only
        // has to cope with a single writer at a time.
        let _guard = self.writer.lock().unwrap();
        self.queue
            .push(Envelope::Post(item), true)
            .unwrap_or_else(|_| unreachable!("post always uses a blocking push"));
    }

    /// Synchronous round trip. `object`/`userdata`/`chunk` are borrowed
    /// for the call's duration and never refcounted by the queue: the
    /// caller's own frame already guarantees their liveness across the
    /// blocking wait.
    pub fn send(
        &self,
        object: Option<&dyn MessageTarget>,
        code: i32,
        userdata: Option<&Userdata>,
        offset: i64,
        chunk: Option<&Chunk>,
    ) -> i32 {
        instrument!(asyncmsgq_log::Level::TRACE, "AsyncMsgQ::send", code);
        let mut slot = SendSlot::new(code, object, userdata, offset, chunk);
        let reply = BinarySemaphore::new(false);
        let envelope = Envelope::Send(SendEnvelope {
            // SAFETY: `slot` is a local that outlives this whole function
            // body, which does not return before `reply.wait()` below does,
            // which in turn cannot return before the consumer's `done` has
            // posted `reply` (see `SendEnvelope`'s own safety note).
            slot: std::ptr::NonNull::from(&mut slot),
            reply: reply.clone(),
        });

        {
            let _guard = self.writer.lock().unwrap();
            self.queue
                .push(envelope, true)
                .unwrap_or_else(|_| unreachable!("send always uses a blocking push"));
        }

        reply.wait();
        trace!(ret = slot.ret, "AsyncMsgQ::send complete");
        slot.ret
    }

    /// Consumer step 1. Preconditions: no item is currently in-flight;
    /// violating this panics.
    pub fn get(&self, wait: bool) -> Result<Message<'_>, asyncmsgq_driver::Empty> {
        instrument!(asyncmsgq_log::Level::TRACE, "AsyncMsgQ::get", wait);
        let was_in_flight = self.in_flight.swap(true, Ordering::Acquire);
        assert!(
            !was_in_flight,
            "asyncmsgq: get() called while an item is already in-flight"
        );

        match self.queue.pop(wait) {
            Ok(envelope) => {
                // SAFETY: we are the only thread touching `current`
                // (enforced by `in_flight` above), and no prior `Message`
                // can still be alive (same enforcement).
                unsafe {
                    *self.current.get() = Some(envelope);
                }
                Ok(Message { queue: self })
            }
            Err(empty) => {
                // Permitted no-op transition, stays Idle.
                self.in_flight.store(false, Ordering::Release);
                Err(empty)
            }
        }
    }

    /// Consumer step 2. Preconditions: an item is in-flight; violating
    /// this panics.
    pub fn done(&self, ret: i32) {
        instrument!(asyncmsgq_log::Level::TRACE, "AsyncMsgQ::done", ret);
        assert!(
            self.in_flight.load(Ordering::Acquire),
            "asyncmsgq: done() called while idle"
        );

        // SAFETY: see `get`'s note; we are the sole accessor and an item is
        // known to be present because `in_flight` is set.
        let envelope = unsafe { (*self.current.get()).take() }
            .expect("asyncmsgq: in_flight set but current empty, this is a bug");

        match envelope {
            Envelope::Send(send) => {
                // SAFETY: the producer is blocked in `reply.wait()` and
                // cannot deallocate `slot` until we post `reply` below.
                unsafe {
                    (*send.slot.as_ptr()).ret = ret;
                }
                send.reply.post();
            }
            Envelope::Post(mut item) => {
                if let Some(free_cb) = item.free_cb.take() {
                    if let Some(userdata) = item.userdata.take() {
                        free_cb(userdata);
                    }
                }
                // Dropping/recycling `item` here drops its `object` and
                // `chunk` Arc clones: the refcount decrement.
                self.pool.release(item);
            }
        }

        self.in_flight.store(false, Ordering::Release);
    }

    /// Convenience loop: repeatedly `get`/dispatch/`done` until the
    /// dispatched message's code matches `code`. `get(true)` only fails when
    /// the queue has been disposed out from under a blocked consumer, which
    /// surfaces here as `QueueClosed`.
    pub fn wait_for(&self, code: i32) -> Result<(), crate::error::QueueClosed> {
        loop {
            let message = self
                .get(true)
                .map_err(|_| crate::error::QueueClosed)?;
            let got_code = message.code();
            let ret = message.dispatch();
            self.done(ret);
            if got_code == code {
                return Ok(());
            }
        }
    }

    /// Readable fd for the host's poll/select primitive.
    pub fn get_fd(&self) -> RawFd {
        self.queue.get_fd()
    }

    /// Call immediately before entering an external poll. `true` means an
    /// item was observed and the caller must drain before polling.
    pub fn before_poll(&self) -> bool {
        self.queue.before_poll()
    }

    /// Call immediately after waking from an external poll.
    pub fn after_poll(&self) {
        self.queue.after_poll()
    }
}

impl Drop for AsyncMsgQ {
    fn drop(&mut self) {
        // Destruction drains and releases any residual items, which must
        // all be async posts: a blocked sender still parked here would be
        // a programmer error (it can only mean the embedder destroyed the
        // queue while a producer thread was mid-`send`).
        instrument!(asyncmsgq_log::Level::TRACE, "AsyncMsgQ::drop");
        while let Ok(envelope) = self.queue.pop(false) {
            match envelope {
                Envelope::Post(mut item) => {
                    if let Some(free_cb) = item.free_cb.take() {
                        if let Some(userdata) = item.userdata.take() {
                            free_cb(userdata);
                        }
                    }
                    // item drops here: object/chunk Arc clones released.
                }
                Envelope::Send(_) => {
                    panic!(
                        "asyncmsgq: queue destroyed with a blocked sender still pending"
                    );
                }
            }
        }
        debug!("AsyncMsgQ dropped, residual posts released");
    }
}

/// A borrowed view of the in-flight item, returned by [`AsyncMsgQ::get`].
///
/// Exists for exactly as long as the window between `get` and `done`,
/// enforced by `AsyncMsgQ`'s `in_flight` flag, not by this type's lifetime
/// parameter alone. `Message` borrows `&AsyncMsgQ`, but the data it reads
/// through that borrow lives in `current`, not in `Message` itself.
pub struct Message<'q> {
    queue: &'q AsyncMsgQ,
}

impl<'q> Message<'q> {
    fn envelope(&self) -> &Envelope {
        // SAFETY: a `Message` only exists while `in_flight` is set and only
        // the consumer thread that created it is alive to call this, so
        // `current` is guaranteed `Some` and not concurrently mutated.
        unsafe {
            (*self.queue.current.get())
                .as_ref()
                .expect("asyncmsgq: Message outlived its get()/done() window")
        }
    }

    pub fn code(&self) -> i32 {
        match self.envelope() {
            Envelope::Post(item) => item.code,
            // SAFETY: see `SendEnvelope`'s safety note.
            Envelope::Send(send) => unsafe { send.slot.as_ref() }.code,
        }
    }

    pub fn object(&self) -> Option<&dyn MessageTarget> {
        match self.envelope() {
            Envelope::Post(item) => item.object.as_deref(),
            Envelope::Send(send) => unsafe { send.slot.as_ref() }
                .object
                .map(|ptr| unsafe { ptr.as_ref() }),
        }
    }

    pub fn userdata(&self) -> Option<&Userdata> {
        match self.envelope() {
            Envelope::Post(item) => item.userdata.as_ref(),
            Envelope::Send(send) => unsafe { send.slot.as_ref() }
                .userdata
                .map(|ptr| unsafe { ptr.as_ref() }),
        }
    }

    pub fn offset(&self) -> i64 {
        match self.envelope() {
            Envelope::Post(item) => item.offset,
            Envelope::Send(send) => unsafe { send.slot.as_ref() }.offset,
        }
    }

    pub fn chunk(&self) -> Option<&Chunk> {
        match self.envelope() {
            Envelope::Post(item) => item.chunk.as_ref(),
            Envelope::Send(send) => unsafe { send.slot.as_ref() }
                .chunk
                .map(|ptr| unsafe { ptr.as_ref() }),
        }
    }

    /// Convenience: dispatch this message to its own target.
    pub fn dispatch(&self) -> i32 {
        crate::dispatch::dispatch(self.object(), self.code(), self.userdata(), self.offset(), self.chunk())
    }
}
