//! `AsyncQ`: the bounded, single-consumer/multi-producer wake-source FIFO.
//!
//! The ring itself is a `crossbeam_channel` bounded channel, the same crate
//! family `compio-driver`'s `asyncify.rs` worker pool already depends on for
//! its own bounded dispatch channel. Reshaped behind a narrower API
//! (`push`/`pop` returning `Full`/`Empty` rather than `crossbeam_channel`'s
//! own error enums), so the wake-source discipline in
//! `before_poll`/`after_poll` stays the one load-bearing piece of custom
//! logic here.

use std::{fmt, os::fd::RawFd};

use asyncmsgq_log::{instrument, trace};
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};

use crate::wake::{DefaultWake, WakeSource};

/// Non-blocking `pop`/`try_pop` found nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Empty;

impl fmt::Display for Empty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("asyncq: empty")
    }
}

impl std::error::Error for Empty {}

/// Non-blocking `push` found no room. Carries the item back so the caller
/// never loses ownership of its resources on this path.
pub struct Full<T>(pub T);

impl<T> fmt::Debug for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Full(..)")
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("asyncq: full")
    }
}

impl<T> std::error::Error for Full<T> {}

/// A bounded single-consumer, multi-producer FIFO of `T` with an integrated
/// wake source.
pub struct AsyncQ<T, W: WakeSource = DefaultWake> {
    sender: Sender<T>,
    receiver: Receiver<T>,
    capacity: usize,
    wake: W,
}

impl<T> AsyncQ<T, DefaultWake> {
    /// Create a queue with room for `capacity` pending items, using the
    /// platform's default wake backend (`eventfd` on Linux, a self-pipe
    /// elsewhere).
    pub fn new(capacity: usize) -> std::io::Result<Self> {
        Self::with_wake(capacity, DefaultWake::new()?)
    }
}

impl<T, W: WakeSource> AsyncQ<T, W> {
    /// Create a queue with an explicit wake backend (used by tests and by
    /// callers that need to force a particular backend).
    pub fn with_wake(capacity: usize, wake: W) -> std::io::Result<Self> {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        Ok(Self {
            sender,
            receiver,
            capacity: capacity.max(1),
            wake,
        })
    }

    /// Configured capacity: the number of live in-queue items never exceeds
    /// this.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Racy, diagnostics-only length.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Enqueue one item. Blocks the caller until space is available when
    /// `wait` is true; otherwise returns the item back via [`Full`] if the
    /// queue has no room.
    ///
    /// On success the consumer is guaranteed to observe the item on a
    /// subsequent `pop` (global FIFO order across all producers).
    pub fn push(&self, item: T, wait: bool) -> Result<(), Full<T>> {
        instrument!(asyncmsgq_log::Level::TRACE, "AsyncQ::push", wait);
        let result = if wait {
            self.sender.send(item).map_err(|e| Full(e.into_inner()))
        } else {
            match self.sender.try_send(item) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(item)) => Err(Full(item)),
                Err(TrySendError::Disconnected(item)) => Err(Full(item)),
            }
        };
        if result.is_ok() {
            self.notify();
        }
        result
    }

    /// Dequeue one item. Blocks until one is available when `wait` is true
    /// (until the queue is disposed); otherwise returns [`Empty`]
    /// immediately.
    pub fn pop(&self, wait: bool) -> Result<T, Empty> {
        instrument!(asyncmsgq_log::Level::TRACE, "AsyncQ::pop", wait);
        if wait {
            self.receiver.recv().map_err(|_| Empty)
        } else {
            match self.receiver.try_recv() {
                Ok(item) => Ok(item),
                Err(TryRecvError::Empty) => Err(Empty),
                Err(TryRecvError::Disconnected) => Err(Empty),
            }
        }
    }

    /// Readable fd, suitable for the host's poll/select primitive.
    pub fn get_fd(&self) -> RawFd {
        self.wake.as_raw_fd()
    }

    /// Call immediately before entering an external poll. Returns `true` if
    /// an item was observed (the caller must drain before polling) and
    /// `false` if the queue is verifiably empty and the fd is prepared to
    /// signal readiness on future pushes.
    ///
    /// This is the race-closing half of the `before_poll`/`after_poll`
    /// envelope: any push that becomes visible between an empty drain loop
    /// and the next external poll is caught here, because it is evaluated
    /// strictly after the drain loop exits.
    pub fn before_poll(&self) -> bool {
        let observed = !self.receiver.is_empty();
        trace!(observed, "AsyncQ::before_poll");
        observed
    }

    /// Call immediately after waking from an external poll, regardless of
    /// whether this queue's fd was the wake reason. Drains all pending
    /// edge-level notifications so the next `before_poll` can arm again.
    pub fn after_poll(&self) {
        trace!("AsyncQ::after_poll");
        self.wake.drain();
    }

    /// Wake-up handle, used internally by pushers that notify after a
    /// successful enqueue. Exposed so a façade holding its own writer mutex
    /// can notify once per batch rather than once per item, if it wants to.
    pub(crate) fn notify(&self) {
        // Best-effort: failure to notify only delays the consumer's wake-up
        // until the next unrelated poll tick, it never loses the item
        // itself (the item is already committed in the channel).
        let _ = self.wake.notify();
    }
}

impl<T, W: WakeSource> fmt::Debug for AsyncQ<T, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncQ")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use super::*;

    fn queue<T>(capacity: usize) -> AsyncQ<T> {
        AsyncQ::new(capacity).expect("eventfd/pipe wake source should be available in CI")
    }

    #[test]
    fn pop_empty_nonblocking_fails_fast() {
        let q: AsyncQ<u32> = queue(4);
        assert_eq!(q.pop(false), Err(Empty));
    }

    #[test]
    fn push_then_pop_round_trips_fifo() {
        let q: AsyncQ<u32> = queue(4);
        q.push(1, true).unwrap();
        q.push(2, true).unwrap();
        q.push(3, true).unwrap();
        assert_eq!(q.pop(false), Ok(1));
        assert_eq!(q.pop(false), Ok(2));
        assert_eq!(q.pop(false), Ok(3));
        assert_eq!(q.pop(false), Err(Empty));
    }

    #[test]
    fn capacity_back_pressure_blocks_until_drained() {
        let q: Arc<AsyncQ<u32>> = Arc::new(queue(1));
        q.push(1, true).unwrap();

        // Non-blocking push on a full, capacity-1 queue must fail fast.
        match q.push(2, false) {
            Err(Full(2)) => {}
            other => panic!("expected Full(2), got {other:?}"),
        }

        let consumer = {
            let q = q.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                q.pop(true).unwrap()
            })
        };

        // Blocking push waits for the consumer to make room.
        q.push(2, true).unwrap();
        assert_eq!(consumer.join().unwrap(), 1);
        assert_eq!(q.pop(true).unwrap(), 2);
    }

    #[test]
    fn before_poll_observes_pending_items() {
        let q: AsyncQ<u32> = queue(4);
        assert!(!q.before_poll());
        q.push(1, true).unwrap();
        assert!(q.before_poll());
        assert_eq!(q.pop(false), Ok(1));
        assert!(!q.before_poll());
    }

    #[test]
    fn wake_fd_arms_and_disarms_across_poll_cycle() {
        let q: AsyncQ<u32> = queue(4);
        assert!(!q.before_poll());

        q.push(1, true).unwrap();

        // fd should be readable now: poll(2) with a zero timeout on the raw fd.
        let mut pfd = libc::pollfd {
            fd: q.get_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let n = unsafe { libc::poll(&mut pfd, 1, 0) };
        assert_eq!(n, 1);
        assert_ne!(pfd.revents & libc::POLLIN, 0);

        q.after_poll();
        assert_eq!(q.pop(false), Ok(1));

        pfd.revents = 0;
        let n = unsafe { libc::poll(&mut pfd, 1, 0) };
        assert_eq!(n, 0, "fd must go non-readable once drained");
    }

    #[test]
    fn multi_producer_preserves_per_producer_order() {
        let q: Arc<AsyncQ<(u8, u32)>> = Arc::new(queue(64));
        let producers: Vec<_> = (0..4u8)
            .map(|p| {
                let q = q.clone();
                thread::spawn(move || {
                    for seq in 0..200u32 {
                        q.push((p, seq), true).unwrap();
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let mut last_seq = [None; 4];
        for _ in 0..(4 * 200) {
            let (p, seq) = q.pop(false).unwrap();
            if let Some(prev) = last_seq[p as usize] {
                assert!(seq > prev, "producer {p} delivered out of order");
            }
            last_seq[p as usize] = Some(seq);
        }
        assert_eq!(q.pop(false), Err(Empty));
    }
}
