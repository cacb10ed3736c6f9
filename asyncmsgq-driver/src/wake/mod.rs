//! The wake source backing [`crate::queue::AsyncQ`]'s pollable fd.
//!
//! Two backends, chosen the way `compio-driver` picks an io-uring vs.
//! `polling` backend per platform: Linux gets a real `eventfd`, every other
//! unix falls back to a self-pipe. Both are level-triggered from the caller's
//! point of view once [`WakeSource::drain`] is disciplined by
//! `before_poll`/`after_poll` (see [`crate::queue`]).

use std::{io, os::fd::RawFd};

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod eventfd;
        pub use eventfd::EventFd as DefaultWake;
    } else if #[cfg(unix)] {
        mod pipe;
        pub use pipe::SelfPipe as DefaultWake;
    } else {
        compile_error!("asyncmsgq-driver only supports unix targets");
    }
}

/// A fd-backed wake primitive: readable exactly when [`WakeSource::notify`]
/// has been called at least once since the last [`WakeSource::drain`].
///
/// Spurious readiness is permitted: a consumer must always be prepared to
/// find nothing after waking.
pub trait WakeSource: Send + Sync + 'static {
    /// Raw fd suitable for the host's poll/select primitive.
    fn as_raw_fd(&self) -> RawFd;

    /// Make the fd readable. Safe to call from any thread, any number of
    /// times; implementations must coalesce redundant notifies rather than
    /// erroring.
    fn notify(&self) -> io::Result<()>;

    /// Consume all pending readiness so the fd goes back to non-readable
    /// until the next [`WakeSource::notify`]. Must never block.
    fn drain(&self);
}
