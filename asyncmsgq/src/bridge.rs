//! Event-loop bridge around the `get_fd`/`before_poll`/`after_poll` trio:
//! after the fd wakes, drain and dispatch everything pending, then re-arm.

use crate::facade::AsyncMsgQ;

/// Drive one full drain cycle: call this from an I/O readiness callback
/// after the fd returned by [`AsyncMsgQ::get_fd`] becomes readable.
///
/// `after_poll` first (clear the wake source), then pop everything
/// available without blocking, dispatching and completing each, then
/// `before_poll` to find out whether anything arrived while draining (if
/// so, the caller should loop again rather than re-enter the external
/// poll).
pub fn drain(queue: &AsyncMsgQ) {
    queue.after_poll();
    loop {
        match queue.get(false) {
            Ok(message) => {
                let ret = message.dispatch();
                queue.done(ret);
            }
            Err(_) => break,
        }
    }
}

/// Drain cycles until the queue is quiescent, i.e. until a drain pass
/// observes nothing left pending even after re-checking (`before_poll`
/// returning `true` means the caller must not poll yet).
///
/// This is the loop a real event-loop integration runs instead of calling
/// [`drain`] once per wakeup: a producer can race the last `get` and post a
/// new item before `before_poll` is checked, so a single drain pass is not
/// by itself enough to guarantee nothing is left unobserved.
pub fn drain_until_quiescent(queue: &AsyncMsgQ) {
    loop {
        drain(queue);
        if !queue.before_poll() {
            break;
        }
    }
}
