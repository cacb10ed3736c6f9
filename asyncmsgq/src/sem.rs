//! A minimal binary semaphore, used by `send`'s round trip. Built directly
//! on `std::sync::{Mutex, Condvar}` rather than an extra dependency, the
//! same way `compio-dispatcher`'s `Executing<R>` wakes a blocked waiter
//! through a shared `Mutex`-guarded slot plus a notification primitive.

use std::sync::{Arc, Condvar, Mutex};

struct Inner {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

/// A binary semaphore with the standard `new`/`wait`/`post` signature a
/// host environment is expected to provide.
#[derive(Clone)]
pub(crate) struct BinarySemaphore(Arc<Inner>);

impl BinarySemaphore {
    pub(crate) fn new(initial: bool) -> Self {
        Self(Arc::new(Inner {
            signaled: Mutex::new(initial),
            condvar: Condvar::new(),
        }))
    }

    /// Block until `post` has been called at least once since the last
    /// `wait` (or since construction, for the first `wait`).
    pub(crate) fn wait(&self) {
        let mut signaled = self.0.signaled.lock().unwrap();
        while !*signaled {
            signaled = self.0.condvar.wait(signaled).unwrap();
        }
        *signaled = false;
    }

    pub(crate) fn post(&self) {
        let mut signaled = self.0.signaled.lock().unwrap();
        *signaled = true;
        self.0.condvar.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;

    #[test]
    fn post_wakes_a_blocked_wait() {
        let sem = BinarySemaphore::new(false);
        let waiter = {
            let sem = sem.clone();
            thread::spawn(move || sem.wait())
        };
        thread::sleep(Duration::from_millis(20));
        sem.post();
        waiter.join().unwrap();
    }

    #[test]
    fn initial_true_does_not_block() {
        let sem = BinarySemaphore::new(true);
        sem.wait();
    }
}
