use std::{
    io,
    mem::size_of,
    os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
};

use super::WakeSource;

/// Helper macro to execute a system call and turn a `-1` return into an
/// `io::Error`, the way `compio-driver`'s `syscall!` does for its unix
/// backends.
macro_rules! syscall {
    ($e:expr) => {{
        #[allow(unused_unsafe)]
        let res = unsafe { $e };
        if res == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

/// Linux `eventfd(2)`-backed wake source.
///
/// The fd is created non-blocking in counting mode: `notify` adds 1 to the
/// kernel counter, `drain` reads the counter down to 0. Multiple notifies
/// between drains coalesce into a single wake-up, which is exactly the
/// "spurious readiness permitted" contract `WakeSource` asks for.
#[derive(Debug)]
pub struct EventFd {
    fd: OwnedFd,
}

impl EventFd {
    pub fn new() -> io::Result<Self> {
        let fd = syscall!(libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK))?;
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { fd })
    }
}

impl WakeSource for EventFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    fn notify(&self) -> io::Result<()> {
        let data: u64 = 1;
        match syscall!(libc::write(
            self.fd.as_raw_fd(),
            &data as *const u64 as *const _,
            size_of::<u64>(),
        )) {
            Ok(_) => Ok(()),
            // The 64-bit counter is for practical purposes unreachable, but if a pathological
            // producer ever saturates it, further notifies are redundant anyway.
            Err(e) if e.raw_os_error() == Some(libc::EAGAIN) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn drain(&self) {
        let mut data: u64 = 0;
        loop {
            match syscall!(libc::read(
                self.fd.as_raw_fd(),
                &mut data as *mut u64 as *mut _,
                size_of::<u64>(),
            )) {
                Ok(_) => continue,
                Err(e) if e.raw_os_error() == Some(libc::EAGAIN) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }
}
