use std::{
    io,
    os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
};

use super::WakeSource;

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

/// Self-pipe wake source for unix platforms without `eventfd` (macOS, BSDs).
///
/// `notify` writes a single byte to the write end; `drain` reads until the
/// read end is empty. An acceptable alternative backing for the wake fd on
/// platforms without `eventfd`.
#[derive(Debug)]
pub struct SelfPipe {
    read: OwnedFd,
    write: OwnedFd,
}

impl SelfPipe {
    pub fn new() -> io::Result<Self> {
        let mut fds = [0 as libc::c_int; 2];
        syscall!(libc::pipe2(
            fds.as_mut_ptr(),
            libc::O_CLOEXEC | libc::O_NONBLOCK
        ))?;
        let read = unsafe { OwnedFd::from_raw_fd(fds[0]) };
        let write = unsafe { OwnedFd::from_raw_fd(fds[1]) };
        Ok(Self { read, write })
    }
}

impl WakeSource for SelfPipe {
    fn as_raw_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }

    fn notify(&self) -> io::Result<()> {
        let byte = [1u8];
        match syscall!(libc::write(self.write.as_raw_fd(), byte.as_ptr() as *const _, 1)) {
            Ok(_) => Ok(()),
            // The pipe buffer is already non-empty: readiness is already armed, coalesce.
            Err(e) if e.raw_os_error() == Some(libc::EAGAIN) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn drain(&self) {
        let mut buf = [0u8; 64];
        loop {
            match syscall!(libc::read(
                self.read.as_raw_fd(),
                buf.as_mut_ptr() as *mut _,
                buf.len(),
            )) {
                Ok(n) if n == buf.len() as isize => continue,
                Ok(_) => break,
                Err(e) if e.raw_os_error() == Some(libc::EAGAIN) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }
}
