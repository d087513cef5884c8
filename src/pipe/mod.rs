//! Raw pipe pair with explicit endpoint ownership.
//!
//! The selector child must see the side-channel descriptors at their numeric
//! values, so the endpoints are plain `libc::pipe(2)` fds (created without
//! CLOEXEC) rather than std pipe wrappers. A [`Pipe`] exclusively owns both
//! of its endpoints until closed; [`Pipe::swap_read`] transfers exactly the
//! read endpoint between two pipes, which is how one pipe's write side gets
//! wired to another pipe's read side for the child-facing fd pair.

use anyhow::{anyhow, Result};
use std::io::{self, ErrorKind};
use std::os::unix::io::RawFd;


/// Sentinel for an endpoint this pipe does not currently own.
const FD_UNSET: RawFd = -1;

/// A bidirectional byte pipe endpoint pair. Both fds start unset; `open`
/// allocates them and `close` (also run on drop) releases whichever are held.
#[derive(Debug)]
pub struct Pipe {
    fd_read: RawFd,
    fd_write: RawFd,
}

impl Default for Pipe {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipe {
    /// Create a pipe with both endpoints unset.
    pub fn new() -> Self {
        Self {
            fd_read: FD_UNSET,
            fd_write: FD_UNSET,
        }
    }

    /// Allocate a fresh OS pipe for this value.
    ///
    /// Fails if either endpoint is already held; an open pipe must be closed
    /// before it can be reopened.
    pub fn open(&mut self) -> Result<()> {
        if self.fd_read >= 0 || self.fd_write >= 0 {
            return Err(anyhow!("pipe is already open"));
        }
        let mut fds: [RawFd; 2] = [FD_UNSET, FD_UNSET];
        // SAFETY: fds is a valid two-element array for pipe(2) to fill.
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(errno_error("pipe allocation failed"));
        }
        self.fd_read = fds[0];
        self.fd_write = fds[1];
        Ok(())
    }

    /// Release whichever endpoints are currently held. Safe to call any
    /// number of times, including on a never-opened or half-owned pipe.
    pub fn close(&mut self) {
        // SAFETY: close_fd ignores FD_UNSET and each fd is owned by this pipe.
        unsafe {
            close_fd(self.fd_read);
            close_fd(self.fd_write);
        }
        self.fd_read = FD_UNSET;
        self.fd_write = FD_UNSET;
    }

    /// Exchange read endpoints with `other`, write endpoints untouched.
    ///
    /// Ownership of each read fd moves wholesale; neither pipe ever holds a
    /// descriptor the other still believes it owns.
    pub fn swap_read(&mut self, other: &mut Pipe) {
        std::mem::swap(&mut self.fd_read, &mut other.fd_read);
    }

    /// Blocking write of the full buffer, retrying short writes and EINTR.
    pub fn write(&mut self, mut data: &[u8]) -> Result<()> {
        if self.fd_write < 0 {
            return Err(anyhow!("pipe is not open"));
        }
        while !data.is_empty() {
            // SAFETY: fd_write is owned and open; data points at len valid bytes.
            let written = unsafe {
                libc::write(self.fd_write, data.as_ptr() as *const libc::c_void, data.len())
            };
            if written < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(anyhow!("pipe write failed: {err}"));
            }
            if written == 0 {
                return Err(anyhow!("pipe write returned 0"));
            }
            data = &data[(written as usize).min(data.len())..];
        }
        Ok(())
    }

    /// Blocking read into `buf`. Returns the number of bytes read; `Ok(0)`
    /// means the peer's write endpoint has closed (end of stream).
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.fd_read < 0 {
            return Err(anyhow!("pipe is not open"));
        }
        loop {
            // SAFETY: fd_read is owned and open; buf is a valid writable slice.
            let n = unsafe {
                libc::read(self.fd_read, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
            };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                continue;
            }
            return Err(anyhow!("pipe read failed: {err}"));
        }
    }

    /// Mark whichever endpoints are held close-on-exec, so spawned children
    /// inherit only descriptors deliberately left inheritable.
    pub fn set_cloexec(&self) -> Result<()> {
        for fd in [self.fd_read, self.fd_write] {
            if fd < 0 {
                continue;
            }
            // SAFETY: fd is owned by this pipe and open; fcntl only touches
            // its descriptor flags.
            let flags = unsafe { libc::fcntl(fd, libc::F_GETFD, 0) };
            if flags < 0 {
                return Err(errno_error("fcntl(F_GETFD) failed"));
            }
            if unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
                return Err(errno_error("fcntl(F_SETFD) failed"));
            }
        }
        Ok(())
    }

    /// The raw (read, write) endpoints, for handing to a child by number.
    pub fn fds(&self) -> (RawFd, RawFd) {
        (self.fd_read, self.fd_write)
    }

    /// Whether both endpoints are currently held.
    pub fn is_open(&self) -> bool {
        self.fd_read >= 0 && self.fd_write >= 0
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        self.close();
    }
}

/// Serializes tests that depend on fd-number accounting. Parallel test
/// threads allocating descriptors would otherwise perturb the numbering.
#[cfg(test)]
pub(crate) fn fd_lock() -> &'static std::sync::Mutex<()> {
    use std::sync::{Mutex, OnceLock};
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Helper that formats OS errors with additional context.
pub(crate) fn errno_error(context: &str) -> anyhow::Error {
    anyhow!("{context}: {}", io::Error::last_os_error())
}

/// Close a file descriptor while ignoring errors.
///
/// # Safety
///
/// `fd` must be a valid, open file descriptor (or -1 to ignore).
unsafe fn close_fd(fd: RawFd) {
    if fd >= 0 {
        let _ = libc::close(fd);
    }
}
