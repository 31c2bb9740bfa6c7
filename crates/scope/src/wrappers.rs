//! Acquire-or-fail wrappers.
//!
//! Each wrapper reserves its cleanup record before touching the platform, so
//! the record is already in the tree if the acquisition fails (and then stays
//! an inert no-op), and is committed with the matching release on success.

use crate::cleanup::CleanupId;
use crate::context::{Context, Result};
use std::ffi::CString;
use std::fmt::{self, Write as _};
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// A zero-filled memory block owned by a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block(CleanupId);

/// A formatted string owned by a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Text(CleanupId);

impl Block {
    pub fn id(self) -> CleanupId {
        self.0
    }
}

impl Text {
    pub fn id(self) -> CleanupId {
        self.0
    }
}

impl Context {
    /// Allocates `len` zeroed bytes in the current scope.
    pub fn alloc(&mut self, len: usize) -> Result<Block> {
        let reservation = self.reserve()?;
        let mut buf: Vec<u8> = Vec::new();
        if buf.try_reserve_exact(len).is_err() {
            return Err(self.fail_oom());
        }
        buf.resize(len, 0);
        Ok(Block(self.commit_owned(reservation, buf.into_boxed_slice())))
    }

    /// Contents of `block`, `None` once its scope is torn down.
    pub fn block(&self, block: Block) -> Option<&[u8]> {
        self.payload::<Box<[u8]>>(block.0).map(|bytes| &**bytes)
    }

    pub fn block_mut(&mut self, block: Block) -> Option<&mut [u8]> {
        self.payload_mut::<Box<[u8]>>(block.0)
            .map(|bytes| &mut **bytes)
    }

    /// Formats `args` into a string owned by the current scope.
    pub fn format(&mut self, args: fmt::Arguments<'_>) -> Result<Text> {
        let reservation = self.reserve()?;
        let mut text = String::new();
        if text.write_fmt(args).is_err() {
            return Err(self.fail(libc::EINVAL, format_args!("invalid format string")));
        }
        Ok(Text(self.commit_owned(reservation, text)))
    }

    /// Copies `s` into a string owned by the current scope.
    pub fn strdup(&mut self, s: &str) -> Result<Text> {
        self.format(format_args!("{s}"))
    }

    /// Contents of `text`, `None` once its scope is torn down.
    pub fn text(&self, text: Text) -> Option<&str> {
        self.payload::<String>(text.0).map(String::as_str)
    }

    /// Opens `path` with `flags | O_CLOEXEC`; the current scope closes it.
    pub fn open(&mut self, path: &Path, flags: libc::c_int, mode: libc::mode_t) -> Result<RawFd> {
        let reservation = self.reserve()?;
        let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
            return Err(self.fail(
                libc::EINVAL,
                format_args!("open(\"{}\"): path contains a NUL byte", path.display()),
            ));
        };
        // SAFETY: `c_path` is a valid NUL-terminated string.
        let fd = unsafe { libc::open(c_path.as_ptr(), flags | libc::O_CLOEXEC, libc::c_uint::from(mode)) };
        if fd == -1 {
            return Err(self.fail_errno(format_args!("open(\"{}\")", path.display())));
        }
        self.commit_close_fd(reservation, fd);
        Ok(fd)
    }

    /// Creates a close-on-exec pipe; returns `(read_end, write_end)`.
    pub fn pipe(&mut self) -> Result<(RawFd, RawFd)> {
        let read_reservation = self.reserve()?;
        let write_reservation = self.reserve()?;
        let mut fds: [RawFd; 2] = [-1; 2];
        if create_pipe(&mut fds) == -1 {
            return Err(self.fail_errno(format_args!("pipe2")));
        }
        self.commit_close_fd(read_reservation, fds[0]);
        self.commit_close_fd(write_reservation, fds[1]);
        Ok((fds[0], fds[1]))
    }

    /// Duplicates `fd` with close-on-exec; the current scope closes the copy.
    pub fn dup(&mut self, fd: RawFd) -> Result<RawFd> {
        let reservation = self.reserve()?;
        // SAFETY: F_DUPFD_CLOEXEC only reads `fd`.
        let new_fd = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
        if new_fd == -1 {
            return Err(self.fail_errno(format_args!("fcntl({fd}, F_DUPFD_CLOEXEC)")));
        }
        self.commit_close_fd(reservation, new_fd);
        Ok(new_fd)
    }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn create_pipe(fds: &mut [RawFd; 2]) -> libc::c_int {
    // SAFETY: `fds` has room for both ends.
    unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) }
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn create_pipe(fds: &mut [RawFd; 2]) -> libc::c_int {
    // SAFETY: `fds` has room for both ends; both are ours until returned.
    unsafe {
        if libc::pipe(fds.as_mut_ptr()) == -1 {
            return -1;
        }
        for &fd in fds.iter() {
            if libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) == -1 {
                libc::close(fds[0]);
                libc::close(fds[1]);
                return -1;
            }
        }
    }
    0
}
