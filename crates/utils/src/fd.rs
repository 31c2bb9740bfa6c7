//! Descriptor helpers that raise failures through a `Context`

use std::ffi::CStr;
use std::fs::File;
use std::io::{self, Read, Write};
use std::mem::ManuallyDrop;
use std::os::fd::{FromRawFd, RawFd};
use unwound_scope::{Context, Result};

/// Whether reads and writes on a descriptor may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingMode {
    Blocking,
    NonBlocking,
}

impl BlockingMode {
    fn from_flags(flags: libc::c_int) -> Self {
        if flags & libc::O_NONBLOCK != 0 {
            Self::NonBlocking
        } else {
            Self::Blocking
        }
    }
}

pub fn blocking_mode(ctx: &Context, fd: RawFd) -> Result<BlockingMode> {
    get_status_flags(ctx, fd).map(BlockingMode::from_flags)
}

/// Switches `fd` to `mode` and returns the mode it had before.
pub fn set_blocking_mode(ctx: &Context, fd: RawFd, mode: BlockingMode) -> Result<BlockingMode> {
    let flags = get_status_flags(ctx, fd)?;
    let previous = BlockingMode::from_flags(flags);
    if previous == mode {
        return Ok(previous);
    }
    let flags = match mode {
        BlockingMode::Blocking => flags & !libc::O_NONBLOCK,
        BlockingMode::NonBlocking => flags | libc::O_NONBLOCK,
    };
    // SAFETY: F_SETFL takes an int argument.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags) } == -1 {
        return Err(ctx.fail_errno(format_args!("fcntl({fd}, F_SETFL)")));
    }
    Ok(previous)
}

fn get_status_flags(ctx: &Context, fd: RawFd) -> Result<libc::c_int> {
    // SAFETY: F_GETFL takes no argument.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        return Err(ctx.fail_errno(format_args!("fcntl({fd}, F_GETFL)")));
    }
    Ok(flags)
}

/// Replaces `fd` with a fresh read-write descriptor on the same terminal.
///
/// Useful when a terminal descriptor was inherited with the wrong access
/// mode. The replacement keeps the descriptor number and is close-on-exec.
pub fn reopen_tty(ctx: &mut Context, fd: RawFd) -> Result<()> {
    let mut name = [0 as libc::c_char; 256];
    // SAFETY: `name` is writable for its full length.
    let rc = unsafe { libc::ttyname_r(fd, name.as_mut_ptr(), name.len()) };
    if rc != 0 {
        let err = io::Error::from_raw_os_error(rc);
        return Err(ctx.fail_io(&err, format_args!("ttyname_r({fd})")));
    }
    // SAFETY: ttyname_r succeeded, so `name` is NUL-terminated.
    let path = unsafe { CStr::from_ptr(name.as_ptr()) }
        .to_string_lossy()
        .into_owned();

    ctx.with_scope(|ctx| {
        let fresh = ctx.open(path.as_ref(), libc::O_RDWR | libc::O_NOCTTY, 0)?;
        if replace_fd(fresh, fd) == -1 {
            return Err(ctx.fail_errno(format_args!("dup3({fresh}, {fd})")));
        }
        Ok(())
    })
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn replace_fd(from: RawFd, to: RawFd) -> libc::c_int {
    // SAFETY: both descriptors are owned by the caller.
    unsafe { libc::dup3(from, to, libc::O_CLOEXEC) }
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn replace_fd(from: RawFd, to: RawFd) -> libc::c_int {
    // SAFETY: both descriptors are owned by the caller.
    unsafe {
        if libc::dup2(from, to) == -1 {
            return -1;
        }
        libc::fcntl(to, libc::F_SETFD, libc::FD_CLOEXEC)
    }
}

/// Borrows `fd` as a `File` that never closes it.
fn borrow_file(fd: RawFd) -> ManuallyDrop<File> {
    // SAFETY: the `File` is never dropped, so ownership of `fd` stays with
    // whatever scope registered it.
    ManuallyDrop::new(unsafe { File::from_raw_fd(fd) })
}

/// Reads `fd` until end of file.
pub fn read_to_end(ctx: &Context, fd: RawFd) -> Result<Vec<u8>> {
    let mut file = borrow_file(fd);
    let mut buf = Vec::new();
    match file.read_to_end(&mut buf) {
        Ok(_) => Ok(buf),
        Err(e) if e.kind() == io::ErrorKind::OutOfMemory => Err(ctx.fail_oom()),
        Err(e) => Err(ctx.fail_io(&e, format_args!("read({fd})"))),
    }
}

/// Fills `buf` from `fd`; running out of input early is a failure.
pub fn read_exact(ctx: &Context, fd: RawFd, buf: &mut [u8]) -> Result<()> {
    let mut file = borrow_file(fd);
    file.read_exact(buf)
        .map_err(|e| ctx.fail_io(&e, format_args!("read({fd})")))
}

/// Writes all of `bytes` to `fd`, retrying short writes.
pub fn write_all(ctx: &Context, fd: RawFd, bytes: &[u8]) -> Result<()> {
    let mut file = borrow_file(fd);
    file.write_all(bytes)
        .map_err(|e| ctx.fail_io(&e, format_args!("write({fd})")))
}
