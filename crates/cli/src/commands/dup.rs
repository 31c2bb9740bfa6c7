use std::path::Path;
use tracing::debug;
use unwound_scope::{Context, FdHandle, Result};
use unwound_utils::{blocking_mode, read_to_end, write_all};

pub fn execute(ctx: &mut Context, file: &Path) -> Result<u8> {
    let fd = ctx.open(file, libc::O_RDONLY, 0)?;
    let handle = FdHandle::dup_fd(ctx, fd)?;
    let contents = read_to_end(ctx, handle.fd())?;
    debug!(fd, copy = handle.fd(), "read through duplicate");

    let copy = handle.fd();
    handle.destroy(ctx);
    // Only the duplicate is closed; the original is still ours.
    blocking_mode(ctx, fd)?;
    debug!(fd, closed = copy, "duplicate released");

    write_all(ctx, libc::STDOUT_FILENO, &contents)?;
    Ok(0)
}
