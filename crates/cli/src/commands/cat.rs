use std::os::fd::RawFd;
use std::path::PathBuf;
use tracing::debug;
use unwound_scope::{Context, Result};
use unwound_utils::{read_to_end, write_all};

pub fn execute(ctx: &mut Context, files: &[PathBuf]) -> Result<u8> {
    let mut fds: Vec<RawFd> = Vec::new();
    if fds.try_reserve_exact(files.len()).is_err() {
        return Err(ctx.fail_oom());
    }
    for path in files {
        fds.push(ctx.open(path, libc::O_RDONLY, 0)?);
    }
    debug!(count = fds.len(), "opened all inputs");

    for fd in fds {
        let contents = read_to_end(ctx, fd)?;
        write_all(ctx, libc::STDOUT_FILENO, &contents)?;
    }
    Ok(0)
}
