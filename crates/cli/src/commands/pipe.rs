use unwound_scope::{fail, Context, Result};
use unwound_utils::{read_exact, write_all};

pub fn execute(ctx: &mut Context, message: &str) -> Result<u8> {
    ctx.with_scope(|ctx| {
        let line = ctx.format(format_args!("{message}\n"))?;
        let len = ctx.text(line).map_or(0, str::len);
        // Both ends are ours, so the whole message must fit in the pipe.
        if len > libc::PIPE_BUF {
            fail!(ctx, libc::EMSGSIZE, "message longer than {} bytes", libc::PIPE_BUF);
        }

        let (read_end, write_end) = ctx.pipe()?;
        write_all(ctx, write_end, ctx.text(line).unwrap_or_default().as_bytes())?;

        let mut received = Vec::new();
        if received.try_reserve_exact(len).is_err() {
            return Err(ctx.fail_oom());
        }
        received.resize(len, 0);
        read_exact(ctx, read_end, &mut received)?;

        write_all(ctx, libc::STDOUT_FILENO, &received)?;
        Ok(0)
    })
}
