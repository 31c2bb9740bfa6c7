use unwound_core::Config;
use unwound_scope::{Context, Result};
use unwound_utils::write_all;

pub fn execute(ctx: &mut Context, config: &Config) -> Result<u8> {
    let json = match config.to_json() {
        Ok(json) => json,
        Err(e) => return Err(ctx.fail(libc::EINVAL, format_args!("{e}"))),
    };
    let text = ctx.format(format_args!("{json}\n"))?;
    write_all(ctx, libc::STDOUT_FILENO, ctx.text(text).unwrap_or_default().as_bytes())?;
    Ok(0)
}
