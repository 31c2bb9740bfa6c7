use unwound_core::Config;
use unwound_scope::{Context, Result};
use unwound_utils::{debug_print, DebugLock};

pub fn execute(ctx: &mut Context, config: &Config, message: &str) -> Result<u8> {
    let lock = DebugLock::from_config(config);
    debug_print(ctx, &lock, format_args!("{message}"))?;
    Ok(0)
}
