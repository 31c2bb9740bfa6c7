//! Reentrant file lock serializing debug output across processes

use fs2::FileExt;
use std::cell::RefCell;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process;
use std::rc::Rc;
use tracing::warn;
use unwound_core::{Config, Error};
use unwound_scope::{Context, Result};

#[derive(Debug, Default)]
struct LockState {
    file: Option<File>,
    level: u32,
}

/// An exclusive lock on a shared file, held while any scope that acquired
/// it is alive.
///
/// Acquisitions nest: only the outermost one takes the file lock and only
/// the teardown of the last one releases it. The lock file is opened on
/// first use and kept open. If it cannot be opened, debug output proceeds
/// unserialized.
#[derive(Debug, Clone)]
pub struct DebugLock {
    path: PathBuf,
    state: Rc<RefCell<LockState>>,
}

impl DebugLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Rc::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.debug_lock_path)
    }

    /// Number of live acquisitions.
    pub fn level(&self) -> u32 {
        self.state.borrow().level
    }

    /// Acquires the lock until the current scope is torn down.
    pub fn acquire(&self, ctx: &mut Context) -> Result<()> {
        let reservation = ctx.reserve()?;
        {
            let mut state = self.state.borrow_mut();
            if state.file.is_none() {
                match open_lock_file(&self.path) {
                    Ok(file) => state.file = Some(file),
                    Err(e) => warn!(error = %e, "debug output will not be serialized"),
                }
            }
            if state.level == 0 {
                if let Some(file) = &state.file {
                    if let Err(e) = file.lock_exclusive() {
                        warn!(path = %self.path.display(), error = %e, "flock failed");
                    }
                }
            }
            state.level += 1;
        }

        let state = Rc::clone(&self.state);
        ctx.commit(reservation, move || {
            let mut state = state.borrow_mut();
            state.level -= 1;
            if state.level == 0 {
                if let Some(file) = &state.file {
                    let _ = FileExt::unlock(file);
                }
            }
        });
        Ok(())
    }
}

fn open_lock_file(path: &Path) -> unwound_core::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o644)
        .open(path)
        .map_err(|e| Error::file_system(path, "open", e))
}

/// Writes `"<program>(<pid>): <message>"` to stderr while holding `lock`.
pub fn debug_print(ctx: &mut Context, lock: &DebugLock, args: fmt::Arguments<'_>) -> Result<()> {
    ctx.with_scope(|ctx| {
        lock.acquire(ctx)?;
        let program = ctx.program_name();
        let text = ctx.format(format_args!("{program}({:04}): {args}\n", process::id()))?;

        let written = {
            let line = ctx.text(text).unwrap_or_default();
            let mut stderr = io::stderr().lock();
            stderr
                .write_all(line.as_bytes())
                .and_then(|()| stderr.flush())
        };
        if let Err(e) = written {
            return Err(ctx.fail_io(&e, format_args!("write(stderr)")));
        }
        Ok(())
    })
}
