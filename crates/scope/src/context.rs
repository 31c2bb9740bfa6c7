//! The context value threading the resource tree and the active error frame
//! through every operation.
//!
//! A `Context` is the whole mutable state of the mechanism: which scope is
//! current, which protected call is the nearest boundary, and the program
//! name reported with failures. It is `!Send`; independent
//! threads use independent contexts.
//!
//! # Protected calls
//!
//! ```
//! use unwound_scope::{fail, Context, Detail};
//!
//! let mut ctx = Context::new("demo");
//! let outcome = ctx.catch_error(Detail::Message, |ctx| -> unwound_scope::Result<()> {
//!     let _block = ctx.alloc(64)?;
//!     fail!(ctx, 22, "bad value {}", 7);
//! });
//!
//! let info = outcome.unwrap_err();
//! assert_eq!(info.code, 22);
//! assert_eq!(info.to_string(), "demo: bad value 7");
//! ```

use crate::failure::{Detail, ErrorInfo, Failure};
use crate::tree::{ResourceTree, ScopeId};
use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::rc::Rc;
use tracing::{debug, error, trace, warn};
use unwound_core::{DEFAULT_PROGRAM_NAME, NO_MEMORY_MESSAGE};

/// Result of any operation that may fail inside a protected call.
pub type Result<T, E = Failure> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy)]
struct Frame {
    boundary: ScopeId,
    detail: Detail,
    depth: usize,
}

/// Scoped resource ownership plus the current error frame.
pub struct Context {
    pub(crate) tree: ResourceTree,
    frame: Option<Frame>,
    program: Rc<RefCell<Rc<str>>>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM_NAME)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("program", &self.program_name())
            .field("current", &self.tree.current())
            .field("live_resources", &self.live_resources())
            .field("depth", &self.depth())
            .finish()
    }
}

impl Context {
    /// Creates a context whose top scope is current and no frame is active.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            tree: ResourceTree::new(),
            frame: None,
            program: Rc::new(RefCell::new(Rc::from(program.as_ref()))),
        }
    }

    /// The permanent top scope.
    pub fn top_scope(&self) -> ScopeId {
        self.tree.top()
    }

    /// The scope new resources are registered into.
    pub fn current_scope(&self) -> ScopeId {
        self.tree.current()
    }

    pub fn parent_scope(&self, scope: ScopeId) -> Option<ScopeId> {
        self.tree.parent(scope)
    }

    /// Whether `scope` has not been torn down yet.
    pub fn is_live(&self, scope: ScopeId) -> bool {
        self.tree.contains(scope)
    }

    pub fn child_count(&self, scope: ScopeId) -> Option<usize> {
        self.tree.child_count(scope)
    }

    /// Scopes and records alive below the top scope.
    pub fn live_resources(&self) -> usize {
        self.tree.len() - 1
    }

    /// Pushes a child of the current scope and makes it current.
    pub fn push_scope(&mut self) -> Result<ScopeId> {
        match self.tree.push_new() {
            Ok(scope) => Ok(scope),
            Err(_) => Err(self.fail_oom()),
        }
    }

    /// Makes the current scope's parent current without releasing anything.
    ///
    /// The popped scope stays alive; the caller now decides when to destroy
    /// it. Returns the popped scope.
    pub fn pop_scope(&mut self) -> ScopeId {
        self.tree.pop_without_destroy()
    }

    /// Releases `scope` and all of its descendants in reverse registration
    /// order. Returns false if it was already gone.
    pub fn destroy_scope(&mut self, scope: ScopeId) -> bool {
        self.tree.destroy(scope)
    }

    /// Leaves `scope` (its parent becomes current) and destroys it.
    pub fn cleanup_local(&mut self, scope: ScopeId) -> bool {
        let Some(parent) = self.tree.parent(scope) else {
            return self.tree.destroy(scope);
        };
        self.tree.set_current(parent);
        self.tree.destroy(scope)
    }

    /// Runs `body` in a fresh scope that is released when `body` succeeds.
    ///
    /// On failure the scope is left for the enclosing protected call to
    /// unwind together with everything else it guards.
    pub fn with_scope<T, F>(&mut self, body: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let scope = self.push_scope()?;
        let value = body(self)?;
        self.cleanup_local(scope);
        Ok(value)
    }

    /// Nesting depth of protected calls; 0 outside any.
    pub fn depth(&self) -> usize {
        self.frame.map_or(0, |frame| frame.depth)
    }

    /// Boundary scope of the innermost protected call.
    pub fn boundary(&self) -> Option<ScopeId> {
        self.frame.map(|frame| frame.boundary)
    }

    /// Runs `body` as a protected call.
    ///
    /// A boundary scope is pushed first. If `body` succeeds, the scope that
    /// was current before the call becomes current again and the boundary
    /// stays alive beneath it. If `body` returns a failure, the boundary and
    /// everything registered beneath it is released in reverse order and the
    /// failure is reported as `ErrorInfo`; the message is only formatted when
    /// `detail` asks for it. A panic in `body` unwinds the boundary the same
    /// way and then resumes.
    pub fn catch_error<T, F>(&mut self, detail: Detail, body: F) -> Result<T, ErrorInfo>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let resume = self.tree.current();
        let boundary = match self.tree.push_new() {
            Ok(scope) => scope,
            Err(_) => return Err(self.fail_oom().into_info()),
        };
        let depth = self.depth() + 1;
        let saved = self.frame.replace(Frame {
            boundary,
            detail,
            depth,
        });
        trace!(depth, boundary = ?boundary, "entered protected call");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(self)));
        self.frame = saved;
        self.tree.set_current(resume);

        match outcome {
            Ok(Ok(value)) => {
                trace!(depth, "protected call returned");
                Ok(value)
            }
            Ok(Err(failure)) => {
                if failure.depth != depth {
                    warn!(
                        raised_at = failure.depth,
                        caught_at = depth,
                        "failure crossed a protected call it was not raised in"
                    );
                }
                debug!(depth, code = failure.code, "unwinding protected call");
                let info = failure.into_info();
                self.tree.destroy(boundary);
                Err(info)
            }
            Err(payload) => {
                debug!(depth, "unwinding protected call after panic");
                self.tree.destroy(boundary);
                panic::resume_unwind(payload)
            }
        }
    }

    /// Raises a failure with `code` and a lazily formatted message.
    ///
    /// The message is only rendered when the active frame asked for detail.
    /// With no protected call active there is nowhere to unwind to, and the
    /// process aborts.
    pub fn fail(&self, code: i32, args: fmt::Arguments<'_>) -> Failure {
        let frame = self.active_frame(code, args);
        let (message, program) = match frame.detail {
            Detail::Message => (Some(render(args)), Some(self.program_name())),
            Detail::CodeOnly => (None, None),
        };
        debug!(code, depth = frame.depth, "failure raised");
        Failure {
            code,
            message,
            program,
            depth: frame.depth,
        }
    }

    /// Raises the out-of-memory failure without allocating.
    pub fn fail_oom(&self) -> Failure {
        let frame = self.active_frame(libc::ENOMEM, format_args!("{NO_MEMORY_MESSAGE}"));
        let program = match frame.detail {
            Detail::Message => Some(self.program_name()),
            Detail::CodeOnly => None,
        };
        Failure {
            code: libc::ENOMEM,
            message: Some(Cow::Borrowed(NO_MEMORY_MESSAGE)),
            program,
            depth: frame.depth,
        }
    }

    /// Raises a failure for a failed platform call: the code is the OS error
    /// number and the message is `"<args>: <error text>"`.
    pub fn fail_io(&self, err: &io::Error, args: fmt::Arguments<'_>) -> Failure {
        let code = err.raw_os_error().unwrap_or(0);
        self.fail(code, format_args!("{args}: {err}"))
    }

    /// Like `fail_io` with the calling thread's last OS error.
    pub fn fail_errno(&self, args: fmt::Arguments<'_>) -> Failure {
        let err = io::Error::last_os_error();
        self.fail_io(&err, args)
    }

    /// Name reported with failures.
    pub fn program_name(&self) -> Rc<str> {
        Rc::clone(&self.program.borrow())
    }

    /// Replaces the reported program name until the current scope is torn
    /// down, at which point the previous name is restored.
    pub fn set_program_name(&mut self, name: &str) -> Result<()> {
        let reservation = self.reserve()?;
        let previous = self.program.replace(Rc::from(name));
        let slot = Rc::clone(&self.program);
        self.commit(reservation, move || {
            slot.replace(previous);
        });
        Ok(())
    }

    fn active_frame(&self, code: i32, args: fmt::Arguments<'_>) -> Frame {
        match self.frame {
            Some(frame) => frame,
            None => {
                error!(code, message = %args, "failure raised outside any protected call");
                process::abort();
            }
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        let top = self.tree.top();
        self.tree.destroy(top);
    }
}

fn render(args: fmt::Arguments<'_>) -> Cow<'static, str> {
    if let Some(literal) = args.as_str() {
        return Cow::Borrowed(literal);
    }
    let mut message = String::new();
    match fmt::write(&mut message, args) {
        Ok(()) => Cow::Owned(message),
        Err(_) => Cow::Borrowed("invalid format string"),
    }
}
