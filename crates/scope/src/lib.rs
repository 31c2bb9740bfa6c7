//! Scoped resource ownership with unwinding failure propagation.
//!
//! Resources are registered into a tree of scopes the moment their
//! acquisition begins. A failure raised anywhere inside a protected call is
//! returned to that call's boundary, which releases everything registered
//! since the call began, newest first, and reports the failure to its caller.
//!
//! ## Key Components
//!
//! - **`Context`**: the current scope, the active error frame and the program
//!   name, passed explicitly to every operation.
//! - **Scopes**: `push_scope`, `pop_scope`, `destroy_scope`, `cleanup_local`
//!   and `with_scope` manage the ownership tree.
//! - **Cleanup records**: `reserve` then `commit` (or `commit_close_fd`)
//!   register a release before the acquisition it guards can fail.
//! - **Protected calls**: `catch_error` is the boundary; `fail`, `fail_io`,
//!   `fail_errno` and `fail_oom` raise failures towards it.
//! - **Wrappers**: `alloc`, `format`, `strdup`, `open`, `pipe` and `dup`
//!   acquire or fail.
//! - **`ScopedHandle`**: a resource in a private scope that can be destroyed
//!   on its own.

mod arena;
mod cleanup;
mod context;
mod failure;
mod handle;
mod tree;
mod wrappers;

pub use cleanup::{CleanupId, Reservation};
pub use context::{Context, Result};
pub use failure::{Detail, ErrorInfo, Failure};
pub use handle::{FdHandle, ScopedHandle};
pub use tree::ScopeId;
pub use wrappers::{Block, Text};

/// Returns a failure built from `code` and a format string to the nearest
/// protected call.
///
/// ```
/// # use unwound_scope::{fail, Context, Detail, Result};
/// fn check(ctx: &mut Context, n: i32) -> Result<i32> {
///     if n < 0 {
///         fail!(ctx, 22, "negative input {}", n);
///     }
///     Ok(n)
/// }
///
/// let mut ctx = Context::new("check");
/// assert!(ctx.catch_error(Detail::CodeOnly, |ctx| check(ctx, -1)).is_err());
/// ```
#[macro_export]
macro_rules! fail {
    ($ctx:expr, $code:expr, $($arg:tt)+) => {
        return ::core::result::Result::Err($ctx.fail($code, ::core::format_args!($($arg)+)))
    };
}
