//! Resources living in a private scope of their own.

use crate::context::{Context, Result};
use crate::tree::ScopeId;
use std::os::fd::RawFd;
use tracing::warn;

/// A value whose resources live in a private scope.
///
/// The private scope is created under whatever scope was current, then
/// popped without being destroyed, so returning to that parent does not
/// release it. `destroy` releases exactly what the handle acquired, however
/// much else is alive in the tree. If an ancestor is torn down first the
/// handle goes stale; `destroy` then detects it and does nothing.
#[derive(Debug)]
#[must_use = "dropping a handle leaves its scope alive until an ancestor is destroyed"]
pub struct ScopedHandle<T> {
    scope: ScopeId,
    value: T,
}

/// A descriptor that can be closed independently of where it was opened.
pub type FdHandle = ScopedHandle<RawFd>;

impl<T> ScopedHandle<T> {
    /// Runs `acquire` inside a new private scope.
    ///
    /// A failure inside `acquire` propagates like any other; the private
    /// scope is then unwound by the enclosing protected call.
    pub fn create<F>(ctx: &mut Context, acquire: F) -> Result<Self>
    where
        F: FnOnce(&mut Context) -> Result<T>,
    {
        let scope = ctx.push_scope()?;
        let value = acquire(ctx)?;
        ctx.pop_scope();
        Ok(Self { scope, value })
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// The private scope owning the handle's resources.
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Whether the private scope still exists.
    pub fn is_live(&self, ctx: &Context) -> bool {
        ctx.is_live(self.scope)
    }

    /// Releases the handle's private scope.
    ///
    /// Returns false if the scope was already torn down along with one of
    /// its ancestors.
    pub fn destroy(self, ctx: &mut Context) -> bool {
        let destroyed = ctx.destroy_scope(self.scope);
        if !destroyed {
            warn!(scope = ?self.scope, "handle outlived its scope");
        }
        destroyed
    }
}

impl ScopedHandle<RawFd> {
    /// Duplicates `fd` into a private scope.
    pub fn dup_fd(ctx: &mut Context, fd: RawFd) -> Result<Self> {
        Self::create(ctx, |ctx| ctx.dup(fd))
    }

    pub fn fd(&self) -> RawFd {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fail, Detail};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_handle_scope_outlives_return_to_parent() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut ctx = Context::new("test");
        let parent = ctx.current_scope();

        let sink = Rc::clone(&log);
        let handle = ScopedHandle::create(&mut ctx, move |ctx| {
            ctx.defer(move || sink.borrow_mut().push("handle"))?;
            Ok("payload")
        })
        .unwrap();

        assert_eq!(ctx.current_scope(), parent);
        assert_eq!(ctx.parent_scope(handle.scope()), Some(parent));
        assert_eq!(*handle.get(), "payload");
        assert!(log.borrow().is_empty());

        assert!(handle.destroy(&mut ctx));
        assert_eq!(*log.borrow(), vec!["handle"]);
    }

    #[test]
    fn test_stale_handle_is_rejected() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut ctx = Context::new("test");
        let ancestor = ctx.push_scope().unwrap();

        let sink = Rc::clone(&log);
        let handle = ScopedHandle::create(&mut ctx, move |ctx| {
            ctx.defer(move || sink.borrow_mut().push("once"))
        })
        .unwrap();

        ctx.cleanup_local(ancestor);
        assert!(!handle.is_live(&ctx));
        assert!(!handle.destroy(&mut ctx));
        assert_eq!(*log.borrow(), vec!["once"]);
    }

    #[test]
    fn test_failed_acquisition_unwinds_through_frame() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut ctx = Context::new("test");

        let info = ctx
            .catch_error(Detail::Message, |ctx| {
                let sink = Rc::clone(&log);
                ScopedHandle::create(ctx, move |ctx| -> Result<()> {
                    ctx.defer(move || sink.borrow_mut().push("partial"))?;
                    fail!(ctx, libc::EMFILE, "out of descriptors");
                })
            })
            .unwrap_err();

        assert_eq!(info.code, libc::EMFILE);
        assert_eq!(*log.borrow(), vec!["partial"]);
        assert_eq!(ctx.live_resources(), 0);
    }
}
