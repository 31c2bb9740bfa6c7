//! Deferred release records, created in two phases.
//!
//! `reserve` inserts a record into the current scope before the fallible
//! acquisition runs; `commit` attaches the release once the acquisition has
//! succeeded. A record that is never committed is skipped at teardown.

use crate::arena::NodeIndex;
use crate::context::{Context, Result};
use std::any::Any;
use std::fmt;
use std::io;
use std::os::fd::RawFd;
use std::panic::{self, AssertUnwindSafe};
use std::process;
use tracing::{debug, error};

/// The release attached to a committed record.
pub(crate) enum Release {
    /// Arbitrary deferred action
    Action(Box<dyn FnOnce()>),
    /// Close a descriptor owned by the record
    CloseFd(RawFd),
    /// Drop an owned payload (memory blocks, formatted strings)
    Owned(Box<dyn Any>),
}

impl fmt::Debug for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Release::Action(_) => f.write_str("Action(..)"),
            Release::CloseFd(fd) => f.debug_tuple("CloseFd").field(fd).finish(),
            Release::Owned(_) => f.write_str("Owned(..)"),
        }
    }
}

impl Release {
    /// Runs the release. Cleanup must not fail: a panicking action or a
    /// double close aborts the process.
    pub(crate) fn run(self) {
        match self {
            Release::Action(action) => {
                if panic::catch_unwind(AssertUnwindSafe(action)).is_err() {
                    error!("cleanup action panicked during teardown");
                    process::abort();
                }
            }
            Release::CloseFd(fd) => close_fd(fd),
            Release::Owned(payload) => drop(payload),
        }
    }
}

fn close_fd(fd: RawFd) {
    // SAFETY: the record is the sole owner of `fd`.
    if unsafe { libc::close(fd) } == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EBADF) {
            error!(fd, "descriptor closed twice");
            process::abort();
        }
        debug!(fd, error = %err, "close reported an error");
    }
}

/// A cleanup record in the resource tree.
#[derive(Debug)]
pub(crate) struct CleanupRecord {
    owner: NodeIndex,
    release: Option<Release>,
}

impl CleanupRecord {
    pub(crate) fn reserved(owner: NodeIndex) -> Self {
        Self {
            owner,
            release: None,
        }
    }

    pub(crate) fn owner(&self) -> NodeIndex {
        self.owner
    }

    pub(crate) fn is_committed(&self) -> bool {
        self.release.is_some()
    }

    pub(crate) fn commit(&mut self, release: Release) {
        debug_assert!(self.release.is_none(), "record committed twice");
        self.release = Some(release);
    }

    /// Runs the attached release, if any.
    pub(crate) fn release(self) {
        if let Some(release) = self.release {
            release.run();
        }
    }

    pub(crate) fn payload<T: Any>(&self) -> Option<&T> {
        match &self.release {
            Some(Release::Owned(payload)) => payload.downcast_ref(),
            _ => None,
        }
    }

    pub(crate) fn payload_mut<T: Any>(&mut self) -> Option<&mut T> {
        match &mut self.release {
            Some(Release::Owned(payload)) => payload.downcast_mut(),
            _ => None,
        }
    }
}

/// A reserved, not yet committed cleanup record.
///
/// Dropping a reservation leaves a harmless no-op record in its scope.
#[must_use = "an uncommitted reservation releases nothing"]
#[derive(Debug)]
pub struct Reservation {
    pub(crate) record: NodeIndex,
}

/// Identifies a committed record that owns a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CleanupId(pub(crate) NodeIndex);

impl Context {
    /// Appends an uncommitted record to the current scope.
    pub fn reserve(&mut self) -> Result<Reservation> {
        match self.tree.insert_cleanup() {
            Ok(record) => Ok(Reservation { record }),
            Err(_) => Err(self.fail_oom()),
        }
    }

    /// Attaches `action` to a reserved record; it runs when the owning scope
    /// is torn down.
    pub fn commit<F>(&mut self, reservation: Reservation, action: F)
    where
        F: FnOnce() + 'static,
    {
        self.tree
            .attach(reservation.record, Release::Action(Box::new(action)));
    }

    /// Makes the owning scope responsible for closing `fd`.
    pub fn commit_close_fd(&mut self, reservation: Reservation, fd: RawFd) {
        self.tree.attach(reservation.record, Release::CloseFd(fd));
    }

    /// Reserves and commits `action` in one step.
    pub fn defer<F>(&mut self, action: F) -> Result<()>
    where
        F: FnOnce() + 'static,
    {
        let reservation = self.reserve()?;
        self.commit(reservation, action);
        Ok(())
    }

    /// Whether the record is still live and uncommitted.
    pub fn is_reserved(&self, reservation: &Reservation) -> bool {
        self.tree
            .cleanup(reservation.record)
            .is_some_and(|record| !record.is_committed())
    }

    /// Scope owning a committed record, `None` once it is torn down.
    pub fn owner_of(&self, id: CleanupId) -> Option<crate::ScopeId> {
        self.tree
            .cleanup(id.0)
            .map(|record| crate::ScopeId(record.owner()))
    }

    pub(crate) fn commit_owned<T: Any>(&mut self, reservation: Reservation, payload: T) -> CleanupId {
        let record = reservation.record;
        self.tree.attach(record, Release::Owned(Box::new(payload)));
        CleanupId(record)
    }

    pub(crate) fn payload<T: Any>(&self, id: CleanupId) -> Option<&T> {
        self.tree.cleanup(id.0)?.payload()
    }

    pub(crate) fn payload_mut<T: Any>(&mut self, id: CleanupId) -> Option<&mut T> {
        self.tree.cleanup_mut(id.0)?.payload_mut()
    }
}
