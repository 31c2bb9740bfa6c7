//! Integration tests for scope teardown and unwinding across protected calls

use std::cell::RefCell;
use std::io::Write;
use std::os::fd::RawFd;
use std::rc::Rc;
use tempfile::NamedTempFile;
use unwound_scope::{fail, Context, Detail, FdHandle, Result};

type Log = Rc<RefCell<Vec<&'static str>>>;

fn append(log: &Log, entry: &'static str) -> impl FnOnce() + 'static {
    let log = Rc::clone(log);
    move || log.borrow_mut().push(entry)
}

/// Pipe whose read end never blocks, so "no writers left" reads as 0 and
/// "a writer is still open" reads as EAGAIN.
fn nonblocking_pipe() -> (RawFd, RawFd) {
    let mut fds = [0; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    let flags = unsafe { libc::fcntl(fds[0], libc::F_GETFL) };
    assert_eq!(unsafe { libc::fcntl(fds[0], libc::F_SETFL, flags | libc::O_NONBLOCK) }, 0);
    (fds[0], fds[1])
}

fn writers_gone(read_end: RawFd) -> bool {
    let mut byte = [0u8; 1];
    unsafe { libc::read(read_end, byte.as_mut_ptr().cast(), 1) == 0 }
}

#[test]
fn test_root_teardown_runs_child_cleanup_first() {
    let log: Log = Rc::default();
    let mut ctx = Context::new("scenario");

    let root = ctx.push_scope().unwrap();
    let reservation = ctx.reserve().unwrap();
    ctx.commit(reservation, append(&log, "A"));
    ctx.push_scope().unwrap();
    let reservation = ctx.reserve().unwrap();
    ctx.commit(reservation, append(&log, "B"));

    assert!(ctx.destroy_scope(root));
    assert_eq!(*log.borrow(), vec!["B", "A"]);
    assert_eq!(ctx.current_scope(), ctx.top_scope());
}

#[test]
fn test_failure_releases_only_what_the_call_acquired() {
    let log: Log = Rc::default();
    let mut ctx = Context::new("scenario");
    ctx.defer(append(&log, "before")).unwrap();

    let outcome = ctx.catch_error(Detail::Message, |ctx| -> Result<()> {
        ctx.defer(append(&log, "outer-before"))?;
        let inner = ctx.catch_error(Detail::Message, |ctx| -> Result<()> {
            for entry in ["s1", "s2", "s3"] {
                ctx.push_scope()?;
                ctx.defer(append(&log, entry))?;
            }
            fail!(ctx, libc::EIO, "deepest scope failed");
        });
        assert!(inner.is_err());
        assert_eq!(*log.borrow(), vec!["s3", "s2", "s1"]);
        Ok(())
    });

    assert!(outcome.is_ok());
    assert_eq!(*log.borrow(), vec!["s3", "s2", "s1"]);

    drop(ctx);
    assert_eq!(*log.borrow(), vec!["s3", "s2", "s1", "outer-before", "before"]);
}

#[test]
#[cfg(target_os = "linux")]
fn test_second_open_failure_closes_first_descriptor() {
    let (read_end, write_end) = nonblocking_pipe();
    let first = format!("/proc/self/fd/{write_end}");

    let mut ctx = Context::new("scenario");
    let info = ctx
        .catch_error(Detail::Message, |ctx| -> Result<()> {
            ctx.open(first.as_ref(), libc::O_WRONLY, 0)?;
            // The descriptor opened above is now the pipe's only writer.
            unsafe { libc::close(write_end) };
            assert!(!writers_gone(read_end));
            ctx.open("/nonexistent/second".as_ref(), libc::O_RDONLY, 0)?;
            Ok(())
        })
        .unwrap_err();

    assert_eq!(info.code, libc::ENOENT);
    assert!(info
        .message
        .as_deref()
        .unwrap()
        .starts_with("open(\"/nonexistent/second\")"));
    assert!(writers_gone(read_end));
    unsafe { libc::close(read_end) };
}

#[test]
fn test_handle_destroy_closes_only_its_descriptor() {
    let log: Log = Rc::default();
    let (read_end, write_end) = nonblocking_pipe();
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"unrelated").unwrap();

    let mut ctx = Context::new("scenario");
    let other = ctx.open(file.path(), libc::O_RDONLY, 0).unwrap();
    ctx.defer(append(&log, "unrelated")).unwrap();

    let handle = FdHandle::dup_fd(&mut ctx, write_end).unwrap();
    unsafe { libc::close(write_end) };
    assert!(!writers_gone(read_end));

    assert!(handle.destroy(&mut ctx));
    assert!(writers_gone(read_end));
    assert!(unsafe { libc::fcntl(other, libc::F_GETFD) } != -1);
    assert!(log.borrow().is_empty());

    drop(ctx);
    assert_eq!(*log.borrow(), vec!["unrelated"]);
    unsafe { libc::close(read_end) };
}

#[test]
fn test_error_detail_toggle() {
    let mut ctx = Context::new("scenario");

    let detailed = ctx
        .catch_error(Detail::Message, |ctx| -> Result<()> {
            fail!(ctx, libc::EACCES, "denied {}", "/etc/shadow");
        })
        .unwrap_err();
    assert_eq!(detailed.code, libc::EACCES);
    assert_eq!(detailed.message.as_deref(), Some("denied /etc/shadow"));
    assert_eq!(detailed.to_string(), "scenario: denied /etc/shadow");

    let terse = ctx
        .catch_error(Detail::CodeOnly, |ctx| -> Result<()> {
            fail!(ctx, libc::EACCES, "denied {}", "/etc/shadow");
        })
        .unwrap_err();
    assert_eq!(terse.code, libc::EACCES);
    assert!(terse.message.is_none());
}

#[test]
fn test_deeply_nested_failure_unwinds_everything() {
    let log: Log = Rc::default();
    let mut ctx = Context::new("scenario");
    let before = ctx.live_resources();

    let info = ctx
        .catch_error(Detail::CodeOnly, |ctx| -> Result<()> {
            ctx.defer(append(&log, "boundary"))?;
            for _ in 0..100_000 {
                ctx.push_scope()?;
            }
            ctx.defer(append(&log, "deepest"))?;
            fail!(ctx, libc::ELOOP, "too deep");
        })
        .unwrap_err();

    assert_eq!(info.code, libc::ELOOP);
    assert_eq!(*log.borrow(), vec!["deepest", "boundary"]);
    assert_eq!(ctx.live_resources(), before);
    assert_eq!(ctx.current_scope(), ctx.top_scope());
}

#[test]
fn test_dropping_context_with_deep_nesting() {
    let log: Log = Rc::default();
    let mut ctx = Context::new("scenario");
    for _ in 0..100_000 {
        ctx.push_scope().unwrap();
    }
    ctx.defer(append(&log, "deepest")).unwrap();

    drop(ctx);
    assert_eq!(*log.borrow(), vec!["deepest"]);
}

#[test]
fn test_reservation_from_another_context_is_released_at_once() {
    let log: Log = Rc::default();
    let mut owner = Context::new("owner");
    let mut stranger = Context::new("stranger");

    let scope = owner.push_scope().unwrap();
    owner.defer(append(&log, "owned")).unwrap();
    stranger.push_scope().unwrap();
    let foreign = stranger.reserve().unwrap();

    // Same slot and generation as `owner`'s record, different tree.
    owner.commit(foreign, append(&log, "foreign"));
    assert_eq!(*log.borrow(), vec!["foreign"]);

    assert!(owner.cleanup_local(scope));
    assert_eq!(*log.borrow(), vec!["foreign", "owned"]);
}
