//! Failures with nowhere to unwind to must abort the process.
//!
//! Each test re-runs this test binary filtered to itself, with
//! `UNWOUND_FATAL_CHILD` set; the child performs the fatal operation and the
//! parent asserts that it died from SIGABRT.

use std::env;
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus, Stdio};
use unwound_scope::Context;

const CHILD_VAR: &str = "UNWOUND_FATAL_CHILD";

fn in_child() -> bool {
    env::var_os(CHILD_VAR).is_some()
}

fn run_in_child(test_name: &str) -> ExitStatus {
    Command::new(env::current_exe().unwrap())
        .args(["--exact", test_name, "--test-threads=1", "--nocapture"])
        .env(CHILD_VAR, test_name)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .unwrap()
}

fn assert_aborted(status: ExitStatus) {
    assert_eq!(
        status.signal(),
        Some(libc::SIGABRT),
        "expected SIGABRT, got {status:?}"
    );
}

#[test]
fn test_fail_outside_protected_call_aborts() {
    if in_child() {
        let ctx = Context::new("fatal");
        let _ = ctx.fail(libc::EINVAL, format_args!("no frame to unwind to"));
        return;
    }
    assert_aborted(run_in_child("test_fail_outside_protected_call_aborts"));
}

#[test]
fn test_panicking_cleanup_aborts() {
    if in_child() {
        let mut ctx = Context::new("fatal");
        let scope = ctx.push_scope().unwrap();
        ctx.defer(|| panic!("cleanup failed")).unwrap();
        ctx.cleanup_local(scope);
        return;
    }
    assert_aborted(run_in_child("test_panicking_cleanup_aborts"));
}

#[test]
fn test_closing_descriptor_twice_aborts() {
    if in_child() {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        unsafe {
            libc::close(fds[0]);
            libc::close(fds[1]);
        }

        let mut ctx = Context::new("fatal");
        let scope = ctx.push_scope().unwrap();
        let reservation = ctx.reserve().unwrap();
        ctx.commit_close_fd(reservation, fds[1]);
        ctx.cleanup_local(scope);
        return;
    }
    assert_aborted(run_in_child("test_closing_descriptor_twice_aborts"));
}

#[test]
fn test_recovered_failure_does_not_abort() {
    if in_child() {
        let mut ctx = Context::new("fatal");
        let outcome = ctx.catch_error(unwound_scope::Detail::CodeOnly, |ctx| {
            Err::<(), _>(ctx.fail(libc::EINVAL, format_args!("caught")))
        });
        assert!(outcome.is_err());
        return;
    }
    let status = run_in_child("test_recovered_failure_does_not_abort");
    assert!(status.success(), "child failed: {status:?}");
}
