//! A pass that breaks exactly-once unloading must take the process down.
//!
//! Each `child_*` test is a no-op unless `PARALLEL_CLEANING_ABORT_CHILD` is
//! set. The parent tests re-run this test binary with the variable set and
//! only that child selected, then inspect how the child died.

mod common;

use std::num::NonZeroUsize;
use std::process::{Command, Output};

use common::{everything_alive, MockCodeCache};
use parallel_cleaning::{next_pass_id, CodeCacheUnloadingTask};

const CHILD_ENV: &str = "PARALLEL_CLEANING_ABORT_CHILD";

fn in_child() -> bool {
    std::env::var_os(CHILD_ENV).is_some()
}

fn run_child(test_name: &str) -> Output {
    let exe = std::env::current_exe().unwrap();
    Command::new(exe)
        .args([test_name, "--exact", "--nocapture", "--test-threads=1"])
        .env(CHILD_ENV, "1")
        .output()
        .unwrap()
}

fn assert_aborted(output: &Output, message: &str) {
    assert!(!output.status.success(), "child should have aborted, got {:?}", output.status);

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        // SIGABRT
        assert_eq!(output.status.signal(), Some(6), "status: {:?}", output.status);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("parallel cleaning invariant violated"), "stderr: {stderr}");
    assert!(stderr.contains(message), "stderr: {stderr}");
}

fn short_pass(verify: bool) {
    let code = MockCodeCache::all_alive(5);
    let task = CodeCacheUnloadingTask::new(
        &code,
        &everything_alive,
        next_pass_id(),
        2,
        true,
        NonZeroUsize::new(2).unwrap(),
        verify,
    );
    // Worker 0 owns the first unit and never shows up.
    task.run_worker(1);
    drop(task);
}

#[test]
fn child_unload_count_mismatch() {
    if in_child() {
        short_pass(true);
    }
}

#[test]
fn child_registry_verification_failure() {
    if in_child() {
        short_pass(false);
    }
}

#[test]
fn test_unload_count_mismatch_aborts() {
    if in_child() {
        return;
    }

    let output = run_child("child_unload_count_mismatch");
    assert_aborted(&output, "4 compiled units unloaded but 5 were alive when the pass started");
}

#[test]
fn test_registry_verification_failure_aborts() {
    if in_child() {
        return;
    }

    let output = run_child("child_registry_verification_failure");
    assert_aborted(&output, "compiled unit CodeId(0) was alive but never unloaded");
}
