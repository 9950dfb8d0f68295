//! Loader process supervision
//!
//! Runs the external loader and forwards its merged stdout/stderr to a
//! line sink as output arrives, so the operator can watch the device
//! enter DFU mode before the transfer starts. The exit code alone
//! decides success; the output is never parsed.

use crate::error::FlashError;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often the forwarding loop checks for cancellation while no
/// output is pending
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cooperative cancellation handle shared between the control thread
/// and the flash worker
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Terminal result of one loader run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exit code 0
    Success,
    /// Any nonzero exit code; killed-by-signal reports -1
    Failure(i32),
    /// Terminated on request before natural exit
    Cancelled,
}

/// Run the loader to completion, forwarding each output line to
/// `on_line` as it becomes available.
///
/// stdout and stderr are piped separately and funneled into one sink;
/// lines keep their per-stream order. When `cancel` is signalled the
/// child receives a termination request, forwarding stops, and the
/// outcome is `Cancelled` regardless of how the child then exits — a
/// cancel requested before the exit was observed always wins.
///
/// Blocking; callers run this on the session's background worker.
pub fn run(
    loader: &Path,
    args: &[OsString],
    on_line: &mut dyn FnMut(&str),
    cancel: &CancelToken,
) -> Result<ExitOutcome, FlashError> {
    let mut child = Command::new(loader)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| FlashError::ProcessLaunch(format!("{}: {}", loader.display(), e)))?;

    log::debug!("spawned loader {} (pid {})", loader.display(), child.id());

    let (tx, rx) = mpsc::channel();
    let readers = [
        spawn_line_reader(child.stdout.take(), tx.clone()),
        spawn_line_reader(child.stderr.take(), tx),
    ];

    let mut cancelled = false;
    loop {
        if cancel.is_cancelled() {
            log::debug!("cancel requested, terminating loader");
            let _ = child.kill();
            cancelled = true;
            break;
        }
        match rx.recv_timeout(CANCEL_POLL_INTERVAL) {
            Ok(line) => on_line(&line),
            Err(RecvTimeoutError::Timeout) => {}
            // Both pipes closed: the child is exiting
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    for reader in readers.into_iter().flatten() {
        let _ = reader.join();
    }
    let status = child
        .wait()
        .map_err(|e| FlashError::ProcessLaunch(e.to_string()))?;

    if cancelled || cancel.is_cancelled() {
        return Ok(ExitOutcome::Cancelled);
    }
    Ok(match status.code() {
        Some(0) => ExitOutcome::Success,
        Some(code) => ExitOutcome::Failure(code),
        None => ExitOutcome::Failure(-1),
    })
}

/// Forward complete lines from a child pipe into the shared channel
fn spawn_line_reader<R>(pipe: Option<R>, tx: Sender<String>) -> Option<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let pipe = pipe?;
    Some(thread::spawn(move || {
        let reader = BufReader::new(pipe);
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    }))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sh() -> PathBuf {
        PathBuf::from("/bin/sh")
    }

    fn sh_args(script: &str) -> Vec<OsString> {
        vec![OsString::from("-c"), OsString::from(script)]
    }

    fn run_script(script: &str, cancel: &CancelToken) -> (ExitOutcome, Vec<String>) {
        let mut lines = Vec::new();
        let outcome = run(
            &sh(),
            &sh_args(script),
            &mut |line| lines.push(line.to_string()),
            cancel,
        )
        .unwrap();
        (outcome, lines)
    }

    #[test]
    fn test_success_and_line_order() {
        let (outcome, lines) = run_script("echo one; echo two; echo three", &CancelToken::new());
        assert_eq!(outcome, ExitOutcome::Success);
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_stderr_merged_into_stream() {
        let (outcome, lines) = run_script("echo out; echo err 1>&2", &CancelToken::new());
        assert_eq!(outcome, ExitOutcome::Success);
        assert!(lines.contains(&"out".to_string()));
        assert!(lines.contains(&"err".to_string()));
    }

    #[test]
    fn test_exit_code_mapping() {
        for code in [1, 2, 127] {
            let (outcome, _) = run_script(&format!("exit {}", code), &CancelToken::new());
            assert_eq!(outcome, ExitOutcome::Failure(code));
        }
    }

    #[test]
    fn test_signal_kill_maps_to_negative_one() {
        let (outcome, _) = run_script("kill -KILL $$", &CancelToken::new());
        assert_eq!(outcome, ExitOutcome::Failure(-1));
    }

    #[test]
    fn test_precancelled_token_terminates() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let start = std::time::Instant::now();
        let (outcome, _) = run_script("sleep 30", &cancel);
        assert_eq!(outcome, ExitOutcome::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_cancel_during_run() {
        let cancel = CancelToken::new();
        let signaller = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            signaller.cancel();
        });

        let (outcome, _) = run_script("sleep 30", &cancel);
        assert_eq!(outcome, ExitOutcome::Cancelled);
        handle.join().unwrap();
    }

    #[test]
    fn test_cancel_wins_over_concurrent_exit() {
        // Child exits on its own almost immediately; a cancel issued
        // before the exit is observed must still report Cancelled
        let cancel = CancelToken::new();
        cancel.cancel();
        let (outcome, _) = run_script("true", &cancel);
        assert_eq!(outcome, ExitOutcome::Cancelled);
    }

    #[test]
    fn test_missing_tool_is_launch_error() {
        let err = run(
            Path::new("/nonexistent/omap_loader"),
            &[],
            &mut |_| {},
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, FlashError::ProcessLaunch(_)));
    }
}
