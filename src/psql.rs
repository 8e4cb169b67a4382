//! Local `psql` hand-off
//!
//! The connection URI is passed as the first argument, followed by whatever
//! the user put after `--`. SIGINT and SIGTERM received while the child runs
//! are forwarded to it, and its exit code becomes ours.

use std::process::ExitStatus;

use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::{CtlError, Result};

/// Run `psql <uri> <args...>` and return its exit code
pub async fn run_psql(uri: &str, args: &[String]) -> Result<i32> {
    let mut argv = Vec::with_capacity(args.len() + 1);
    argv.push(uri.to_string());
    argv.extend_from_slice(args);
    run_forwarding_signals("psql", &argv).await
}

/// Spawn `program`, forward termination signals, return its exit code
pub async fn run_forwarding_signals(program: &str, args: &[String]) -> Result<i32> {
    let mut child = Command::new(program).args(args).spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CtlError::process(format!("{program} not found, make sure it is installed and on PATH"))
        } else {
            CtlError::process(format!("Failed to start {program}: {e}"))
        }
    })?;
    debug!(program, pid = ?child.id(), "spawned child process");

    let status = wait_with_forwarding(&mut child)
        .await
        .map_err(|e| CtlError::process(format!("Failed waiting for {program}: {e}")))?;
    Ok(exit_code(&status))
}

#[cfg(unix)]
async fn wait_with_forwarding(child: &mut Child) -> std::io::Result<ExitStatus> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let pid = child.id().and_then(|pid| i32::try_from(pid).ok());

    loop {
        tokio::select! {
            status = child.wait() => return status,
            _ = interrupt.recv() => forward_signal(pid, libc::SIGINT),
            _ = terminate.recv() => forward_signal(pid, libc::SIGTERM),
        }
    }
}

#[cfg(not(unix))]
async fn wait_with_forwarding(child: &mut Child) -> std::io::Result<ExitStatus> {
    child.wait().await
}

#[cfg(unix)]
fn forward_signal(pid: Option<i32>, signal: i32) {
    if let Some(pid) = pid {
        debug!(pid, signal, "forwarding signal to child");
        // SAFETY: kill(2) takes plain integers and touches no memory of ours.
        // `pid` is our child and is only reaped by the `wait` arm of
        // `wait_with_forwarding`, so it still names that child here.
        // ESRCH when the child already exited; nothing to do.
        let _ = unsafe { libc::kill(pid, signal) };
    }
}

#[cfg(unix)]
fn exit_code(status: &ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal().map(|signal| 128 + signal)).unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: &ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exit_code_is_propagated() {
        let code = run_forwarding_signals("sh", &["-c".into(), "exit 3".into()]).await.unwrap();
        assert_eq!(code, 3);
    }

    #[tokio::test]
    async fn test_signalled_child_maps_to_128_plus_signal() {
        let code =
            run_forwarding_signals("sh", &["-c".into(), "kill -TERM $$".into()]).await.unwrap();
        assert_eq!(code, 128 + libc::SIGTERM);
    }

    #[tokio::test]
    async fn test_forward_signal_reaches_child() {
        use std::os::unix::process::ExitStatusExt;

        let mut child = tokio::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id().and_then(|pid| i32::try_from(pid).ok());
        forward_signal(pid, libc::SIGTERM);

        let status = child.wait().await.unwrap();
        assert_eq!(status.signal(), Some(libc::SIGTERM));
        forward_signal(None, libc::SIGTERM);
    }

    #[tokio::test]
    async fn test_missing_program_is_process_error() {
        let err = run_forwarding_signals("definitely-not-a-real-binary-9f2c", &[]).await.unwrap_err();
        assert_eq!(err.error_code(), "PROCESS_ERROR");
        assert!(err.message().contains("not found"));
    }
}
