//! Bounded runs of external helper commands.
//!
//! Desktop helpers such as `osascript` can hang (e.g. waiting on a
//! permission prompt). Every run is capped and the child is killed when the
//! cap is hit.

use std::io::Read;
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Upper bound for a single helper command.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// How a bounded command run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failed { code: Option<i32>, stderr: String },
    TimedOut,
}

/// Run `command` to completion or until `timeout` elapses.
pub fn run_with_timeout(command: &mut Command, timeout: Duration) -> std::io::Result<RunOutcome> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    match child.wait_timeout(timeout)? {
        Some(status) if status.success() => Ok(RunOutcome::Success),
        Some(status) => {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            Ok(RunOutcome::Failed {
                code: status.code(),
                stderr: stderr.trim().to_string(),
            })
        }
        None => {
            let _ = child.kill();
            let _ = child.wait();
            Ok(RunOutcome::TimedOut)
        }
    }
}

/// Run `command` under [`COMMAND_TIMEOUT`], logging any failure as `name`.
pub fn run_logged(name: &str, command: &mut Command) -> bool {
    match run_with_timeout(command, COMMAND_TIMEOUT) {
        Ok(RunOutcome::Success) => true,
        Ok(RunOutcome::Failed { code, stderr }) => {
            tracing::error!("{} failed (exit {:?}): {}", name, code, stderr);
            false
        }
        Ok(RunOutcome::TimedOut) => {
            tracing::error!("{} timed out after {:?}, killed", name, COMMAND_TIMEOUT);
            false
        }
        Err(e) => {
            tracing::error!("{} error: {}", name, e);
            false
        }
    }
}
