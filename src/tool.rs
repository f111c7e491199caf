//! Invocation of external executables with a hard deadline.

use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

#[derive(Debug)]
pub(crate) struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Error, Debug)]
pub(crate) enum ToolError {
    #[error("failed to start: {0}")]
    Spawn(std::io::Error),
    #[error("killed after {0:?}")]
    TimedOut(Duration),
    #[error("failed while waiting: {0}")]
    Wait(std::io::Error),
}

/// Runs `program` and collects its output, killing it once `timeout` elapses.
///
/// Output pipes are drained on helper threads so a chatty tool cannot block
/// on a full pipe while we wait for its exit.
pub(crate) fn run_tool<I, S>(program: &Path, args: I, timeout: Duration) -> Result<ToolOutput, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(ToolError::Spawn)?;

    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    let status = wait_with_deadline(&mut child, timeout, program)?;

    Ok(ToolOutput { status, stdout: join_reader(stdout_reader), stderr: join_reader(stderr_reader) })
}

fn wait_with_deadline(child: &mut Child, timeout: Duration, program: &Path) -> Result<ExitStatus, ToolError> {
    match child.wait_timeout(timeout).map_err(ToolError::Wait)? {
        Some(status) => Ok(status),
        None => {
            warn!("{} exceeded {timeout:?}, killing it", program.display());
            if let Err(e) = child.kill() {
                debug!("kill failed for {}: {e}", program.display());
            }
            let _ = child.wait();
            Err(ToolError::TimedOut(timeout))
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<thread::JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_reader(handle: Option<thread::JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Resolves an executable name inside `dir` when given, otherwise on `PATH`.
/// Names containing a path separator are checked as-is.
pub(crate) fn resolve_executable(name: &str, dir: Option<&Path>) -> Option<PathBuf> {
    let found = match dir {
        Some(dir) => which::which_in(name, Some(dir), dir),
        None => which::which(name),
    };
    match found {
        Ok(path) => Some(path),
        Err(e) => {
            debug!("{name} not found: {e}");
            None
        }
    }
}
