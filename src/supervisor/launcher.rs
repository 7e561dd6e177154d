//! Worker process launcher
//!
//! The supervisor only needs three operations from the worker runtime:
//! start a worker under an id, check whether it is still alive, and ask it
//! to stop. [`ProcessLauncher`] implements them with OS processes.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::error::{Error, Result};

/// Liveness of a launched worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerLiveness {
    Running,
    /// Exited with the given code, `None` when killed by a signal
    Exited(Option<i32>),
}

/// Starts, polls and stops worker units
pub trait WorkerLauncher {
    type Handle: Send;

    /// Start a worker under `worker_id`
    fn spawn(&mut self, worker_id: &str) -> Result<Self::Handle>;

    /// Non-blocking liveness check
    fn poll(&mut self, handle: &mut Self::Handle) -> Result<WorkerLiveness>;

    /// Ask the worker to stop. Does not wait for it to exit.
    fn terminate(&mut self, handle: &mut Self::Handle) -> Result<()>;
}

/// Launches each worker as a child process
///
/// The worker id is appended to the command as `--worker-id <id>`.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Launcher from a full command line, program first
    pub fn from_command(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::config("Worker command is empty"))?;
        Ok(Self::new(program, args.to_vec()))
    }

    /// Re-invoke the running executable with the `worker` subcommand
    pub fn current_exe(extra_args: Vec<String>) -> Result<Self> {
        let exe = std::env::current_exe()?;
        let mut args = vec!["worker".to_string()];
        args.extend(extra_args);
        Ok(Self::new(exe, args))
    }

    /// Command line for `worker_id`, program first
    pub fn command_line(&self, worker_id: &str) -> Vec<String> {
        let mut line = vec![self.program.display().to_string()];
        line.extend(self.args.iter().cloned());
        line.push("--worker-id".into());
        line.push(worker_id.into());
        line
    }
}

impl WorkerLauncher for ProcessLauncher {
    type Handle = Child;

    fn spawn(&mut self, worker_id: &str) -> Result<Child> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg("--worker-id")
            .arg(worker_id)
            .stdin(Stdio::null())
            .kill_on_drop(false)
            .spawn()?;

        tracing::debug!(worker_id = %worker_id, pid = ?child.id(), "Spawned worker process");
        Ok(child)
    }

    fn poll(&mut self, handle: &mut Child) -> Result<WorkerLiveness> {
        match handle.try_wait()? {
            Some(status) => Ok(WorkerLiveness::Exited(status.code())),
            None => Ok(WorkerLiveness::Running),
        }
    }

    #[cfg(unix)]
    fn terminate(&mut self, handle: &mut Child) -> Result<()> {
        // Already reaped
        let Some(pid) = handle.id() else {
            return Ok(());
        };

        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| Error::other(format!("Process id {pid} out of range")))?;

        // SAFETY: kill(2) with a pid we spawned and SIGTERM has no memory effects
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                return Err(err.into());
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn terminate(&mut self, handle: &mut Child) -> Result<()> {
        handle.start_kill()?;
        Ok(())
    }
}
