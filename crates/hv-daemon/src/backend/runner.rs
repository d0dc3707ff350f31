//! Process control for tunnel backends
//!
//! Backends never touch `std::process` directly. Everything goes through a
//! [`CommandRunner`], so platform helpers can be scripted in tests.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};
use tokio::process::Command;

use hv_core::pidfile::is_process_alive;
use hv_core::BackendError;

/// How long a freshly spawned process is watched for an immediate exit
const SPAWN_GRACE: Duration = Duration::from_millis(300);

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// Exit status as printed by the platform
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Turn a failed run into a `BackendError::Command`
    pub fn check(self, program: &str) -> Result<Self, BackendError> {
        if self.success {
            return Ok(self);
        }
        Err(BackendError::Command {
            program: program.to_string(),
            status: self.status,
            stderr: self.stderr.trim().to_string(),
        })
    }
}

/// Runs and supervises helper processes
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, BackendError>;

    /// Start a long-running process and return its PID
    async fn spawn(&self, program: &str, args: &[String]) -> Result<u32, BackendError>;

    /// Whether `pid` is alive and its executable name starts with `name`
    async fn is_alive(&self, pid: u32, name: &str) -> bool;

    /// Stop a process; a process that is already gone is not an error
    async fn kill(&self, pid: u32) -> Result<(), BackendError>;
}

/// [`CommandRunner`] backed by the operating system
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }

    fn process_table() -> System {
        System::new_with_specifics(RefreshKind::new().with_processes(ProcessRefreshKind::new()))
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, BackendError> {
        tracing::debug!("Running {} {}", program, args.join(" "));

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| BackendError::Spawn {
                program: program.to_string(),
                source,
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn spawn(&self, program: &str, args: &[String]) -> Result<u32, BackendError> {
        tracing::debug!("Spawning {} {}", program, args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| BackendError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let pid = child.id().ok_or_else(|| BackendError::Spawn {
            program: program.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "process exited immediately"),
        })?;

        // Surface start-up failures (bad config, missing binary deps) synchronously
        if let Ok(status) = tokio::time::timeout(SPAWN_GRACE, child.wait()).await {
            let status = status.map_err(|source| BackendError::Spawn {
                program: program.to_string(),
                source,
            })?;
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                use tokio::io::AsyncReadExt;
                let _ = pipe.read_to_string(&mut stderr).await;
            }
            return Err(BackendError::Command {
                program: program.to_string(),
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        // Reap the child when it eventually exits
        drop(child.stderr.take());
        tokio::spawn(async move {
            let _ = child.wait().await;
        });

        Ok(pid)
    }

    async fn is_alive(&self, pid: u32, name: &str) -> bool {
        if !is_process_alive(pid) {
            return false;
        }
        let system = Self::process_table();
        match system.process(Pid::from_u32(pid)) {
            Some(process) => process.name().to_string_lossy().starts_with(name),
            None => false,
        }
    }

    async fn kill(&self, pid: u32) -> Result<(), BackendError> {
        let system = Self::process_table();
        let Some(process) = system.process(Pid::from_u32(pid)) else {
            tracing::debug!("Process {} already gone", pid);
            return Ok(());
        };

        if process.kill() {
            Ok(())
        } else if !is_process_alive(pid) {
            Ok(())
        } else {
            Err(BackendError::Kill {
                pid,
                message: "signal was not delivered".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_failed_output() {
        let output = CommandOutput {
            success: false,
            status: "exit status: 1".into(),
            stdout: String::new(),
            stderr: "boom\n".into(),
        };
        let err = output.check("wg-quick").unwrap_err();
        assert_eq!(err.to_string(), "wg-quick exited with exit status: 1: boom");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_output() {
        let runner = SystemRunner::new();
        let output = runner
            .run("sh", &["-c".to_string(), "echo hi; echo err >&2; exit 3".to_string()])
            .await
            .unwrap();
        assert!(!output.success);
        assert_eq!(output.stdout.trim(), "hi");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let runner = SystemRunner::new();
        let err = runner.run("hv-definitely-missing", &[]).await.unwrap_err();
        assert!(matches!(err, BackendError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_reports_immediate_exit() {
        let runner = SystemRunner::new();
        let err = runner
            .spawn("sh", &["-c".to_string(), "exit 2".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Command { .. }));
    }

    #[tokio::test]
    async fn test_kill_missing_process_is_ok() {
        let runner = SystemRunner::new();
        runner.kill(999_999_999).await.unwrap();
        assert!(!runner.is_alive(999_999_999, "v2ray").await);
    }
}
