//! Thin helpers around `std::process`/`tokio::process` so every git
//! invocation in this crate reports failures the same way: exit status plus
//! captured stderr, wrapped in an `anyhow::Context`-friendly error.
use std::process::{self, Command as SyncCommand};

use anyhow::{bail, Context};
use tokio::process::Command;

/// Shared by both the sync and async command wrappers, since both produce
/// a `std::process::Output`.
pub trait OutputExt {
    /// `Ok(())` if the process exited zero, otherwise an error carrying
    /// stderr.
    fn ok(&self) -> anyhow::Result<()>;

    /// The process's exit code, or an error if it was killed by a signal
    /// (`status.code()` returns `None` in that case).
    fn code_not_killed(&self) -> anyhow::Result<i32>;
}

impl OutputExt for process::Output {
    fn ok(&self) -> anyhow::Result<()> {
        if self.status.success() {
            return Ok(());
        }
        bail!(
            "exited with {}. stderr:\n{}",
            self.status,
            String::from_utf8_lossy(&self.stderr)
        );
    }

    fn code_not_killed(&self) -> anyhow::Result<i32> {
        self.status
            .code()
            .context("process was killed by a signal")
    }
}

pub trait CommandExt {
    /// Run the command, returning an error (with stderr attached) unless it
    /// exits zero.
    fn execute(&mut self) -> impl std::future::Future<Output = anyhow::Result<process::Output>> + Send;
}

impl CommandExt for Command {
    async fn execute(&mut self) -> anyhow::Result<process::Output> {
        let output = self
            .output()
            .await
            .with_context(|| format!("spawning {:?}", self.as_std()))?;
        output
            .ok()
            .with_context(|| format!("running {:?}", self.as_std()))?;
        Ok(output)
    }
}

pub trait SyncCommandExt {
    fn execute(&mut self) -> anyhow::Result<process::Output>;
}

impl SyncCommandExt for SyncCommand {
    fn execute(&mut self) -> anyhow::Result<process::Output> {
        let output = self.output().with_context(|| format!("spawning {:?}", self))?;
        output.ok().with_context(|| format!("running {:?}", self))?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn execute_succeeds_on_zero_exit() {
        let mut cmd = Command::new("true");
        assert!(cmd.execute().await.is_ok());
    }

    #[tokio::test]
    async fn execute_fails_on_nonzero_exit() {
        let mut cmd = Command::new("false");
        assert!(cmd.execute().await.is_err());
    }

    #[test]
    fn sync_execute_fails_on_nonzero_exit() {
        let mut cmd = SyncCommand::new("false");
        assert!(cmd.execute().is_err());
    }

    #[test]
    fn code_not_killed_reports_exit_code() {
        let out = SyncCommand::new("sh")
            .args(["-c", "exit 7"])
            .output()
            .unwrap();
        assert_eq!(out.code_not_killed().unwrap(), 7);
    }
}
