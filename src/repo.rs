//! Domain git operations: the concrete `git` invocations the slot state
//! machine drives. Everything here is a thin, typed wrapper
//! around a subprocess call; the state machine in `slot.rs` owns the
//! sequencing and error classification.
use std::ffi::{OsStr, OsString};
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::LazyLock;

use anyhow::{anyhow, Context};
use colored::control::SHOULD_COLORIZE;
use tokio::process::Command;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::clone_plan::ClonePlan;
use crate::process::{CommandExt, OutputExt};
use crate::util::IoResultExt;

/// Caps the number of concurrently live `git` child processes regardless of
/// how many slots are running, independent of the scheduler's own
/// slot-concurrency semaphore.
static COMMAND_SEM: LazyLock<Semaphore> = LazyLock::new(|| Semaphore::new(64));

/// Locale every invocation runs under, so textual matching against
/// stdout/stderr (e.g. the "CONFLICT" check in `merge`) is stable across
/// hosts.
const ENGLISH_LANG: &str = "en_US.UTF-8";

struct GitCommand {
    _permit: SemaphorePermit<'static>,
    command: Command,
}

impl GitCommand {
    async fn new(git_binary: &Path, cwd: &Path, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Self {
        let mut command = Command::new(git_binary);
        command.current_dir(cwd);
        command.env("LANG", ENGLISH_LANG);
        command.args(["-c", &format!("color.ui={}", SHOULD_COLORIZE.should_colorize())]);
        command.args(args);
        Self {
            _permit: COMMAND_SEM.acquire().await.unwrap(),
            command,
        }
    }

    fn arg(&mut self, arg: impl AsRef<OsStr>) -> &mut Self {
        self.command.arg(arg);
        self
    }

    fn args(&mut self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> &mut Self {
        self.command.args(args);
        self
    }

    async fn execute(&mut self) -> anyhow::Result<Output> {
        self.command.execute().await
    }

    async fn output(&mut self) -> std::io::Result<Output> {
        self.command.output().await
    }
}

/// A single slot's on-disk working tree. Every method here shells out to
/// `git`; none of them interpret the state machine's own notion of success
/// or failure - that classification happens in `slot.rs`.
#[derive(Debug, Clone)]
pub struct Repo {
    pub path: PathBuf,
    pub git_binary: PathBuf,
}

impl Repo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            git_binary: PathBuf::from("git"),
        }
    }

    async fn git(&self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> GitCommand {
        GitCommand::new(&self.git_binary, &self.path, args).await
    }

    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    /// `git status --porcelain`: empty stdout means clean.
    pub async fn is_clean(&self) -> anyhow::Result<bool> {
        let output = self
            .git(["status", "--porcelain"])
            .await
            .execute()
            .await
            .context("git status --porcelain")?;
        Ok(output.stdout.is_empty())
    }

    /// Raw porcelain status text, for error messages (`DirtyWorkingTree`).
    pub async fn status_text(&self) -> anyhow::Result<String> {
        let output = self
            .git(["status", "--porcelain"])
            .await
            .execute()
            .await
            .context("git status --porcelain")?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub async fn is_shallow(&self) -> anyhow::Result<bool> {
        let output = self
            .git(["rev-parse", "--is-shallow-repository"])
            .await
            .execute()
            .await
            .context("git rev-parse --is-shallow-repository")?;
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    pub async fn unshallow(&self, remote: &str) -> anyhow::Result<()> {
        self.git(["fetch", remote, "--unshallow"])
            .await
            .execute()
            .await
            .context("git fetch --unshallow")?;
        Ok(())
    }

    pub async fn reset_hard(&self, target: &str) -> anyhow::Result<()> {
        self.git(["reset", "--hard"])
            .await
            .arg(target)
            .execute()
            .await
            .with_context(|| format!("git reset --hard {target}"))?;
        Ok(())
    }

    pub async fn checkout_new_branch(&self, name: &str, start_point: Option<&str>) -> anyhow::Result<()> {
        let mut cmd = self.git(["checkout", "-b", name]).await;
        if let Some(start_point) = start_point {
            cmd.arg(start_point);
        }
        cmd.execute()
            .await
            .with_context(|| format!("git checkout -b {name}"))?;
        Ok(())
    }

    /// Best-effort branch deletion for stale local refs left over from a
    /// prior run's non-base merges. Non-fatal: the branch may simply not
    /// exist.
    pub async fn delete_branch_best_effort(&self, name: &str) {
        let _ = self.git(["branch", "-D", name]).await.output().await;
    }

    /// Clone into this repo's path using a plan from the clone planner, run
    /// from the parent directory since `path` doesn't exist yet.
    pub async fn clone(git_binary: &Path, plan: &ClonePlan) -> anyhow::Result<()> {
        let mut command = GitCommand::new(git_binary, Path::new("."), Vec::<&OsStr>::new()).await;
        command.args(plan.args.iter().map(OsString::as_os_str));
        command.execute().await.context("git clone")?;
        Ok(())
    }

    pub async fn sparse_checkout_init_cone(&self) -> anyhow::Result<()> {
        self.git(["sparse-checkout", "init", "--cone"])
            .await
            .execute()
            .await
            .context("git sparse-checkout init --cone")?;
        Ok(())
    }

    pub async fn sparse_checkout_init_no_cone(&self) -> anyhow::Result<()> {
        self.git(["sparse-checkout", "init", "--no-cone"])
            .await
            .execute()
            .await
            .context("git sparse-checkout init --no-cone")?;
        Ok(())
    }

    pub async fn sparse_checkout_set(&self, patterns: &[String]) -> anyhow::Result<()> {
        self.git(["sparse-checkout", "set"])
            .await
            .args(patterns)
            .execute()
            .await
            .context("git sparse-checkout set")?;
        Ok(())
    }

    /// Idempotent: a remote that already exists is treated as success
    /// rather than an error.
    pub async fn remote_add(&self, name: &str, url: &str) -> anyhow::Result<()> {
        let output = self
            .git(["remote", "add", name, url])
            .await
            .output()
            .await
            .context("spawning git remote add")?;
        if output.status.success() {
            return Ok(());
        }
        if String::from_utf8_lossy(&output.stderr).contains("already exists") {
            log::warn!("slot at {:?}: remote {name:?} already exists, ignoring", self.path);
            return Ok(());
        }
        output.ok().with_context(|| format!("git remote add {name} {url}"))
    }

    pub async fn set_config(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.git(["config", key, value])
            .await
            .execute()
            .await
            .with_context(|| format!("git config {key} {value}"))?;
        Ok(())
    }

    /// One fetch invocation per remote, mapping every `refspec` in `mapping`
    /// to its `local_ref`.
    pub async fn fetch_multi(&self, remote: &str, mapping: &[(String, String)], jobs: usize) -> anyhow::Result<()> {
        let mut cmd = self.git(["fetch", "-j", &jobs.to_string(), remote]).await;
        for (refspec, local_ref) in mapping {
            cmd.arg(format!("{refspec}:{local_ref}"));
        }
        cmd.execute()
            .await
            .with_context(|| format!("git fetch from {remote}"))?;
        Ok(())
    }

    /// Merges `local_ref` into the current branch with `--no-edit`.
    /// "CONFLICT" anywhere in stdout or stderr is treated as a failure
    /// regardless of exit code, since `git merge` doesn't always report a
    /// conflict via its exit status alone.
    pub async fn merge_no_edit(&self, local_ref: &str) -> anyhow::Result<(), String> {
        let output = self
            .git(["merge", "--no-edit"])
            .await
            .arg(local_ref)
            .output()
            .await
            .map_err(|e| format!("spawning git merge: {e}"))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() && !stdout.contains("CONFLICT") && !stderr.contains("CONFLICT") {
            return Ok(());
        }
        Err(format!("{stdout}{stderr}"))
    }

    pub async fn merge_abort(&self) {
        let _ = self.git(["merge", "--abort"]).await.output().await;
    }

    /// Applies a list of patch files with `git am`. Returns stderr text on
    /// failure; caller is responsible for calling `am_abort`.
    pub async fn am(&self, patch_paths: &[PathBuf]) -> Result<(), String> {
        let output = self
            .git(["am"])
            .await
            .args(patch_paths)
            .output()
            .await
            .map_err(|e| format!("spawning git am: {e}"))?;
        if output.status.success() {
            return Ok(());
        }
        Err(String::from_utf8_lossy(&output.stderr).into_owned())
    }

    pub async fn am_abort(&self) {
        let _ = self.git(["am", "--abort"]).await.output().await;
    }

    /// Resolves `rev` to the 40-hex commit identifier at its tip, used by
    /// both RESET (via `local_ref`) and the freeze engine.
    pub async fn rev_list_tip(&self, rev: &str) -> anyhow::Result<String> {
        let output = self
            .git(["rev-list", "--max-count", "1"])
            .await
            .arg(rev)
            .execute()
            .await
            .with_context(|| format!("git rev-list --max-count 1 {rev}"))?;
        let commit = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        if commit.is_empty() {
            return Err(anyhow!("git rev-list produced no output for {rev:?}"));
        }
        Ok(commit)
    }
}

/// Replace `links_dir/module` with a relative symlink pointing at
/// `target_dir/module`.
pub fn publish_symlink(links_dir: &Path, target_dir: &Path, module: &str) -> std::io::Result<()> {
    let link_path = links_dir.join(module);
    let target = target_dir.join(module);
    let relative_target = pathdiff(&target, links_dir);

    std::fs::remove_file(&link_path).ignore(std::io::ErrorKind::NotFound)?;
    symlink(relative_target, &link_path)
}

/// Is `links_dir/module` absent or a symlink? A real, non-symlink directory
/// there means a locally-authored module that must be left alone.
pub fn module_is_linkable(links_dir: &Path, module: &str) -> bool {
    match std::fs::symlink_metadata(links_dir.join(module)) {
        Ok(meta) => meta.file_type().is_symlink(),
        Err(_) => true,
    }
}

/// Minimal relative-path computation for two absolute paths sharing a
/// common ancestor, sufficient for `links/<module> -> ../external-src/...`.
fn pathdiff(target: &Path, base: &Path) -> PathBuf {
    let target_components: Vec<_> = target.components().collect();
    let base_components: Vec<_> = base.components().collect();
    let common = target_components
        .iter()
        .zip(base_components.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut result = PathBuf::new();
    for _ in common..base_components.len() {
        result.push("..");
    }
    for component in &target_components[common..] {
        result.push(component);
    }
    result
}
