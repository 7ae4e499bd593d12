pub mod cli;
pub mod clone_plan;
pub mod error;
pub mod freeze;
pub mod model;
pub mod path;
pub mod process;
pub mod progress;
pub mod repo;
pub mod scheduler;
pub mod slot;
pub mod spec;
pub mod util;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use cli::Args;
use error::SlotFailure;
use progress::{LineProgressSink, ProgressSink};
use util::DisplayablePathBuf;

/// Resolve the effective workdir, frozen-document path, and project from
/// the parsed CLI arguments. The workdir defaults to the spec file's
/// directory; the frozen document defaults to `frozen.yaml` alongside it.
fn load_project(args: &Args) -> Result<model::Project> {
    let config_path = spec::resolve_spec_path(&args.config)?;
    let workdir = args
        .workdir
        .clone()
        .or_else(|| config_path.parent().map(ToOwned::to_owned))
        .unwrap_or_else(|| std::path::PathBuf::from("."));

    let frozen_path = args
        .frozen
        .clone()
        .unwrap_or_else(|| config_path.parent().unwrap_or(&workdir).join("frozen.yaml"));

    log::debug!(
        "loading spec from {}, workdir {}, frozen document {}",
        DisplayablePathBuf(config_path.clone()),
        DisplayablePathBuf(workdir.clone()),
        DisplayablePathBuf(frozen_path.clone()),
    );

    let mut project = spec::load_spec(&config_path, workdir)?;
    let frozen = spec::load_frozen(&frozen_path);
    spec::apply_frozen(&mut project, &frozen);
    Ok(project)
}

/// Run the assembly engine end to end: load the spec, apply any frozen
/// pins, and assemble every slot concurrently. Returns `Ok(())` iff every
/// slot succeeded.
pub async fn run(args: &Args) -> Result<()> {
    let project = load_project(args)?;
    let progress: Arc<dyn ProgressSink> = Arc::new(LineProgressSink::new());
    let cancel = CancellationToken::new();

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("received interrupt, cancelling pending work");
            ctrl_c_cancel.cancel();
        }
    });

    let failures: Vec<SlotFailure> = scheduler::assemble(&project, args.concurrency, progress, cancel).await;
    if failures.is_empty() {
        return Ok(());
    }
    for failure in &failures {
        log::error!("{failure}");
    }
    anyhow::bail!("{} of {} slots failed", failures.len(), project.slots.len());
}

/// Run freeze mode: resolve every slot's current tip commits and write the
/// pinned-reference document.
pub async fn run_freeze(args: &Args, freeze_path_override: Option<&std::path::Path>) -> Result<()> {
    let project = load_project(args)?;
    let output_path = match freeze_path_override {
        Some(path) if !path.as_os_str().is_empty() => path.to_owned(),
        _ => freeze::default_frozen_path(&project.workdir),
    };

    let doc = freeze::freeze(&project, args.concurrency).await;
    spec::write_frozen(&output_path, &doc).with_context(|| format!("writing {output_path:?}"))?;
    log::info!("wrote frozen-reference document to {output_path:?}");
    Ok(())
}
