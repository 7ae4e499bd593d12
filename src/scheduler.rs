//! Scheduler: bounded-concurrency dispatch of one worker task per slot.
//! Deliberately does NOT cancel sibling tasks on first failure - every slot
//! runs to its own terminal status so partial success stays useful for
//! diagnosis.
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::SlotFailure;
use crate::model::Project;
use crate::progress::ProgressSink;
use crate::slot::run_slot;

/// Runs every slot in `project` under a semaphore of capacity
/// `concurrency`, returning one failure per slot that didn't reach DONE.
/// An empty return means every slot succeeded.
pub async fn assemble(
    project: &Project,
    concurrency: usize,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
) -> Vec<SlotFailure> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let workdir: PathBuf = project.workdir.clone();

    let mut tasks = JoinSet::new();
    for slot in project.slots.values().cloned() {
        let semaphore = semaphore.clone();
        let workdir = workdir.clone();
        let progress = progress.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            if cancel.is_cancelled() {
                return None;
            }
            progress.slot_started(&slot.name);
            let result = run_slot(&workdir, &slot, concurrency).await;
            match &result {
                Ok(_) => progress.slot_finished(&slot.name, true),
                Err(e) => {
                    log::error!("{e}");
                    progress.slot_finished(&slot.name, false);
                }
            }
            result.err()
        });
    }

    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some(failure)) => failures.push(failure),
            Ok(None) => {}
            Err(e) => log::error!("slot task panicked: {e}"),
        }
    }
    failures
}
