//! Freeze engine: resolves every declared reference on an already-assembled
//! tree to the commit currently at its tip, and writes a
//! pinned-reference document. Does not fetch; assumes a prior assembly run
//! populated each slot's on-disk tree.
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::model::Project;
use crate::path::{local_ref, module_path};
use crate::repo::Repo;
use crate::spec::FrozenDocument;

/// Resolve every slot's references under a semaphore of capacity
/// `concurrency`, returning the assembled frozen document.
pub async fn freeze(project: &Project, concurrency: usize) -> FrozenDocument {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for slot in project.slots.values().cloned() {
        let semaphore = semaphore.clone();
        let workdir = project.workdir.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            let path = module_path(&workdir, &slot);
            let repo = Repo::new(&path);

            let mut by_remote: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
            for descriptor in &slot.references {
                let local = local_ref(descriptor);
                match repo.rev_list_tip(&local).await {
                    Ok(commit) => {
                        by_remote
                            .entry(descriptor.remote.clone())
                            .or_default()
                            .insert(descriptor.frozen_key().to_owned(), commit);
                    }
                    Err(e) => {
                        log::warn!(
                            "slot {:?}: could not resolve {local:?} while freezing: {e}",
                            slot.name
                        );
                    }
                }
            }
            (slot.name, by_remote)
        });
    }

    let mut doc = FrozenDocument::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((name, by_remote)) => {
                doc.insert(name, by_remote);
            }
            Err(e) => log::error!("freeze task panicked: {e}"),
        }
    }
    doc
}

/// Default output path when `--freeze` is given with no path argument:
/// `frozen.yaml` in the workdir.
pub fn default_frozen_path(workdir: &Path) -> std::path::PathBuf {
    workdir.join("frozen.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ReferenceDescriptor, RemoteTable, SlotDescriptor};

    #[tokio::test]
    async fn freeze_resolves_local_ref_to_tip_commit() {
        let temp = crate::repo::test_utils::TempRepo::new().await.unwrap();
        let commit = temp.commit("first").await.unwrap();
        temp.repo.checkout_new_branch("loc-main", None).await.unwrap();

        let workdir = temp.dir.path().parent().unwrap().to_owned();
        let slot_name = temp.dir.path().file_name().unwrap().to_string_lossy().into_owned();

        let mut slots = std::collections::HashMap::new();
        slots.insert(
            slot_name.clone(),
            SlotDescriptor {
                name: slot_name.clone(),
                modules: vec![],
                remotes: RemoteTable::new(),
                references: vec![ReferenceDescriptor::new("origin", "main")],
                shell_commands: vec![],
                patch_globs: vec![],
                target_folder: Some(std::path::PathBuf::from(&slot_name)),
                locales: vec![],
            },
        );
        let project = Project { slots, workdir };

        let doc = freeze(&project, 4).await;
        assert_eq!(doc[&slot_name]["origin"]["main"], commit);
    }
}
