//! Per-slot state machine: drives one slot's on-disk tree from INSPECT
//! through PUBLISH_LNK, returning a `SlotFailure` naming the slot and a
//! typed `SlotError` on any non-recoverable failure.
use std::path::PathBuf;

use crate::clone_plan::plan_clone;
use crate::error::{SlotError, SlotFailure};
use crate::model::{ReferenceDescriptor, SlotDescriptor};
use crate::path::{links_dir, local_ref, module_path};
use crate::repo::{module_is_linkable, publish_symlink, Repo};
use crate::util::ResultExt;

/// Fixed local branch name all merges target, independent of the base ref's
/// own name, so reruns always produce a deterministic head.
const MERGED_BRANCH: &str = "merged";

#[derive(Debug)]
pub struct SlotOutcome {
    pub slot: String,
}

/// Run one slot's whole state machine to completion.
pub async fn run_slot(workdir: &std::path::Path, slot: &SlotDescriptor, concurrency: usize) -> Result<SlotOutcome, SlotFailure> {
    run(workdir, slot, concurrency).await.map_err(|error| SlotFailure {
        slot: slot.name.clone(),
        error,
    })
}

async fn run(workdir: &std::path::Path, slot: &SlotDescriptor, concurrency: usize) -> Result<SlotOutcome, SlotError> {
    let Some(base) = slot.base() else {
        return Err(SlotError::NoReferences);
    };

    let path = module_path(workdir, slot);
    let repo = Repo::new(&path);

    // INSPECT
    if repo.exists() {
        reset(&repo, slot).await?;
    } else {
        clone(&repo, slot, base).await?;
    }

    // SPARSE_CFG
    let linkable_modules = configure_sparse(&repo, slot, workdir).await?;

    repo.checkout_new_branch(MERGED_BRANCH, None)
        .await
        .map_err(|e| SlotError::ResetFailed {
            target: MERGED_BRANCH.to_owned(),
            stderr: e.to_string(),
        })?;

    // ADD_REMOTES
    for (name, url) in slot.remotes.iter() {
        repo.remote_add(name, url).await.map_err(|e| SlotError::FetchFailed {
            remote: name.to_owned(),
            stderr: e.to_string(),
        })?;
        repo.set_config(&format!("remote.{name}.partialCloneFilter"), "tree:0")
            .await
            .or_log_error(&format!("configuring partialCloneFilter for remote {name:?}"));
        repo.set_config(&format!("remote.{name}.promisor"), "true")
            .await
            .or_log_error(&format!("configuring promisor for remote {name:?}"));
    }

    // FETCH_MULTI
    for (remote, mapping) in group_refs_by_remote(&slot.references) {
        repo.fetch_multi(&remote, &mapping, concurrency)
            .await
            .map_err(|e| SlotError::FetchFailed {
                remote: remote.clone(),
                stderr: e.to_string(),
            })?;
    }

    // MERGE_LOOP
    for descriptor in slot.merges() {
        let local = local_ref(descriptor);
        if let Err(stderr) = repo.merge_no_edit(&local).await {
            repo.merge_abort().await;
            return Err(SlotError::merge_conflict(descriptor, stderr));
        }
    }

    // PATCH_LOOP
    apply_patches(&repo, slot, &path).await?;

    // PUBLISH_LNK
    if !slot.is_odoo() {
        let links = links_dir(workdir);
        std::fs::create_dir_all(&links).map_err(|e| SlotError::LinkError {
            module: links.display().to_string(),
            source: e,
        })?;
        for module in &linkable_modules {
            publish_symlink(&links, &path, module).map_err(|e| SlotError::LinkError {
                module: module.clone(),
                source: e,
            })?;
        }
    }

    Ok(SlotOutcome { slot: slot.name.clone() })
}

/// Groups a slot's references by remote name, preserving the order each
/// remote first appears in. Unlike a consecutive-runs grouping, this merges
/// every reference for a remote into one group even when `merges:`
/// interleaves remotes, so each remote gets exactly one fetch invocation.
fn group_refs_by_remote(references: &[ReferenceDescriptor]) -> Vec<(String, Vec<(String, String)>)> {
    let mut groups: Vec<(String, Vec<(String, String)>)> = Vec::new();
    for descriptor in references {
        let entry = (descriptor.refspec.clone(), local_ref(descriptor));
        match groups.iter_mut().find(|(remote, _)| *remote == descriptor.remote) {
            Some((_, mapping)) => mapping.push(entry),
            None => groups.push((descriptor.remote.clone(), vec![entry])),
        }
    }
    groups
}

async fn clone(repo: &Repo, slot: &SlotDescriptor, base: &ReferenceDescriptor) -> Result<(), SlotError> {
    let url = slot.remotes.get(&base.remote).unwrap_or_default();
    let plan = plan_clone(slot, url, &repo.path);
    Repo::clone(&repo.git_binary, &plan)
        .await
        .map_err(|e| SlotError::CloneFailed {
            remote: base.remote.clone(),
            refspec: base.refspec.clone(),
            path: repo.path.display().to_string(),
            stderr: e.to_string(),
        })?;
    repo.checkout_new_branch(&local_ref(base), None)
        .await
        .map_err(|e| SlotError::CloneFailed {
            remote: base.remote.clone(),
            refspec: base.refspec.clone(),
            path: repo.path.display().to_string(),
            stderr: e.to_string(),
        })
}

async fn reset(repo: &Repo, slot: &SlotDescriptor) -> Result<(), SlotError> {
    if !repo.is_clean().await.unwrap_or(false) {
        let status = repo.status_text().await.unwrap_or_default();
        return Err(SlotError::DirtyWorkingTree { status });
    }

    let base = slot.base().ok_or(SlotError::NoReferences)?;
    if slot.references.len() > 1 && repo.is_shallow().await.unwrap_or(false) {
        repo.unshallow(&base.remote).await.map_err(|e| SlotError::ResetFailed {
            target: local_ref(base),
            stderr: e.to_string(),
        })?;
    }

    repo.reset_hard(&local_ref(base))
        .await
        .map_err(|e| SlotError::ResetFailed {
            target: local_ref(base),
            stderr: e.to_string(),
        })?;

    for descriptor in slot.merges() {
        repo.delete_branch_best_effort(&local_ref(descriptor)).await;
    }
    Ok(())
}

/// Configure sparse checkout and return the modules that survive the
/// symlink filter.
async fn configure_sparse(repo: &Repo, slot: &SlotDescriptor, workdir: &std::path::Path) -> Result<Vec<String>, SlotError> {
    let to_error = |e: anyhow::Error| SlotError::ResetFailed {
        target: "sparse-checkout".to_owned(),
        stderr: e.to_string(),
    };

    if slot.is_odoo() {
        if slot.locales.is_empty() {
            return Ok(vec![]);
        }
        repo.sparse_checkout_init_no_cone().await.map_err(to_error)?;
        let mut patterns = vec!["/*".to_owned(), "!/addons/*".to_owned()];
        for module in &slot.modules {
            patterns.push(format!("/addons/{module}/*"));
        }
        patterns.push("!*.po".to_owned());
        for locale in &slot.locales {
            patterns.push(format!("{locale}.po"));
        }
        repo.sparse_checkout_set(&patterns).await.map_err(to_error)?;
        return Ok(vec![]);
    }

    repo.sparse_checkout_init_cone().await.map_err(to_error)?;

    let links = links_dir(workdir);
    let linkable: Vec<String> = slot
        .modules
        .iter()
        .filter(|module| {
            let linkable = module_is_linkable(&links, module);
            if !linkable {
                log::warn!(
                    "slot {:?}: module {module:?} already exists as a real directory under \
                     links/, excluding it from sparse checkout and publication",
                    slot.name
                );
            }
            linkable
        })
        .cloned()
        .collect();

    if !linkable.is_empty() {
        repo.sparse_checkout_set(&linkable).await.map_err(to_error)?;
    }
    Ok(linkable)
}

async fn apply_patches(repo: &Repo, slot: &SlotDescriptor, module_path: &std::path::Path) -> Result<(), SlotError> {
    if !slot.patch_globs.is_empty() {
        for pattern in &slot.patch_globs {
            let full_pattern = module_path.join(pattern);
            let paths: Vec<PathBuf> = glob::glob(&full_pattern.to_string_lossy())
                .map_err(|e| SlotError::PatchApplyFailed {
                    glob: pattern.clone(),
                    stderr: e.to_string(),
                })?
                .filter_map(Result::ok)
                .collect();
            if let Err(stderr) = repo.am(&paths).await {
                repo.am_abort().await;
                return Err(SlotError::PatchApplyFailed {
                    glob: pattern.clone(),
                    stderr,
                });
            }
        }
    } else if !slot.shell_commands.is_empty() {
        log::warn!("slot {:?}: 'shell_command_after' is deprecated, use 'patch_globs'", slot.name);
        for command in &slot.shell_commands {
            let status = tokio::process::Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(module_path)
                .env("LANG", "en_US.UTF-8")
                .status()
                .await
                .map_err(|e| SlotError::PatchApplyFailed {
                    glob: command.clone(),
                    stderr: e.to_string(),
                })?;
            if !status.success() {
                repo.am_abort().await;
                return Err(SlotError::PatchApplyFailed {
                    glob: command.clone(),
                    stderr: format!("shell command exited with {status}"),
                });
            }
        }
    }
    Ok(())
}
