//! Spec and frozen-document loading: YAML deserialization into raw,
//! wire-shaped structs, followed by a normalization pass that desugars
//! legacy shorthand into the `Project`/`SlotDescriptor` model.
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{Project, ReferenceDescriptor, RemoteTable, SlotDescriptor};

/// Wire shape of one slot entry, straight off `serde_yaml` with no
/// normalization applied yet.
#[derive(Debug, Deserialize)]
struct RawSlot {
    #[serde(default)]
    modules: Vec<String>,
    #[serde(default)]
    remotes: RemoteTable,
    #[serde(default)]
    merges: Vec<String>,
    src: Option<String>,
    #[serde(default)]
    shell_command_after: Vec<String>,
    #[serde(default)]
    patch_globs: Vec<String>,
    target_folder: Option<PathBuf>,
    #[serde(default)]
    locales: Vec<String>,
}

/// The frozen-reference document: slot -> remote -> refspec -> commit id.
/// `BTreeMap` at every level so two freezes over unchanged state serialize
/// byte-identically.
pub type FrozenDocument = BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>;

/// Parse one `<remote> <refspec>` or legacy `<remote> <url> <refspec>` merge
/// entry. The three-part form is deprecated: if `remote` isn't already
/// registered, its `url` is inserted before the merge is recorded.
fn parse_merge_entry(entry: &str, remotes: &mut RemoteTable, slot_name: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = entry.splitn(3, ' ').collect();
    match parts.as_slice() {
        [remote, refspec] => Some(((*remote).to_owned(), (*refspec).to_owned())),
        [remote, url, refspec] => {
            if remotes.get(remote).is_none() {
                log::warn!(
                    "slot {slot_name:?}: merge entry {entry:?} uses the deprecated \
                     '<remote> <url> <refspec>' form; use 'remotes:' instead"
                );
                remotes.insert(*remote, *url);
            }
            Some(((*remote).to_owned(), (*refspec).to_owned()))
        }
        _ => {
            log::warn!("slot {slot_name:?}: ignoring malformed merge entry {entry:?}");
            None
        }
    }
}

fn normalize_slot(name: &str, raw: RawSlot) -> SlotDescriptor {
    let mut remotes = raw.remotes;

    let mut merge_entries: Vec<String> = Vec::new();
    if let Some(src) = &raw.src {
        let mut parts = src.splitn(2, ' ');
        let url = parts.next().unwrap_or_default();
        let refspec = parts.next().unwrap_or_default();
        remotes.insert("origin", url);
        merge_entries.push(format!("origin {refspec}"));
    }
    merge_entries.extend(raw.merges.iter().cloned());

    let references: Vec<ReferenceDescriptor> = merge_entries
        .iter()
        .filter_map(|entry| parse_merge_entry(entry, &mut remotes, name))
        .map(|(remote, refspec)| ReferenceDescriptor::new(remote, refspec))
        .collect();

    if !raw.shell_command_after.is_empty() {
        log::warn!("slot {name:?}: 'shell_command_after' is deprecated in favor of 'patch_globs'");
    }

    SlotDescriptor {
        name: name.to_owned(),
        modules: raw.modules,
        remotes,
        references,
        shell_commands: raw.shell_command_after,
        patch_globs: raw.patch_globs,
        target_folder: raw.target_folder,
        locales: raw.locales,
    }
}

/// Load and normalize a spec file into a `Project`.
///
/// `workdir` is the directory paths in the project resolve relative to
/// (defaults to the spec file's parent).
pub fn load_spec(path: &Path, workdir: PathBuf) -> Result<Project> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading spec file {path:?}"))?;
    let raw: HashMap<String, RawSlot> =
        serde_yaml::from_str(&text).with_context(|| format!("parsing spec file {path:?}"))?;
    let slots = raw
        .into_iter()
        .map(|(name, raw_slot)| {
            let slot = normalize_slot(&name, raw_slot);
            (name, slot)
        })
        .collect();
    Ok(Project { slots, workdir })
}

/// Resolve the spec path: if the given (or default) path is relative and
/// doesn't exist, fall back to `<config-dir>/odoo/<basename>`.
pub fn resolve_spec_path(given: &Path) -> Result<PathBuf> {
    if given.exists() {
        return Ok(given.to_owned());
    }
    if given.is_absolute() {
        anyhow::bail!("spec file {given:?} does not exist");
    }
    let basename = given
        .file_name()
        .with_context(|| format!("spec path {given:?} has no file name"))?;
    let base_dirs =
        directories::BaseDirs::new().context("could not determine the platform config directory")?;
    let fallback = base_dirs.config_dir().join("odoo").join(basename);
    if fallback.exists() {
        return Ok(fallback);
    }
    anyhow::bail!("spec file not found at {given:?} or {fallback:?}");
}

/// Load the frozen-reference document, tolerating absence (missing is
/// non-fatal) and malformed content (logged, treated as empty).
pub fn load_frozen(path: &Path) -> FrozenDocument {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return FrozenDocument::new(),
        Err(e) => {
            log::warn!("could not read frozen-reference document {path:?}: {e}");
            return FrozenDocument::new();
        }
    };
    match serde_yaml::from_str(&text) {
        Ok(doc) => doc,
        Err(e) => {
            log::warn!("could not parse frozen-reference document {path:?}: {e}");
            FrozenDocument::new()
        }
    }
}

/// Rewrite every descriptor in `project` that has a corresponding entry in
/// `frozen` to point at the pinned commit. An empty or null pinned value is
/// treated as absent and warned about.
pub fn apply_frozen(project: &mut Project, frozen: &FrozenDocument) {
    for (slot_name, slot) in project.slots.iter_mut() {
        let Some(by_remote) = frozen.get(slot_name) else {
            continue;
        };
        for descriptor in slot.references.iter_mut() {
            let Some(by_refspec) = by_remote.get(&descriptor.remote) else {
                continue;
            };
            let Some(commit) = by_refspec.get(descriptor.frozen_key()) else {
                continue;
            };
            if commit.trim().is_empty() {
                log::warn!(
                    "slot {slot_name:?}: frozen entry for {}/{} is empty, ignoring",
                    descriptor.remote,
                    descriptor.frozen_key()
                );
                continue;
            }
            descriptor.pin_to(commit.clone());
        }
    }
}

/// Serialize a frozen document with stable, block-style formatting so two
/// freezes over unchanged state produce byte-identical output.
pub fn write_frozen(path: &Path, doc: &FrozenDocument) -> Result<()> {
    let text = serde_yaml::to_string(doc).context("serializing frozen-reference document")?;
    std::fs::write(path, text).with_context(|| format!("writing frozen-reference document {path:?}"))
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;

    fn write_temp(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("spec.yaml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[googletest::test]
    fn loads_basic_slot() {
        let (_dir, path) = write_temp(indoc! {"
            a:
              modules: []
              remotes:
                origin: https://example.com/a.git
              merges:
                - origin main
        "});
        let project = load_spec(&path, PathBuf::from("/work")).unwrap();
        let slot = &project.slots["a"];
        assert_eq!(slot.references.len(), 1);
        assert_eq!(slot.references[0].remote, "origin");
        assert_eq!(slot.references[0].refspec, "main");
    }

    #[googletest::test]
    fn src_shorthand_desugars_to_origin() {
        let (_dir, path) = write_temp(indoc! {r#"
            a:
              src: "https://example.com/a.git main"
        "#});
        let project = load_spec(&path, PathBuf::from("/work")).unwrap();
        let slot = &project.slots["a"];
        assert_that!(slot.remotes.get("origin"), some(eq("https://example.com/a.git")));
        assert_eq!(slot.references[0].remote, "origin");
        assert_eq!(slot.references[0].refspec, "main");
    }

    #[test]
    fn remotes_keep_document_order() {
        let (_dir, path) = write_temp(indoc! {"
            a:
              remotes:
                zeta: https://example.com/zeta.git
                alpha: https://example.com/alpha.git
                mu: https://example.com/mu.git
              merges:
                - zeta main
        "});
        let project = load_spec(&path, PathBuf::from("/work")).unwrap();
        let slot = &project.slots["a"];
        assert_eq!(
            slot.remotes.iter().collect::<Vec<_>>(),
            vec![
                ("zeta", "https://example.com/zeta.git"),
                ("alpha", "https://example.com/alpha.git"),
                ("mu", "https://example.com/mu.git"),
            ]
        );
    }

    #[test]
    fn src_shorthand_prepends_to_existing_merges() {
        let (_dir, path) = write_temp(indoc! {r#"
            a:
              src: "https://example.com/a.git main"
              remotes:
                other: https://example.com/b.git
              merges:
                - other refs/pull/7/head
        "#});
        let project = load_spec(&path, PathBuf::from("/work")).unwrap();
        let slot = &project.slots["a"];
        assert_eq!(slot.references.len(), 2);
        assert_eq!(slot.references[0].refspec, "main");
        assert_eq!(slot.references[1].refspec, "refs/pull/7/head");
    }

    #[test]
    fn three_part_merge_registers_remote_when_missing() {
        let (_dir, path) = write_temp(indoc! {"
            a:
              merges:
                - origin https://example.com/a.git main
        "});
        let project = load_spec(&path, PathBuf::from("/work")).unwrap();
        let slot = &project.slots["a"];
        assert_eq!(slot.remotes.get("origin"), Some("https://example.com/a.git"));
        assert_eq!(slot.references[0].refspec, "main");
    }

    #[test]
    fn apply_frozen_pins_matching_descriptor() {
        let (_dir, path) =
            write_temp("a:\n  remotes:\n    origin: https://example.com/a.git\n  merges:\n    - origin main\n");
        let mut project = load_spec(&path, PathBuf::from("/work")).unwrap();
        let mut frozen = FrozenDocument::new();
        let mut by_remote = BTreeMap::new();
        let mut by_refspec = BTreeMap::new();
        by_refspec.insert("main".to_owned(), "0".repeat(40));
        by_remote.insert("origin".to_owned(), by_refspec);
        frozen.insert("a".to_owned(), by_remote);

        apply_frozen(&mut project, &frozen);
        let descriptor = &project.slots["a"].references[0];
        assert_eq!(descriptor.refspec, "0".repeat(40));
        assert_eq!(descriptor.pinned_name.as_deref(), Some("main"));
    }

    #[test]
    fn apply_frozen_ignores_empty_value() {
        let (_dir, path) =
            write_temp("a:\n  remotes:\n    origin: https://example.com/a.git\n  merges:\n    - origin main\n");
        let mut project = load_spec(&path, PathBuf::from("/work")).unwrap();
        let mut frozen = FrozenDocument::new();
        let mut by_remote = BTreeMap::new();
        let mut by_refspec = BTreeMap::new();
        by_refspec.insert("main".to_owned(), String::new());
        by_remote.insert("origin".to_owned(), by_refspec);
        frozen.insert("a".to_owned(), by_remote);

        apply_frozen(&mut project, &frozen);
        assert_eq!(project.slots["a"].references[0].refspec, "main");
    }

    #[test]
    fn missing_frozen_file_yields_empty_document() {
        let dir = tempfile::TempDir::new().unwrap();
        let doc = load_frozen(&dir.path().join("does-not-exist.yaml"));
        assert!(doc.is_empty());
    }

    #[googletest::test]
    fn resolve_spec_path_rejects_missing_absolute_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("does-not-exist.yaml");
        assert_that!(resolve_spec_path(&missing), err(anything()));
    }
}
