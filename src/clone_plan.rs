//! Clone planner: a pure function from a slot to the argument vector for
//! `git clone`. No I/O, no subprocess - this exists purely so the
//! shallow/sparse/revision-vs-branch decision tree can be unit tested
//! without a git binary.
use std::ffi::OsString;

use crate::model::{RefType, SlotDescriptor, ODOO_SLOT};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClonePlan {
    pub args: Vec<OsString>,
}

/// Build the `git clone` argument vector for a slot's base reference,
/// cloning into `path`.
pub fn plan_clone(slot: &SlotDescriptor, url: &str, path: &std::path::Path) -> ClonePlan {
    let base = slot
        .base()
        .expect("plan_clone called on a slot with no references");

    let mut args: Vec<OsString> = vec!["clone".into(), "--filter=tree:0".into()];

    let shallow = slot.is_odoo() || slot.references.len() == 1;
    if shallow {
        args.push("--depth".into());
        args.push("1".into());
    }

    let sparse = !slot.is_odoo() || !slot.locales.is_empty();
    if sparse {
        args.push("--sparse".into());
    }

    match base.ref_type {
        RefType::Ref => {
            args.push("--revision".into());
            args.push(base.refspec.clone().into());
        }
        RefType::Branch | RefType::Pr => {
            args.push("--origin".into());
            args.push(base.remote.clone().into());
            args.push("--branch".into());
            args.push(base.refspec.clone().into());
        }
    }

    args.push(url.into());
    args.push(path.as_os_str().to_owned());

    ClonePlan { args }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::model::{ReferenceDescriptor, RemoteTable};

    use super::*;

    fn slot(name: &str, refs: Vec<ReferenceDescriptor>, locales: Vec<&str>) -> SlotDescriptor {
        SlotDescriptor {
            name: name.to_owned(),
            modules: vec![],
            remotes: RemoteTable::new(),
            references: refs,
            shell_commands: vec![],
            patch_globs: vec![],
            target_folder: None,
            locales: locales.into_iter().map(str::to_owned).collect(),
        }
    }

    fn args_of(plan: &ClonePlan) -> Vec<String> {
        plan.args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn single_ref_slot_is_shallow_and_sparse_branch() {
        let s = slot("a", vec![ReferenceDescriptor::new("origin", "main")], vec![]);
        let plan = plan_clone(&s, "https://example.com/a.git", Path::new("/work/a"));
        assert_eq!(
            args_of(&plan),
            vec![
                "clone",
                "--filter=tree:0",
                "--depth",
                "1",
                "--sparse",
                "--origin",
                "origin",
                "--branch",
                "main",
                "https://example.com/a.git",
                "/work/a",
            ]
        );
    }

    #[test]
    fn multi_ref_slot_is_deep() {
        let s = slot(
            "a",
            vec![
                ReferenceDescriptor::new("origin", "main"),
                ReferenceDescriptor::new("origin", "refs/pull/7/head"),
            ],
            vec![],
        );
        let plan = plan_clone(&s, "https://example.com/a.git", Path::new("/work/a"));
        assert!(!args_of(&plan).contains(&"--depth".to_owned()));
        assert!(args_of(&plan).contains(&"--sparse".to_owned()));
    }

    #[test]
    fn ref_base_clones_by_revision() {
        let hash = "080b8ecbad3e34e55c5a035af80100f73b742a8d";
        let s = slot("a", vec![ReferenceDescriptor::new("origin", hash)], vec![]);
        let plan = plan_clone(&s, "https://example.com/a.git", Path::new("/work/a"));
        let args = args_of(&plan);
        assert!(args.contains(&"--revision".to_owned()));
        assert!(args.contains(&hash.to_owned()));
        assert!(!args.contains(&"--origin".to_owned()));
    }

    #[test]
    fn odoo_slot_is_always_shallow() {
        let s = slot(
            ODOO_SLOT,
            vec![
                ReferenceDescriptor::new("origin", "main"),
                ReferenceDescriptor::new("origin", "refs/pull/1/head"),
            ],
            vec![],
        );
        let plan = plan_clone(&s, "https://example.com/odoo.git", Path::new("/work/src"));
        assert!(args_of(&plan).contains(&"--depth".to_owned()));
    }

    #[test]
    fn odoo_slot_without_locales_is_not_sparse() {
        let s = slot(ODOO_SLOT, vec![ReferenceDescriptor::new("origin", "main")], vec![]);
        let plan = plan_clone(&s, "https://example.com/odoo.git", Path::new("/work/src"));
        assert!(!args_of(&plan).contains(&"--sparse".to_owned()));
    }

    #[test]
    fn odoo_slot_with_locales_is_sparse() {
        let s = slot(
            ODOO_SLOT,
            vec![ReferenceDescriptor::new("origin", "main")],
            vec!["fr_FR"],
        );
        let plan = plan_clone(&s, "https://example.com/odoo.git", Path::new("/work/src"));
        assert!(args_of(&plan).contains(&"--sparse".to_owned()));
    }
}
