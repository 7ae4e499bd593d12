//! Path resolver: the deterministic mapping from a slot to its on-disk
//! location, and from a reference descriptor to its stable local ref name.
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Mutex,
};

use log::warn;

use crate::model::{ReferenceDescriptor, SlotDescriptor, ODOO_SLOT};

/// Tracks which slots have already emitted the "odoo without target_folder"
/// deprecation warning, so a rerun doesn't spam the log once per slot per
/// invocation of `module_path` (it's called more than once per slot).
static WARNED_ODOO_DEFAULT: Mutex<Option<HashSet<String>>> = Mutex::new(None);

/// Resolve the on-disk directory a slot's working tree lives in.
pub fn module_path(workdir: &Path, slot: &SlotDescriptor) -> PathBuf {
    if slot.name == ODOO_SLOT && slot.target_folder.is_none() {
        warn_once_odoo_default(&slot.name);
        return workdir.join("src");
    }
    if let Some(target_folder) = &slot.target_folder {
        return workdir.join(target_folder);
    }
    workdir.join("external-src").join(&slot.name)
}

fn warn_once_odoo_default(slot_name: &str) {
    let mut warned = WARNED_ODOO_DEFAULT.lock().unwrap();
    let warned = warned.get_or_insert_with(HashSet::new);
    if warned.insert(slot_name.to_owned()) {
        warn!(
            "slot {slot_name:?}: importing 'odoo' without a 'target_folder' property is \
             deprecated; set target_folder: 'src' in the spec instead"
        );
    }
}

/// The stable local branch/ref name fetched refs are stored under, so
/// downstream operations never depend on the remote's own branch naming.
pub fn local_ref(descriptor: &ReferenceDescriptor) -> String {
    descriptor.local_ref()
}

/// Where published module symlinks live, shared by every slot.
pub fn links_dir(workdir: &Path) -> PathBuf {
    workdir.join("links")
}
