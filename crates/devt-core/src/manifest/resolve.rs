//! Per-OS script resolution.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::script::Script;
use crate::types::Platform;

use super::merge::{merge_maps, single};
use super::node::{Map, Node};
use super::{Manifest, is_reserved_key};

/// Script names runnable on `platform`, sorted.
pub fn script_names(manifest: &Manifest, platform: Platform) -> Vec<String> {
    let mut names: BTreeSet<String> = manifest
        .scripts
        .keys()
        .filter(|key| !is_reserved_key(key))
        .cloned()
        .collect();
    if let Some(branch) = os_branch(&manifest.scripts, platform) {
        names.extend(branch.keys().filter(|key| !is_reserved_key(key)).cloned());
    }
    names.into_iter().collect()
}

/// Resolve `name` into a launchable script for `platform`.
///
/// Precedence, lowest first: top-level launch defaults, the shared `scripts`
/// map, the OS sibling map of `scripts`, the script object itself, and the
/// script's own OS branch.
pub fn resolve_script(manifest: &Manifest, name: &str, platform: Platform) -> Result<Script> {
    let not_found = || Error::ScriptNotFound {
        script: name.to_string(),
        tool: manifest.name.clone(),
        available: script_names(manifest, platform),
    };
    if is_reserved_key(name) {
        return Err(not_found());
    }

    let mut base = merge_maps(&[&manifest.defaults, &manifest.scripts]);
    if let Some(branch) = os_branch(&manifest.scripts, platform) {
        if branch.contains_key(name) {
            base = merge_maps(&[&base, branch]);
        }
    }

    let config = match base.get(name) {
        Some(entry) if entry.is_command() => merge_maps(&[&base, &single("args", entry)]),
        Some(Node::Map(object)) => match object.get(platform.key()) {
            Some(branch) if branch.is_command() => {
                merge_maps(&[&base, object, &single("args", branch)])
            }
            Some(Node::Map(branch)) => merge_maps(&[&base, object, branch]),
            _ => merge_maps(&[&base, object]),
        },
        _ => return Err(not_found()),
    };

    Script::from_config(&config, &manifest.path)?.ok_or_else(not_found)
}

fn os_branch(scripts: &Map, platform: Platform) -> Option<&Map> {
    scripts.get(platform.key()).and_then(Node::as_map)
}
