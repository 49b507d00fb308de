#![allow(dead_code)]

pub mod git;

use std::path::{Path, PathBuf};

use devt_core::registry::Registry;
use devt_core::tools::ToolService;
use devt_core::types::{Platform, Scope};

/// Write a YAML manifest with a single `install` script.
pub fn write_package(dir: &Path, name: &str, command: &str, install: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join("manifest.yaml"),
        format!("name: {name}\ncommand: {command}\nscripts:\n  install: {install}\n"),
    )
    .unwrap();
}

pub fn tool_service(scope: Scope, root: &Path) -> ToolService {
    ToolService::for_registry(Registry::open(scope, root).unwrap(), Platform::current())
}

/// Canonical `tools/` directory of `service`.
pub fn tools_dir(service: &ToolService) -> PathBuf {
    service.packages().tools_dir().canonicalize().unwrap()
}
