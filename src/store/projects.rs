//! Project directory scaffolding under the configured root.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::config::PathsConfig;
use crate::error::StoreError;

use super::validate_name;

/// Project names: directories under `workspace/` with a valid name, sorted.
pub fn list_projects(paths: &PathsConfig) -> Result<Vec<String>, StoreError> {
    let entries = match fs::read_dir(paths.workspace_dir()) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if validate_name("project", &name).is_ok() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Create (idempotently) the workspace, notes and state dirs of a project.
/// Returns the workspace path.
pub fn create_project(paths: &PathsConfig, name: &str) -> Result<PathBuf, StoreError> {
    validate_name("project", name)?;
    let workspace = paths.project_workspace(name);
    fs::create_dir_all(&workspace)?;
    fs::create_dir_all(paths.project_notes(name))?;
    fs::create_dir_all(paths.project_state(name))?;
    Ok(workspace)
}
